//! Account id normalisation and message ownership.

use lazy_static::lazy_static;
use regex::Regex;

use super::message::MessageRecord;

lazy_static! {
    static ref WXID_PREFIX: Regex = Regex::new(r"(?i)^(wxid_[^_]+)").unwrap();
    static ref TRAILING_SUFFIX: Regex = Regex::new(r"^(.+)_([a-zA-Z0-9]{4})$").unwrap();
}

/// Strip the device suffix some stores append to the account id.
///
/// `wxid_abc_x9z1` becomes `wxid_abc`; any other id loses a trailing `_XXXX` group of four
/// alphanumerics.
pub fn clean_account_id(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.to_lowercase().starts_with("wxid_") {
        if let Some(caps) = WXID_PREFIX.captures(trimmed) {
            return caps[1].to_string();
        }
        return trimmed.to_string();
    }
    match TRAILING_SUFFIX.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    }
}

/// The store owner's account id, raw and cleaned, lowercased for comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfIdentity {
    raw: String,
    cleaned: String,
}

impl SelfIdentity {
    pub fn new(raw: &str) -> Self {
        let raw = raw.trim().to_string();
        let cleaned = clean_account_id(&raw);
        Self { raw, cleaned }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn cleaned(&self) -> &str {
        &self.cleaned
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Whether `sender` names this account.
    pub fn matches_sender(&self, sender: &str) -> bool {
        let sender = sender.trim().to_lowercase();
        if sender.is_empty() {
            return false;
        }
        let raw = self.raw.to_lowercase();
        let cleaned = self.cleaned.to_lowercase();
        if raw == sender || cleaned == sender {
            return true;
        }
        let prefix = format!("{}_", sender);
        (!raw.is_empty() && raw.starts_with(&prefix))
            || (!cleaned.is_empty() && cleaned.starts_with(&prefix))
    }
}

/// Decides whether a record was sent by the store owner.
#[derive(Debug, Clone, Default)]
pub struct Ownership {
    identity: Option<SelfIdentity>,
}

impl Ownership {
    pub fn new(identity: Option<SelfIdentity>) -> Self {
        Self { identity }
    }

    pub fn for_self(raw: &str) -> Self {
        let identity = SelfIdentity::new(raw);
        Self {
            identity: (!identity.is_empty()).then_some(identity),
        }
    }

    pub fn identity(&self) -> Option<&SelfIdentity> {
        self.identity.as_ref()
    }

    /// Pre-resolved flag first, then sender comparison. Unknown counts as received.
    pub fn is_self(&self, record: &MessageRecord) -> bool {
        if let Some(flag) = record.is_send {
            return flag;
        }
        match (&self.identity, record.sender.as_deref()) {
            (Some(identity), Some(sender)) => identity.matches_sender(sender),
            _ => false,
        }
    }
}
