// crates/chat-analytics/src/main.rs

#[cfg(feature = "cli")]
use chat_analytics::{
    config::Config,
    metrics, run_server,
    reporting::{AnalyticsService, DualReportParams, DualReportService},
    server::open_context,
    telemetry,
};
#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use dotenvy::dotenv;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "chat-analytics", version, about = "Chat history statistics")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API
    Serve,
    /// Overall statistics across private conversations
    Overall {
        #[arg(long)]
        force: bool,
    },
    /// Contacts ranked by message count
    Rankings {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Hourly, weekday and monthly distribution
    Time,
    /// Two-person report with one friend
    Dual {
        #[arg(long)]
        friend: String,
        /// 0 for all time
        #[arg(long, default_value_t = 0)]
        year: i32,
    },
}

#[cfg(feature = "cli")]
fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    telemetry::init_tracing();
    metrics::init_metrics();

    let cli = Cli::parse();
    let cfg = Config::from_env()?;
    cfg.print_config();

    match cli.command {
        Command::Serve => run_server(cfg).await,
        Command::Overall { force } => {
            let service = AnalyticsService::new(open_context(&cfg)?);
            print_json(&service.get_overall_statistics(force).await)
        }
        Command::Rankings { limit } => {
            let service = AnalyticsService::new(open_context(&cfg)?);
            print_json(&service.get_contact_rankings(limit).await)
        }
        Command::Time => {
            let service = AnalyticsService::new(open_context(&cfg)?);
            print_json(&service.get_time_distribution().await)
        }
        Command::Dual { friend, year } => {
            let service = DualReportService::new(open_context(&cfg)?);
            let params = DualReportParams {
                year,
                friend_username: friend,
            };
            print_json(&service.generate_report(params).await)
        }
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    println!("CLI feature not enabled. Enable with --features cli");
}
