mod config;
mod error;
mod schedule;
mod web;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use config::SchedulerConfig;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "interview_scheduler=info,actix_web=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SchedulerConfig::from_env();

    // port override from the command line, falling back to PORT / default
    let args: Vec<String> = std::env::args().collect();
    let port = args
        .get(1)
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(config.port);

    tracing::info!(
        port,
        slot_duration = config.slot_duration_minutes,
        daily_capacity = config.daily_capacity,
        weekly_capacity = config.weekly_capacity,
        "starting interview scheduler"
    );

    web::start_server(port, config).await
}
