mod cli;

use chrono::Utc;
use clap::Parser;
use outage_sources::model::{date_iso, slot_label};
use outage_watch::config::Settings;
use outage_watch::database::repositories::ProcessedScheduleRepository;
use outage_watch::schedule::{ScheduleIntent, message};
use outage_watch::services::ServiceContainer;
use outage_watch::{Error, logging};
use tracing::info;

use crate::cli::{Args, Commands, ConfigCommand, ScheduleCommand};

const RECENT_SCHEDULES: i64 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let settings = Settings::from_env()?;
    let _log_guard = logging::init_logging(settings.log_dir.as_deref(), settings.timezone)?;

    let container = ServiceContainer::new(settings).await?;

    let result = match args.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&container).await,
        Commands::Config { command } => config_command(&container, command).await,
        Commands::Schedule { command } => schedule_command(&container, command).await,
    };

    if !container.cancellation_token().is_cancelled() {
        container.shutdown().await?;
    }
    result?;
    Ok(())
}

async fn run(container: &ServiceContainer) -> outage_watch::Result<()> {
    container.start();
    info!(
        "outage-watch {} running, press Ctrl+C to stop",
        env!("CARGO_PKG_VERSION")
    );

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");
    container.shutdown().await
}

async fn config_command(
    container: &ServiceContainer,
    command: ConfigCommand,
) -> outage_watch::Result<()> {
    let service = &container.config_service;
    match command {
        ConfigCommand::Show => {
            let config = service.current();
            println!("sending enabled: {}", config.schedule_sending_enabled);
            let providers: Vec<&str> = config
                .enabled_providers()
                .into_iter()
                .map(|id| id.as_str())
                .collect();
            println!("enabled providers: {}", providers.join(", "));
            println!("cooldown: {} min", config.cooldown_minutes);

            let configured: Vec<&str> = container
                .source_ids()
                .into_iter()
                .map(|id| id.as_str())
                .collect();
            println!("configured sources: {}", configured.join(", "));

            println!();
            for record in container.schedule_repo.list_recent(RECENT_SCHEDULES).await? {
                let outages: Vec<String> = message::compress(&record.hours)
                    .iter()
                    .map(|r| format!("{}-{} ({})", slot_label(r.start), slot_label(r.end), r.state))
                    .collect();
                println!(
                    "{}  {:<5}  sent={:<5}  {}",
                    record.date_iso,
                    record.provider_id,
                    record.is_sent,
                    if outages.is_empty() {
                        "no outages".to_string()
                    } else {
                        outages.join(", ")
                    }
                );
            }
        }
        ConfigCommand::Sending { state } => {
            service.set_sending_enabled(state.enabled()).await?;
            println!("sending {}", if state.enabled() { "enabled" } else { "disabled" });
        }
        ConfigCommand::Toggle { provider } => {
            let enabled = service.toggle_provider(provider).await?;
            println!("{} {}", provider, if enabled { "enabled" } else { "disabled" });
        }
        ConfigCommand::Cooldown { minutes } => {
            service.set_cooldown_minutes(minutes).await?;
            println!("cooldown set to {} min", minutes);
        }
    }
    Ok(())
}

async fn schedule_command(
    container: &ServiceContainer,
    command: ScheduleCommand,
) -> outage_watch::Result<()> {
    let orchestrator = &container.orchestrator;
    match command {
        ScheduleCommand::Show { day } => {
            let date = day.resolve(Utc::now(), orchestrator.timezone());
            let grid = orchestrator.preview_schedule(date).await?.ok_or_else(|| {
                Error::not_found("schedule", date_iso(date, orchestrator.timezone()))
            })?;
            println!("{}", message::day_message(date, day, &grid));
        }
        ScheduleCommand::Broadcast { day } => {
            orchestrator
                .handle_intent(ScheduleIntent::BroadcastSchedule { day })
                .await;
        }
    }
    Ok(())
}
