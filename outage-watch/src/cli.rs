use clap::{Parser, Subcommand, ValueEnum};
use outage_sources::{Day, ProviderId};

#[derive(Parser, Debug)]
#[command(name = "outage-watch", version, about = "Power outage schedule watcher")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll providers and publish changes until interrupted (default).
    Run,
    /// Inspect or change the runtime schedule config.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Inspect or publish stored schedules.
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the current config and the latest stored schedules.
    Show,
    /// Turn group sending on or off.
    Sending {
        #[arg(value_enum)]
        state: Switch,
    },
    /// Enable or disable polling of a provider (kd, dtek, yasno).
    Toggle { provider: ProviderId },
    /// Set the per-date cooldown between group sends.
    Cooldown { minutes: u32 },
}

#[derive(Subcommand, Debug)]
pub enum ScheduleCommand {
    /// Print the schedule for today or tomorrow.
    Show { day: Day },
    /// Send the schedule for today or tomorrow to every group now.
    Broadcast { day: Day },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub fn enabled(self) -> bool {
        self == Switch::On
    }
}
