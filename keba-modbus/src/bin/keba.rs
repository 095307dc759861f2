use std::time::Duration;

use clap::{Parser, Subcommand};
use keba_modbus::{Config, RegisterClient, Result};
use tracing::{error, Level};

#[derive(Parser, Debug)]
#[clap(
    name = "keba",
    version,
    author,
    about = "Query and control a KEBA charging station over Modbus/TCP"
)]
struct Cli {
    #[clap(env = "KEBA_HOST", value_hint = clap::ValueHint::Hostname)]
    host: String,

    #[clap(short, long, env = "KEBA_PORT", default_value_t = 502)]
    port: u16,

    #[clap(short, long, env = "KEBA_UNIT", default_value_t = 255)]
    unit: u8,

    #[clap(short, long, default_value = "10s", value_parser = humantime::parse_duration)]
    timeout: Duration,

    /// Trace raw register words
    #[clap(short, long)]
    debug: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every telemetry value as JSON
    Summary,
    /// Print the charging state
    State,
    /// Print the cable state
    Cable,
    /// Set the charging current in amps
    SetCurrent { amps: u32 },
    /// Terminate the session after this many kWh
    SetEnergy { kwh: u32 },
    /// Unlock the connector
    Unlock,
    /// Enable charging
    Enable,
    /// Disable charging
    Disable,
}

fn main() {
    let args = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.debug { Level::DEBUG } else { Level::INFO })
        .init();

    if let Err(error) = run(args) {
        error!(%error, "keba failed");
        std::process::exit(1);
    }
}

fn run(args: Cli) -> Result<()> {
    let config = Config::new(args.host)
        .with_port(args.port)
        .with_unit(args.unit)
        .with_timeout(args.timeout)
        .with_debug(args.debug);

    let mut station = RegisterClient::connect(config)?;
    let result = execute(&mut station, args.command);
    station.close();
    result
}

fn execute(station: &mut RegisterClient, command: Command) -> Result<()> {
    match command {
        Command::Summary => {
            let summary = station.summary()?;
            // Serialising plain data into a string can't fail.
            println!("{}", serde_json::to_string_pretty(&summary).unwrap_or_default());
        }
        Command::State => {
            let state = station.charging_state()?;
            println!("{} {}", state.state, state.text().unwrap_or_default());
        }
        Command::Cable => {
            let state = station.cable_state()?;
            println!("{} {}", state.state, state.text().unwrap_or_default());
        }
        Command::SetCurrent { amps } => station.set_charging_current(amps)?,
        Command::SetEnergy { kwh } => station.set_energy_limit(kwh)?,
        Command::Unlock => station.unlock_plug()?,
        Command::Enable => station.enable_charging_station()?,
        Command::Disable => station.disable_charging_station()?,
    }
    Ok(())
}
