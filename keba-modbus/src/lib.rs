//! Blocking Modbus/TCP client for KEBA KeContact P30 charging stations.
//!
//! ```no_run
//! use keba_modbus::{Config, RegisterClient};
//!
//! # fn main() -> keba_modbus::Result<()> {
//! let mut station = RegisterClient::connect(Config::new("192.168.161.103"))?;
//! println!("{}", station.charging_state()?.state);
//! station.set_charging_current(16)?;
//! station.close();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod firmware;
pub mod register;
pub mod state;
pub mod transport;

mod error;
pub use error::Error;

pub use client::{RegisterClient, Summary};
pub use config::Config;
pub use firmware::FirmwareVersion;
pub use state::{CableState, ChargingState, Describe, StateReport};

pub type Result<T> = std::result::Result<T, Error>;
