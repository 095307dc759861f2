use rust_decimal::Decimal;
use serde::Serialize;
use tokio_modbus::client::sync;
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::firmware::FirmwareVersion;
use crate::register::{decode_u32, Address, Adjustment, Register, VALUE_WORDS};
use crate::state::{CableState, ChargingState, StateReport};
use crate::transport::{self, Transport};
use crate::{Error, Result};

/// A client for a single KEBA charging station.
///
/// Every accessor performs a fresh round trip; nothing is cached. The connection is opened once in [`connect`] and
/// never silently re-established: after a failure, call [`reconnect`] or build a new client.
///
/// The client takes `&mut self` for every operation, so sharing one between threads needs external
/// synchronisation (e.g. a `Mutex`).
///
/// [`connect`]: RegisterClient::connect
/// [`reconnect`]: RegisterClient::reconnect
pub struct RegisterClient<T: Transport = sync::Context> {
    config: Config,
    transport: T,
}

impl RegisterClient {
    /// Validate `config` and open the connection.
    ///
    /// Fails with [`Error::Configuration`] before touching the network when no host is given, and with
    /// [`Error::Connection`] when the station can't be reached.
    pub fn connect(config: Config) -> Result<Self> {
        config.validate()?;
        let transport = open(&config)?;
        info!(host = %config.host, port = config.port, unit = config.unit, "Connected to charging station");
        Ok(Self { config, transport })
    }

    /// Open a fresh connection with the same configuration, replacing the current one only on success.
    pub fn reconnect(&mut self) -> Result<()> {
        let transport = open(&self.config)?;
        let mut old = std::mem::replace(&mut self.transport, transport);
        if let Err(error) = old.disconnect() {
            debug!(?error, "Previous connection was already unusable");
        }
        info!(host = %self.config.host, port = self.config.port, "Reconnected to charging station");
        Ok(())
    }
}

fn open(config: &Config) -> Result<sync::Context> {
    transport::open(config).map_err(|source| Error::Connection {
        host: config.host.clone(),
        port: config.port,
        source,
    })
}

impl<T: Transport> RegisterClient<T> {
    /// Wrap an already established transport.
    pub fn with_transport(config: Config, transport: T) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, transport })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Disconnect and release the connection.
    pub fn close(mut self) {
        match self.transport.disconnect() {
            Ok(()) => info!(host = %self.config.host, "Closed connection to charging station"),
            Err(error) => warn!(?error, "Disconnect failed, dropping connection anyway"),
        }
    }

    /// Read the two words at `register` as a big-endian `u32`.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn read_u32(&mut self, register: Address) -> Result<u32> {
        let words = self
            .transport
            .read_holding_registers(register, VALUE_WORDS)
            .map_err(Error::transport(register))?;

        if self.config.debug {
            debug!(register, unit = self.config.unit, raw = ?words, "Received words");
        }

        decode_u32(&words).ok_or_else(|| Error::Transport {
            register,
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("expected {} words, got {}", VALUE_WORDS, words.len()),
            ),
        })
    }

    /// Write a single word to `register`. The write isn't read back.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn write_u16(&mut self, register: Address, value: u16) -> Result<()> {
        if self.config.debug {
            debug!(register, unit = self.config.unit, value, "Writing word");
        }
        self.transport
            .write_single_register(register, value)
            .map_err(Error::transport(register))
    }

    fn read(&mut self, register: Register) -> Result<u32> {
        let value = self.read_u32(register.address())?;
        trace!(?register, value, "Read register");
        Ok(value)
    }

    fn read_adjusted(&mut self, register: Register) -> Result<(u32, Adjustment)> {
        let raw = self.read(register)?;
        Ok((raw, register.adjustment().unwrap_or_default()))
    }

    fn read_two_places(&mut self, register: Register) -> Result<Decimal> {
        let (raw, adjust) = self.read_adjusted(register)?;
        adjust.apply_two_places(raw).ok_or_else(|| Error::Transport {
            register: register.address(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{} can't be scaled to a decimal", raw),
            ),
        })
    }

    fn write(&mut self, register: Register, value: u16) -> Result<()> {
        debug_assert!(register.is_writable(), "{:?} is read-only", register);
        trace!(?register, value, "Write register");
        self.write_u16(register.address(), value)
    }

    pub fn charging_state_raw(&mut self) -> Result<u32> {
        self.read(Register::ChargingState)
    }

    pub fn charging_state(&mut self) -> Result<StateReport<ChargingState>> {
        self.charging_state_raw().map(StateReport::from_raw)
    }

    pub fn cable_state_raw(&mut self) -> Result<u32> {
        self.read(Register::CableState)
    }

    pub fn cable_state(&mut self) -> Result<StateReport<CableState>> {
        self.cable_state_raw().map(StateReport::from_raw)
    }

    pub fn serial_number(&mut self) -> Result<u32> {
        self.read(Register::SerialNumber)
    }

    pub fn firmware_version(&mut self) -> Result<FirmwareVersion> {
        self.read(Register::FirmwareVersion).map(FirmwareVersion::from)
    }

    /// Currently applied charging current limit, in whole amps.
    pub fn max_charging_current(&mut self) -> Result<u32> {
        let (raw, adjust) = self.read_adjusted(Register::MaxChargingCurrent)?;
        Ok(adjust.apply_truncated(raw))
    }

    /// Highest current the hardware supports, in whole amps. This is the minimum of the DIP switch settings,
    /// cable coding and temperature monitoring.
    pub fn max_supported_current(&mut self) -> Result<u32> {
        let (raw, adjust) = self.read_adjusted(Register::MaxSupportedCurrent)?;
        Ok(adjust.apply_truncated(raw))
    }

    /// Active power in kW, to two decimal places.
    pub fn active_power(&mut self) -> Result<Decimal> {
        self.read_two_places(Register::ActivePower)
    }

    /// Lifetime energy meter reading in kWh, to two decimal places.
    pub fn total_energy(&mut self) -> Result<Decimal> {
        self.read_two_places(Register::TotalEnergy)
    }

    /// Energy transferred in the current charging session in kWh, to two decimal places.
    pub fn charged_energy(&mut self) -> Result<Decimal> {
        self.read_two_places(Register::ChargedEnergy)
    }

    /// Last RFID card presented, as 8 upper-case hex digits.
    pub fn rfid_card(&mut self) -> Result<String> {
        self.read(Register::RfidCard).map(|raw| format!("{:08X}", raw))
    }

    /// Set the charging current. Only 7 to 62 amps are accepted.
    pub fn set_charging_current(&mut self, amps: u32) -> Result<()> {
        if !(7..63).contains(&amps) {
            return Err(Error::ParameterOutOfRange {
                parameter: "current",
                value: amps,
                reason: "must be greater than 6 and less than 63",
            });
        }
        self.write_scaled(Register::SetChargingCurrent, "current", amps)
    }

    /// Set the energy after which the current (or next) charging session is terminated, in kWh.
    ///
    /// Only values above 1 are accepted, although the station itself documents 1 as valid.
    pub fn set_energy_limit(&mut self, kwh: u32) -> Result<()> {
        // FIXME: known defect, 1 is rejected. Relax to `kwh >= 1` once confirmed against a real station.
        if kwh <= 1 {
            return Err(Error::ParameterOutOfRange {
                parameter: "energy",
                value: kwh,
                reason: "must be greater than 1",
            });
        }
        self.write_scaled(Register::SetEnergy, "energy", kwh)
    }

    fn write_scaled(&mut self, register: Register, parameter: &'static str, value: u32) -> Result<()> {
        let adjust = register.adjustment().unwrap_or_default();
        let word = u16::try_from(adjust.apply_truncated(value)).map_err(|_| {
            Error::ParameterOutOfRange {
                parameter,
                value,
                reason: "too large for a single register",
            }
        })?;
        self.write(register, word)
    }

    pub fn unlock_plug(&mut self) -> Result<()> {
        self.write(Register::UnlockPlug, 0)
    }

    pub fn enable_charging_station(&mut self) -> Result<()> {
        self.write(Register::EnableStation, 1)
    }

    pub fn disable_charging_station(&mut self) -> Result<()> {
        self.write(Register::EnableStation, 0)
    }

    /// Read every telemetry value once. Registers are read one after another, so the result isn't an atomic
    /// snapshot.
    pub fn summary(&mut self) -> Result<Summary> {
        Ok(Summary {
            charging_state: self.charging_state()?,
            firmware_version: self.firmware_version()?,
            max_supported_current: self.max_supported_current()?,
            max_charging_current: self.max_charging_current()?,
            cable_state: self.cable_state()?,
            serial_number: self.serial_number()?,
            active_power: self.active_power()?,
            total_energy: self.total_energy()?,
            charged_energy: self.charged_energy()?,
            rfid_card: self.rfid_card()?,
        })
    }
}

impl<T: Transport> std::fmt::Debug for RegisterClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub charging_state: StateReport<ChargingState>,
    pub firmware_version: FirmwareVersion,
    pub max_supported_current: u32,
    pub max_charging_current: u32,
    pub cable_state: StateReport<CableState>,
    pub serial_number: u32,
    #[serde(with = "rust_decimal::serde::str")]
    pub active_power: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_energy: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub charged_energy: Decimal,
    #[serde(rename = "RFIDcard")]
    pub rfid_card: String,
}

#[cfg(test)]
use pretty_assertions::assert_eq;

#[cfg(test)]
#[derive(Default)]
struct Recorder {
    registers: std::collections::HashMap<Address, u32>,
    reads: Vec<(Address, u16)>,
    writes: Vec<(Address, u16)>,
    fail: bool,
}

#[cfg(test)]
impl Transport for Recorder {
    fn read_holding_registers(
        &mut self,
        address: Address,
        count: u16,
    ) -> std::result::Result<Vec<u16>, std::io::Error> {
        self.reads.push((address, count));
        if self.fail {
            return Err(std::io::ErrorKind::ConnectionReset.into());
        }
        let value = self.registers.get(&address).copied().unwrap_or_default();
        Ok(vec![(value >> 16) as u16, value as u16])
    }

    fn write_single_register(
        &mut self,
        address: Address,
        word: u16,
    ) -> std::result::Result<(), std::io::Error> {
        if self.fail {
            return Err(std::io::ErrorKind::TimedOut.into());
        }
        self.writes.push((address, word));
        Ok(())
    }
}

#[cfg(test)]
fn client_with(registers: &[(Address, u32)]) -> RegisterClient<Recorder> {
    let transport = Recorder {
        registers: registers.iter().copied().collect(),
        ..Default::default()
    };
    RegisterClient::with_transport(Config::new("test"), transport).unwrap()
}

#[test]
fn read_u32_requests_two_words_at_the_register() {
    let mut client = client_with(&[(1014, 0x0001_E240)]);
    assert_eq!(client.read_u32(1014).unwrap(), 123_456);
    assert_eq!(client.transport.reads, vec![(1014, 2)]);
}

#[test]
fn accessors_always_read_again() {
    let mut client = client_with(&[(1000, 3)]);
    client.charging_state().unwrap();
    client.transport.registers.insert(1000, 2);
    let report = client.charging_state().unwrap();
    assert_eq!(report.known, Some(ChargingState::Ready));
    assert_eq!(client.transport.reads, vec![(1000, 2), (1000, 2)]);
}

#[test]
fn derived_values() {
    let mut client = client_with(&[
        (1004, 2),
        (1018, 0x0102_0300),
        (1020, 1500),
        (1036, 123_456),
        (1100, 16_000),
        (1110, 31_999),
        (1500, 0xBEEF),
        (1502, 7_126),
    ]);

    let cable = client.cable_state().unwrap();
    assert_eq!((cable.state, cable.known), (2, None));
    assert_eq!(client.firmware_version().unwrap().to_string(), "1.2.3");
    assert_eq!(client.active_power().unwrap().to_string(), "1.50");
    assert_eq!(client.total_energy().unwrap().to_string(), "12.35");
    assert_eq!(client.max_charging_current().unwrap(), 16);
    assert_eq!(client.max_supported_current().unwrap(), 31);
    assert_eq!(client.rfid_card().unwrap(), "0000BEEF");
    assert_eq!(client.charged_energy().unwrap().to_string(), "7.13");
}

#[test]
fn charging_current_bounds_are_exclusive() {
    let mut client = client_with(&[]);
    for amps in [0, 5, 6, 63, 64] {
        assert!(matches!(
            client.set_charging_current(amps),
            Err(Error::ParameterOutOfRange { value, .. }) if value == amps
        ));
    }
    assert!(client.transport.writes.is_empty());

    client.set_charging_current(10).unwrap();
    client.set_charging_current(7).unwrap();
    client.set_charging_current(62).unwrap();
    assert_eq!(
        client.transport.writes,
        vec![(5004, 10_000), (5004, 7_000), (5004, 62_000)]
    );
}

#[test]
fn energy_limit_rejects_one() {
    let mut client = client_with(&[]);
    assert!(matches!(
        client.set_energy_limit(0),
        Err(Error::ParameterOutOfRange { .. })
    ));
    assert!(matches!(
        client.set_energy_limit(1),
        Err(Error::ParameterOutOfRange { value: 1, .. })
    ));
    assert!(matches!(
        client.set_energy_limit(656),
        Err(Error::ParameterOutOfRange { value: 656, .. })
    ));
    assert!(client.transport.writes.is_empty());

    client.set_energy_limit(2).unwrap();
    client.set_energy_limit(655).unwrap();
    assert_eq!(client.transport.writes, vec![(5010, 200), (5010, 65_500)]);
}

#[test]
fn station_commands() {
    let mut client = client_with(&[]);
    client.unlock_plug().unwrap();
    client.enable_charging_station().unwrap();
    client.disable_charging_station().unwrap();
    assert_eq!(
        client.transport.writes,
        vec![(5012, 0), (5014, 1), (5014, 0)]
    );
    assert!(client.transport.reads.is_empty());
}

#[test]
fn summary_reads_each_register_once() {
    let mut client = client_with(&[
        (1000, 3),
        (1004, 7),
        (1014, 22_334_455),
        (1018, 0x0301_0200),
        (1020, 11_040),
        (1036, 52_345_678),
        (1100, 16_000),
        (1110, 32_000),
        (1500, 0x1A2B_3C4D),
        (1502, 3_500),
    ]);

    let summary = client.summary().unwrap();

    let mut reads = client.transport.reads.clone();
    reads.sort();
    assert_eq!(
        reads,
        [1000, 1004, 1014, 1018, 1020, 1036, 1100, 1110, 1500, 1502]
            .into_iter()
            .map(|address| (address, 2))
            .collect::<Vec<_>>()
    );

    assert_eq!(
        serde_json::to_value(&summary).unwrap(),
        serde_json::json!({
            "chargingState": { "state": 3, "text": "A charging process is active." },
            "firmwareVersion": "3.1.2",
            "maxSupportedCurrent": 32,
            "maxChargingCurrent": 16,
            "cableState": {
                "state": 7,
                "text": "Cable is connected to the charging station and the electric vehicle and locked (charging)."
            },
            "serialNumber": 22334455,
            "activePower": "11.04",
            "totalEnergy": "5234.57",
            "chargedEnergy": "3.50",
            "RFIDcard": "1A2B3C4D",
        })
    );
}

#[test]
fn transport_failures_are_not_swallowed() {
    let mut client = client_with(&[]);
    client.transport.fail = true;

    assert!(matches!(
        client.summary(),
        Err(Error::Transport { register: 1000, .. })
    ));
    assert_eq!(client.transport.reads.len(), 1);
    assert!(matches!(
        client.unlock_plug(),
        Err(Error::Transport { register: 5012, .. })
    ));
}

#[test]
fn short_responses_are_transport_errors() {
    struct Short;
    impl Transport for Short {
        fn read_holding_registers(
            &mut self,
            _: Address,
            _: u16,
        ) -> std::result::Result<Vec<u16>, std::io::Error> {
            Ok(vec![42])
        }
        fn write_single_register(
            &mut self,
            _: Address,
            _: u16,
        ) -> std::result::Result<(), std::io::Error> {
            Ok(())
        }
    }

    let mut client = RegisterClient::with_transport(Config::new("test"), Short).unwrap();
    match client.serial_number() {
        Err(Error::Transport { register, source }) => {
            assert_eq!(register, 1014);
            assert_eq!(source.kind(), std::io::ErrorKind::InvalidData);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn missing_host_fails_before_connecting() {
    assert!(matches!(
        RegisterClient::connect(Config::new("")),
        Err(Error::Configuration(_))
    ));
    assert!(matches!(
        RegisterClient::with_transport(Config::new(" "), Recorder::default()),
        Err(Error::Configuration(_))
    ));
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "read-only")]
fn writing_a_telemetry_register_is_a_bug() {
    let mut client = client_with(&[]);
    let _ = client.write(Register::SerialNumber, 1);
}

#[test]
fn raw_words_are_only_logged_in_debug_mode() {
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);
    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let logged = |debug: bool| {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            let mut client = client_with(&[(1000, 3)]);
            client.config.debug = debug;
            client.charging_state().unwrap();
        });
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    };

    let quiet = logged(false);
    assert!(!quiet.contains("Read register"), "{}", quiet);
    assert!(!quiet.contains("Received words"), "{}", quiet);

    assert!(logged(true).contains("Received words"));
}
