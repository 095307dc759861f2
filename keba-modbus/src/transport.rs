//! The seam between the register map and the wire.

use std::io::{Error, ErrorKind};
use std::net::{SocketAddr, ToSocketAddrs};

use tokio_modbus::client::sync::{self, Reader, Writer};
use tokio_modbus::slave::Slave;
use tracing::debug;

use crate::config::Config;
use crate::register::Address;

/// A blocking, unit-addressed holding register connection.
///
/// Implementations own the underlying socket exclusively and never reconnect by themselves.
pub trait Transport {
    fn read_holding_registers(&mut self, address: Address, count: u16) -> Result<Vec<u16>, Error>;

    fn write_single_register(&mut self, address: Address, word: u16) -> Result<(), Error>;

    /// Politely close the connection. Dropping the transport must release it regardless.
    fn disconnect(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

impl Transport for sync::Context {
    fn read_holding_registers(&mut self, address: Address, count: u16) -> Result<Vec<u16>, Error> {
        Reader::read_holding_registers(self, address, count)
    }

    fn write_single_register(&mut self, address: Address, word: u16) -> Result<(), Error> {
        Writer::write_single_register(self, address, word)
    }

    fn disconnect(&mut self) -> Result<(), Error> {
        use tokio_modbus::client::sync::Client;
        use tokio_modbus::prelude::Request;
        // The transport is torn down by failing the disconnect request
        match self.call(Request::Disconnect) {
            Ok(_) => Ok(()),
            Err(err) if matches!(err.kind(), ErrorKind::NotConnected | ErrorKind::BrokenPipe) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// Open a Modbus/TCP connection to the configured station, addressed to its unit id.
pub(crate) fn open(config: &Config) -> Result<sync::Context, Error> {
    let socket_addr = resolve(&config.host, config.port)?;
    debug!(%socket_addr, unit = config.unit, timeout = ?config.timeout, "Opening Modbus/TCP connection");

    sync::tcp::connect_slave_with_timeout(socket_addr, Slave(config.unit), Some(config.timeout))
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, Error> {
    (host, port).to_socket_addrs()?.next().ok_or_else(|| {
        Error::new(
            ErrorKind::AddrNotAvailable,
            format!("{} did not resolve to any address", host),
        )
    })
}

#[test]
fn resolves_literal_addresses() {
    let addr = resolve("127.0.0.1", 502).unwrap();
    assert_eq!(addr, "127.0.0.1:502".parse::<SocketAddr>().unwrap());
}
