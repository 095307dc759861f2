use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use keba_modbus::{CableState, ChargingState, Config, Error, RegisterClient};
use pretty_assertions::assert_eq;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Seen {
    Read { unit: u8, address: u16, count: u16 },
    Write { unit: u8, address: u16, word: u16 },
}

/// Answers holding register reads from a fixed table of 32-bit values and acknowledges single register writes.
struct FakeStation {
    port: u16,
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl FakeStation {
    fn start(values: &[(u16, u32)]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let seen = Arc::new(Mutex::new(vec![]));

        let mut words = HashMap::new();
        for &(address, value) in values {
            words.insert(address, (value >> 16) as u16);
            words.insert(address + 1, value as u16);
        }

        let words = Arc::new(words);
        {
            let seen = seen.clone();
            thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(stream) = stream else { break };
                    let (words, seen) = (words.clone(), seen.clone());
                    thread::spawn(move || serve(stream, &words, &seen));
                }
            });
        }

        Self { port, seen }
    }

    fn config(&self) -> Config {
        Config::new("127.0.0.1")
            .with_port(self.port)
            .with_timeout(Duration::from_secs(2))
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

fn serve(mut stream: TcpStream, words: &HashMap<u16, u16>, seen: &Mutex<Vec<Seen>>) {
    loop {
        let mut header = [0u8; 7];
        if stream.read_exact(&mut header).is_err() {
            return;
        }
        let len = u16::from_be_bytes([header[4], header[5]]) as usize;
        let unit = header[6];
        let mut pdu = vec![0u8; len - 1];
        if stream.read_exact(&mut pdu).is_err() {
            return;
        }

        let address = u16::from_be_bytes([pdu[1], pdu[2]]);
        let operand = u16::from_be_bytes([pdu[3], pdu[4]]);

        let response = match pdu[0] {
            0x03 => {
                seen.lock().unwrap().push(Seen::Read {
                    unit,
                    address,
                    count: operand,
                });
                let mut response = vec![0x03, (operand * 2) as u8];
                for offset in 0..operand {
                    let word = words.get(&(address + offset)).copied().unwrap_or_default();
                    response.extend_from_slice(&word.to_be_bytes());
                }
                response
            }
            0x06 => {
                seen.lock().unwrap().push(Seen::Write {
                    unit,
                    address,
                    word: operand,
                });
                pdu.clone()
            }
            // Illegal function
            code => vec![code | 0x80, 0x01],
        };

        let mut frame = Vec::with_capacity(7 + response.len());
        frame.extend_from_slice(&header[0..4]);
        frame.extend_from_slice(&(response.len() as u16 + 1).to_be_bytes());
        frame.push(unit);
        frame.extend_from_slice(&response);
        if stream.write_all(&frame).is_err() {
            return;
        }
    }
}

#[test]
fn reads_telemetry_over_tcp() {
    let station = FakeStation::start(&[
        (1000, 3),
        (1004, 5),
        (1018, 0x0102_0300),
        (1020, 1500),
        (1500, 0xCAFE_F00D),
    ]);
    let mut client = RegisterClient::connect(station.config()).unwrap();

    let charging = client.charging_state().unwrap();
    assert_eq!(charging.known, Some(ChargingState::Charging));
    let cable = client.cable_state().unwrap();
    assert_eq!(cable.known, Some(CableState::Vehicle));
    assert_eq!(client.firmware_version().unwrap().to_string(), "1.2.3");
    assert_eq!(client.active_power().unwrap().to_string(), "1.50");
    assert_eq!(client.rfid_card().unwrap(), "CAFEF00D");
    client.close();

    assert_eq!(
        station.seen(),
        [1000, 1004, 1018, 1020, 1500]
            .into_iter()
            .map(|address| Seen::Read {
                unit: 255,
                address,
                count: 2
            })
            .collect::<Vec<_>>()
    );
}

#[test]
fn writes_commands_with_the_configured_unit() {
    let station = FakeStation::start(&[]);
    let mut client = RegisterClient::connect(station.config().with_unit(1)).unwrap();

    client.set_charging_current(16).unwrap();
    client.set_energy_limit(10).unwrap();
    client.unlock_plug().unwrap();
    client.enable_charging_station().unwrap();
    client.disable_charging_station().unwrap();
    assert!(client.set_charging_current(6).is_err());

    assert_eq!(
        station.seen(),
        vec![
            Seen::Write {
                unit: 1,
                address: 5004,
                word: 16_000
            },
            Seen::Write {
                unit: 1,
                address: 5010,
                word: 1_000
            },
            Seen::Write {
                unit: 1,
                address: 5012,
                word: 0
            },
            Seen::Write {
                unit: 1,
                address: 5014,
                word: 1
            },
            Seen::Write {
                unit: 1,
                address: 5014,
                word: 0
            },
        ]
    );
}

#[test]
fn summary_reads_ten_registers() {
    let station = FakeStation::start(&[(1000, 2), (1036, 100_000)]);
    let mut client = RegisterClient::connect(station.config()).unwrap();

    let summary = client.summary().unwrap();
    assert_eq!(summary.total_energy.to_string(), "10.00");
    assert_eq!(summary.cable_state.text(), Some("No cable is plugged"));
    assert_eq!(station.seen().len(), 10);
}

#[test]
fn reconnect_opens_a_new_connection() {
    let station = FakeStation::start(&[(1014, 17)]);
    let mut client = RegisterClient::connect(station.config()).unwrap();
    assert_eq!(client.serial_number().unwrap(), 17);

    client.reconnect().unwrap();
    assert_eq!(client.serial_number().unwrap(), 17);
}

#[test]
fn refused_connection_is_a_connection_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let result = RegisterClient::connect(
        Config::new("127.0.0.1")
            .with_port(port)
            .with_timeout(Duration::from_secs(2)),
    );
    assert!(matches!(
        result,
        Err(Error::Connection { port: p, .. }) if p == port
    ));
}
