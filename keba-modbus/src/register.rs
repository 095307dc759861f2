//! The register map of a KeContact P30 and the rules for turning its words into values.
//!
//! Every readable register is a big-endian unsigned 32-bit integer spread over two holding registers, most
//! significant word first. Writable registers take a single 16-bit word.

use rust_decimal::Decimal;

pub type Address = u16;

/// Number of 16-bit words making up every readable value.
pub const VALUE_WORDS: u16 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Register {
    ChargingState,
    CableState,
    SerialNumber,
    FirmwareVersion,
    ActivePower,
    TotalEnergy,
    MaxChargingCurrent,
    MaxSupportedCurrent,
    RfidCard,
    ChargedEnergy,

    SetChargingCurrent,
    SetEnergy,
    UnlockPlug,
    EnableStation,
}

impl Register {
    pub const fn address(self) -> Address {
        use Register::*;
        match self {
            ChargingState => 1000,
            CableState => 1004,
            SerialNumber => 1014,
            FirmwareVersion => 1018,
            ActivePower => 1020,
            TotalEnergy => 1036,
            MaxChargingCurrent => 1100,
            MaxSupportedCurrent => 1110,
            RfidCard => 1500,
            ChargedEnergy => 1502,

            SetChargingCurrent => 5004,
            SetEnergy => 5010,
            UnlockPlug => 5012,
            EnableStation => 5014,
        }
    }

    /// Fixed-point adjustment applied to the raw value, if the register holds a scaled quantity.
    pub const fn adjustment(self) -> Option<Adjustment> {
        use Register::*;
        match self {
            ActivePower | ChargedEnergy => Some(Adjustment::MILLI),
            MaxChargingCurrent | MaxSupportedCurrent => Some(Adjustment::MILLI),
            TotalEnergy => Some(Adjustment { scale: -4 }),
            SetChargingCurrent => Some(Adjustment { scale: 3 }),
            SetEnergy => Some(Adjustment { scale: 2 }),
            _ => None,
        }
    }

    pub const fn is_writable(self) -> bool {
        self.address() >= 5000
    }
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct Adjustment {
    pub scale: i8, // powers of 10 (0 = no adjustment, 1 = x10, -1 = /10)
}

impl Adjustment {
    pub const MILLI: Self = Self { scale: -3 };

    /// Scaled value with any fraction dropped, e.g. milliamps to whole amps.
    pub fn apply_truncated(&self, raw: u32) -> u32 {
        match self.scale {
            0 => raw,
            s if s < 0 => raw / 10u32.pow(u32::from(s.unsigned_abs())),
            s => raw.saturating_mul(10u32.pow(s as u32)),
        }
    }

    /// Scaled value with exactly two decimal places, e.g. watt-hours to "1.50" kWh.
    ///
    /// The quotient is taken as an `f64` and rounded from its binary value, so a reading of 1015 Wh is "1.01", not
    /// "1.02". `None` only if the formatted float isn't a valid decimal.
    pub fn apply_two_places(&self, raw: u32) -> Option<Decimal> {
        let value = match self.scale {
            s if s < 0 => f64::from(raw) / 10f64.powi(-i32::from(s)),
            s => f64::from(raw) * 10f64.powi(i32::from(s)),
        };
        format!("{:.2}", value).parse().ok()
    }
}

/// Decode a two-word response as a big-endian `u32`. `None` when the response isn't exactly two words.
pub fn decode_u32(words: &[u16]) -> Option<u32> {
    let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
    bytes.try_into().ok().map(u32::from_be_bytes)
}

#[cfg(test)]
use pretty_assertions::assert_eq;

#[test]
fn decode_uses_big_endian_words_and_bytes() {
    assert_eq!(decode_u32(&[0x0102, 0x0304]), Some(0x0102_0304));
    assert_eq!(decode_u32(&[0x0000, 0x0003]), Some(3));
    assert_eq!(decode_u32(&[0xFFFF, 0xFFFF]), Some(u32::MAX));
}

#[test]
fn decode_rejects_wrong_word_count() {
    assert_eq!(decode_u32(&[]), None);
    assert_eq!(decode_u32(&[1]), None);
    assert_eq!(decode_u32(&[1, 2, 3]), None);
}

#[test]
fn addresses_match_the_station_manual() {
    use Register::*;
    let map: Vec<(Register, Address)> = [
        ChargingState,
        CableState,
        SerialNumber,
        FirmwareVersion,
        ActivePower,
        TotalEnergy,
        MaxChargingCurrent,
        MaxSupportedCurrent,
        RfidCard,
        ChargedEnergy,
    ]
    .into_iter()
    .map(|r| (r, r.address()))
    .collect();

    assert_eq!(
        map,
        vec![
            (ChargingState, 1000),
            (CableState, 1004),
            (SerialNumber, 1014),
            (FirmwareVersion, 1018),
            (ActivePower, 1020),
            (TotalEnergy, 1036),
            (MaxChargingCurrent, 1100),
            (MaxSupportedCurrent, 1110),
            (RfidCard, 1500),
            (ChargedEnergy, 1502),
        ]
    );
    assert!(map.iter().all(|(r, _)| !r.is_writable()));
    assert!(UnlockPlug.is_writable() && EnableStation.is_writable());
}

#[test]
fn two_place_formatting() {
    let milli = Adjustment::MILLI;
    let two_places = |adjust: Adjustment, raw| adjust.apply_two_places(raw).unwrap().to_string();
    assert_eq!(two_places(milli, 1500), "1.50");
    assert_eq!(two_places(milli, 0), "0.00");
    assert_eq!(two_places(milli, 22_080), "22.08");
    assert_eq!(two_places(milli, 1), "0.00");

    let total = Register::TotalEnergy.adjustment().unwrap();
    assert_eq!(two_places(total, 123_456), "12.35");
    assert_eq!(two_places(total, u32::MAX), "429496.73");
}

#[test]
fn two_place_rounding_follows_the_binary_quotient() {
    let milli = Adjustment::MILLI;
    let two_places = |raw| milli.apply_two_places(raw).unwrap().to_string();
    assert_eq!(two_places(5), "0.01");
    assert_eq!(two_places(1015), "1.01");
    assert_eq!(two_places(1035), "1.03");
    assert_eq!(two_places(2675), "2.67");
}

#[test]
fn truncation_drops_the_fraction() {
    let milli = Adjustment::MILLI;
    assert_eq!(milli.apply_truncated(32_000), 32);
    assert_eq!(milli.apply_truncated(15_999), 15);
    assert_eq!(milli.apply_truncated(999), 0);
    assert_eq!(Adjustment { scale: 2 }.apply_truncated(7), 700);
}
