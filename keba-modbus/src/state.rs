use serde::{Serialize, Serializer};

/// A raw enumerated register value, along with its meaning when the station documents one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StateReport<S> {
    pub state: u32,

    #[serde(rename = "text", skip_serializing_if = "Option::is_none")]
    pub known: Option<S>,
}

impl<S: Describe> StateReport<S> {
    pub fn from_raw(state: u32) -> Self {
        Self {
            state,
            known: S::from_raw(state),
        }
    }

    pub fn text(&self) -> Option<&'static str> {
        self.known.as_ref().map(Describe::text)
    }
}

pub trait Describe: Sized {
    fn from_raw(raw: u32) -> Option<Self>;
    fn text(&self) -> &'static str;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChargingState {
    StartUp = 0,
    NotReady = 1,
    Ready = 2,
    Charging = 3,
    Error = 4,
    Suspended = 5,
}

impl Describe for ChargingState {
    fn from_raw(raw: u32) -> Option<Self> {
        use ChargingState::*;
        Some(match raw {
            0 => StartUp,
            1 => NotReady,
            2 => Ready,
            3 => Charging,
            4 => Error,
            5 => Suspended,
            _ => return None,
        })
    }

    fn text(&self) -> &'static str {
        use ChargingState::*;
        match self {
            StartUp => "Start-up of the charging station",
            NotReady => "The charging station is not ready for charging. The charging station is not connected to an electric vehicle, it is locked by the authorization function or another mechanism.",
            Ready => "The charging station is ready for charging and waits for a reaction from the electric vehicle.",
            Charging => "A charging process is active.",
            Error => "An error has occurred.",
            Suspended => "The charging process is temporarily interrupted because the temperature is too high or the wallbox is in suspended mode.",
        }
    }
}

// Bit 0: plugged at the station, bit 1: locked, bit 2: plugged at the vehicle. Only some combinations are documented.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CableState {
    Unplugged = 0,
    Station = 1,
    StationLocked = 3,
    Vehicle = 5,
    VehicleLocked = 7,
}

impl Describe for CableState {
    fn from_raw(raw: u32) -> Option<Self> {
        use CableState::*;
        Some(match raw {
            0 => Unplugged,
            1 => Station,
            3 => StationLocked,
            5 => Vehicle,
            7 => VehicleLocked,
            _ => return None,
        })
    }

    fn text(&self) -> &'static str {
        use CableState::*;
        match self {
            Unplugged => "No cable is plugged",
            Station => "Cable is connected to the charging station (not to the electric vehicle).",
            StationLocked => "Cable is connected to the charging station and locked (not to the electric vehicle).",
            Vehicle => "Cable is connected to the charging station and the electric vehicle (not locked).",
            VehicleLocked => "Cable is connected to the charging station and the electric vehicle and locked (charging).",
        }
    }
}

impl Serialize for ChargingState {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        serializer.serialize_str(self.text())
    }
}

impl Serialize for CableState {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        serializer.serialize_str(self.text())
    }
}

#[cfg(test)]
use pretty_assertions::assert_eq;

#[test]
fn charging_state_text() {
    let report = StateReport::<ChargingState>::from_raw(3);
    assert_eq!(report.known, Some(ChargingState::Charging));
    assert_eq!(report.text(), Some("A charging process is active."));

    let unknown = StateReport::<ChargingState>::from_raw(99);
    assert_eq!(unknown.state, 99);
    assert_eq!(unknown.text(), None);
}

#[test]
fn every_documented_charging_state_has_text() {
    for raw in 0..=5 {
        let state = ChargingState::from_raw(raw).unwrap();
        assert_eq!(state as u32, raw);
        assert!(!state.text().is_empty());
    }
    assert_eq!(ChargingState::from_raw(6), None);
}

#[test]
fn undocumented_cable_states_are_kept_raw() {
    for raw in [2, 4, 6, 8, 255] {
        let report = StateReport::<CableState>::from_raw(raw);
        assert_eq!(report.state, raw);
        assert_eq!(report.known, None);
    }
    for raw in [0, 1, 3, 5, 7] {
        assert_eq!(CableState::from_raw(raw).map(|s| s as u32), Some(raw));
    }
}

#[test]
fn serialises_with_text_only_when_known() {
    use serde_json::json;

    assert_eq!(
        serde_json::to_value(StateReport::<CableState>::from_raw(0)).unwrap(),
        json!({ "state": 0, "text": "No cable is plugged" })
    );
    assert_eq!(
        serde_json::to_value(StateReport::<CableState>::from_raw(7)).unwrap(),
        json!({
            "state": 7,
            "text": "Cable is connected to the charging station and the electric vehicle and locked (charging)."
        })
    );
    assert_eq!(
        serde_json::to_value(StateReport::<CableState>::from_raw(2)).unwrap(),
        json!({ "state": 2 })
    );
    assert_eq!(
        serde_json::to_value(StateReport::<ChargingState>::from_raw(99)).unwrap(),
        json!({ "state": 99 })
    );
}
