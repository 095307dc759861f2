use serde::{Serialize, Serializer};
use std::fmt;

/// Firmware version packed into one register value as `0xMMmmss__`. The low byte isn't used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub subminor: u8,
}

impl From<u32> for FirmwareVersion {
    fn from(raw: u32) -> Self {
        let [major, minor, subminor, _] = raw.to_be_bytes();
        Self {
            major,
            minor,
            subminor,
        }
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.subminor)
    }
}

impl Serialize for FirmwareVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[test]
fn unpacks_version_bytes() {
    assert_eq!(FirmwareVersion::from(0x0102_0300).to_string(), "1.2.3");
    assert_eq!(FirmwareVersion::from(0).to_string(), "0.0.0");
    assert_eq!(FirmwareVersion::from(0x030A_0AFF).to_string(), "3.10.10");
}

#[test]
fn serialises_as_string() {
    assert_eq!(
        serde_json::to_value(FirmwareVersion::from(0x0102_0300)).unwrap(),
        serde_json::json!("1.2.3")
    );
}
