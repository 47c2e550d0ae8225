use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use super::id::{DeviceId, GroupId};
use crate::{Error, Result};

/// Six decimal digits, leading zeros preserved. The short secret a player
/// redeems once to bind itself to a device record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessCode(String);

impl AccessCode {
    pub const LEN: usize = 6;

    /// Draw a uniformly random code.
    #[must_use]
    pub fn generate<R: rand::Rng + rand::RngExt + ?Sized>(rng: &mut R) -> Self {
        Self(format!("{:06}", rng.random_range(0..1_000_000u32)))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for AccessCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() == Self::LEN && s.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(s.to_string()))
        } else {
            Err(Error::InvalidInput(
                "Access code must be exactly six digits".to_string(),
            ))
        }
    }
}

impl fmt::Display for AccessCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for AccessCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AccessCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Landscape,
    Portrait,
}

/// One physical display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub access_code: AccessCode,
    /// Set once a player has redeemed the access code; rotating the code
    /// clears it.
    pub is_bound: bool,
    pub is_active: bool,
    pub group_id: Option<GroupId>,
    pub orientation: Orientation,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub is_online: bool,
    pub ip_address: Option<String>,
    /// Reported by the renderer via heartbeat; unknown until then.
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
    pub location: Option<String>,
    pub description: Option<String>,
}

impl Device {
    #[must_use]
    pub fn new(id: DeviceId, name: String, access_code: AccessCode) -> Self {
        Self {
            id,
            name,
            access_code,
            is_bound: false,
            is_active: true,
            group_id: None,
            orientation: Orientation::default(),
            flip_horizontal: false,
            flip_vertical: false,
            last_seen: None,
            is_online: false,
            ip_address: None,
            screen_width: None,
            screen_height: None,
            location: None,
            description: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_code_parse() {
        assert!("012345".parse::<AccessCode>().is_ok());
        assert!("000000".parse::<AccessCode>().is_ok());
        assert!("12345".parse::<AccessCode>().is_err());
        assert!("1234567".parse::<AccessCode>().is_err());
        assert!("12a456".parse::<AccessCode>().is_err());
    }

    #[test]
    fn test_access_code_preserves_leading_zeros() {
        let code: AccessCode = "004211".parse().unwrap();
        assert_eq!(code.to_string(), "004211");
        assert_eq!(serde_json::to_string(&code).unwrap(), r#""004211""#);
    }

    #[test]
    fn test_generate_is_six_digits() {
        let mut rng = rand::rng();
        for _ in 0..100 {
            let code = AccessCode::generate(&mut rng);
            assert_eq!(code.as_str().len(), 6);
            assert!(code.as_str().bytes().all(|b| b.is_ascii_digit()));
        }
    }
}
