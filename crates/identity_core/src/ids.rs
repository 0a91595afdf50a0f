use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::{IdentityError, IdentityResult};

/// Identifier of an attributed type. Every id maps to exactly one root row.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Id(pub [u8; 16]);

impl Id {
    pub fn new() -> Self {
        Self(*Uuid::new_v4().as_bytes())
    }

    pub fn parse(value: &str) -> IdentityResult<Self> {
        let uuid = Uuid::parse_str(value)
            .map_err(|err| IdentityError::invalid(format!("invalid id '{value}': {err}")))?;
        Ok(Self(*uuid.as_bytes()))
    }

    pub fn as_bytes(self) -> [u8; 16] {
        self.0
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let uuid = Uuid::from_bytes(self.0);
        write!(f, "{uuid}")
    }
}

impl FromStr for Id {
    type Err = IdentityError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Serialize for Id {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Id::parse(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::Id;

    #[test]
    fn id_roundtrips_through_text() {
        let id = Id::new();
        let parsed = Id::parse(&id.to_string()).expect("parse");
        assert_eq!(parsed, id);
        let from_str: Id = id.to_string().parse().expect("from_str");
        assert_eq!(from_str.as_bytes(), id.as_bytes());
    }

    #[test]
    fn id_rejects_invalid_strings() {
        assert!(Id::parse("not-an-id").is_err());
    }

    #[test]
    fn id_serializes_as_string() {
        let id = Id::new();
        let encoded = serde_json::to_string(&id).expect("encode");
        assert_eq!(encoded, format!("\"{id}\""));
        let decoded: Id = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, id);
    }
}
