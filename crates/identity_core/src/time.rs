use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Milliseconds since the unix epoch.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
        Self((nanos / 1_000_000) as i64)
    }

    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub fn as_millis(self) -> i64 {
        self.0
    }

    pub fn offset_millis(self, delta: i64) -> Self {
        Self(self.0.saturating_add(delta))
    }
}

#[cfg(test)]
mod tests {
    use super::Timestamp;

    #[test]
    fn now_is_monotonic_enough_for_ordering() {
        let first = Timestamp::now();
        let later = first.offset_millis(1);
        assert!(later > first);
        assert_eq!(later.as_millis() - first.as_millis(), 1);
    }
}
