//! Timestamp helpers.
//!
//! Message timestamps are stored as RFC 3339 strings and shown to the user as
//! a wall-clock `HH:MM` label.

use serde::{Deserialize, Deserializer, Serializer};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

/// Deserialize an RFC 3339 formatted string into an OffsetDateTime
pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    OffsetDateTime::parse(&s, &Rfc3339).map_err(serde::de::Error::custom)
}

/// Serialize an OffsetDateTime into an RFC 3339 formatted string
pub fn serialize<S>(datetime: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let s = datetime
        .format(&Rfc3339)
        .map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&s)
}

/// Milliseconds since the Unix epoch for the given instant, clamped at zero.
pub fn unix_millis(datetime: OffsetDateTime) -> u64 {
    let millis = datetime.unix_timestamp_nanos() / 1_000_000;
    u64::try_from(millis).unwrap_or(0)
}

/// Formats the instant as a 24-hour `HH:MM` label.
pub fn clock_label(datetime: OffsetDateTime) -> String {
    datetime
        .format(format_description!("[hour]:[minute]"))
        .unwrap_or_else(|_| "--:--".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn unix_millis_of_known_instant() {
        assert_eq!(unix_millis(datetime!(1970-01-01 0:00:01.5 UTC)), 1_500);
        assert_eq!(unix_millis(datetime!(1969-12-31 23:59:59 UTC)), 0);
    }

    #[test]
    fn clock_label_is_hours_and_minutes() {
        assert_eq!(clock_label(datetime!(2024-05-01 09:07:59 UTC)), "09:07");
    }
}
