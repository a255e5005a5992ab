//! Timestamp utilities

use chrono::{DateTime, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Build a UTC timestamp from epoch seconds plus nanoseconds
///
/// Returns `None` when the parts are out of chrono's representable range.
pub fn from_epoch_parts(seconds: i64, nanoseconds: u32) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, nanoseconds)
}

/// Serde adapter for backend timestamps
///
/// The backend stores timestamps as `{ "_seconds": i64, "_nanoseconds": u32 }`
/// objects. Older endpoints return RFC 3339 strings instead, so both shapes
/// are accepted on input. Output always uses the object shape.
pub mod wire_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct EpochParts {
        #[serde(rename = "_seconds")]
        seconds: i64,
        #[serde(rename = "_nanoseconds", default)]
        nanoseconds: u32,
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum WireTimestamp {
        Parts(EpochParts),
        Text(String),
    }

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        EpochParts {
            seconds: value.timestamp(),
            nanoseconds: value.timestamp_subsec_nanos(),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match WireTimestamp::deserialize(deserializer)? {
            WireTimestamp::Parts(parts) => super::from_epoch_parts(parts.seconds, parts.nanoseconds)
                .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {}s", parts.seconds))),
            WireTimestamp::Text(text) => DateTime::parse_from_rfc3339(&text)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(de::Error::custom),
        }
    }
}
