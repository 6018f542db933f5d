//! Serde helpers for configuration types

/// Serialize a `Duration` as whole seconds
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Config {
///     #[serde(with = "xrd_core::config::serde_utils::duration_secs")]
///     connect_timeout: Duration,
/// }
/// ```
pub mod duration_secs {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Timeouts {
        #[serde(with = "duration_secs")]
        connect: Duration,
    }

    #[test]
    fn test_duration_as_seconds_in_json() {
        let t = Timeouts {
            connect: Duration::from_millis(30_900),
        };
        assert_eq!(serde_json::to_string(&t).unwrap(), r#"{"connect":30}"#);
    }

    #[test]
    fn test_duration_from_toml() {
        let t: Timeouts = toml::from_str("connect = 12").unwrap();
        assert_eq!(t.connect, Duration::from_secs(12));
    }

    #[test]
    fn test_negative_duration_rejected() {
        assert!(toml::from_str::<Timeouts>("connect = -1").is_err());
    }
}
