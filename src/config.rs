use log::warn;
use std::path::PathBuf;
use uuid::Uuid;

use crate::errors::{MeetingError, MeetingResult};
use crate::media::CaptureConstraints;
use crate::transport::{relay_supported, TransportKind};

const DEFAULT_ROOM: &str = "meet-sandbox";
const DEFAULT_DISPLAY_NAME: &str = "Guest";

/// Settings handed to relay-backed transports. The mock transport ignores them.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub relay_url: String,
    pub token_endpoint: String,
    pub room: String,
    pub participant_id: String,
    pub display_name: String,
    pub auto_enable_audio: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            relay_url: String::new(),
            token_endpoint: String::new(),
            room: DEFAULT_ROOM.to_string(),
            participant_id: Uuid::new_v4().to_string(),
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
            auto_enable_audio: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub transport_kind: TransportKind,
    pub relay: RelayConfig,
    pub capture: CaptureConstraints,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            transport_kind: TransportKind::Mock,
            relay: RelayConfig::default(),
            capture: CaptureConstraints::default(),
            log_file: None,
        }
    }
}

impl Config {
    pub fn from_env_variables() -> MeetingResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> MeetingResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Config::default();

        let relay = RelayConfig {
            relay_url: get("LIVEKIT_ENDPOINT").unwrap_or_default(),
            token_endpoint: get("LIVEKIT_TOKEN_ENDPOINT").unwrap_or_default(),
            room: get("MEET_ROOM")
                .map(|room| room.trim().to_string())
                .unwrap_or(defaults.relay.room),
            participant_id: get("MEET_PARTICIPANT_ID").unwrap_or(defaults.relay.participant_id),
            display_name: get("MEET_DISPLAY_NAME").unwrap_or(defaults.relay.display_name),
            auto_enable_audio: match get("MEET_AUTO_ENABLE_AUDIO") {
                Some(value) => parse_bool("MEET_AUTO_ENABLE_AUDIO", &value)?,
                None => defaults.relay.auto_enable_audio,
            },
        };

        let capture = CaptureConstraints {
            audio: match get("MEET_CAPTURE_AUDIO") {
                Some(value) => parse_bool("MEET_CAPTURE_AUDIO", &value)?,
                None => defaults.capture.audio,
            },
            video: match get("MEET_CAPTURE_VIDEO") {
                Some(value) => parse_bool("MEET_CAPTURE_VIDEO", &value)?,
                None => defaults.capture.video,
            },
        };

        let requested = match get("MEET_TRANSPORT") {
            Some(value) => value.parse::<TransportKind>()?,
            None => defaults.transport_kind,
        };

        Ok(Config {
            transport_kind: resolve_transport_kind(requested, &relay),
            relay,
            capture,
            log_file: get("MEET_SANDBOX_LOG_FILE").map(PathBuf::from),
        })
    }
}

fn resolve_transport_kind(requested: TransportKind, relay: &RelayConfig) -> TransportKind {
    if requested != TransportKind::Relay {
        return requested;
    }

    if !relay_supported() {
        warn!("Built without livekit-relay support; falling back to mock transport.");
        return TransportKind::Mock;
    }

    if relay.relay_url.is_empty() || relay.token_endpoint.is_empty() {
        warn!("Missing relay endpoint or token endpoint; falling back to mock transport.");
        return TransportKind::Mock;
    }

    requested
}

fn parse_bool(key: &str, value: &str) -> MeetingResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(MeetingError::Config(format!(
            "{} must be a boolean, got \"{}\"",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> MeetingResult<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.transport_kind, TransportKind::Mock);
        assert_eq!(config.relay.room, "meet-sandbox");
        assert_eq!(config.relay.display_name, "Guest");
        assert!(config.relay.auto_enable_audio);
        assert!(Uuid::parse_str(&config.relay.participant_id).is_ok());
        assert!(config.capture.audio && config.capture.video);
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("MEET_ROOM", "  standup "),
            ("MEET_PARTICIPANT_ID", "alice-1"),
            ("MEET_DISPLAY_NAME", "Alice"),
            ("MEET_AUTO_ENABLE_AUDIO", "off"),
            ("MEET_CAPTURE_VIDEO", "0"),
            ("MEET_SANDBOX_LOG_FILE", "/tmp/meet.log"),
        ])
        .unwrap();

        assert_eq!(config.relay.room, "standup");
        assert_eq!(config.relay.participant_id, "alice-1");
        assert_eq!(config.relay.display_name, "Alice");
        assert!(!config.relay.auto_enable_audio);
        assert!(config.capture.audio);
        assert!(!config.capture.video);
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/meet.log")));
    }

    #[test]
    fn test_empty_values_count_as_unset() {
        let config = config_from(&[("MEET_DISPLAY_NAME", ""), ("MEET_TRANSPORT", " ")]).unwrap();
        assert_eq!(config.relay.display_name, "Guest");
        assert_eq!(config.transport_kind, TransportKind::Mock);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        assert!(matches!(
            config_from(&[("MEET_AUTO_ENABLE_AUDIO", "maybe")]),
            Err(MeetingError::Config(_))
        ));
        assert!(matches!(
            config_from(&[("MEET_TRANSPORT", "smoke-signals")]),
            Err(MeetingError::Config(_))
        ));
    }

    #[test]
    fn test_relay_without_endpoint_falls_back_to_mock() {
        let config = config_from(&[("MEET_TRANSPORT", "livekit")]).unwrap();
        assert_eq!(config.transport_kind, TransportKind::Mock);
    }

    #[test]
    fn test_relay_with_endpoints() {
        let config = config_from(&[
            ("MEET_TRANSPORT", "livekit"),
            ("LIVEKIT_ENDPOINT", "wss://relay.example"),
            ("LIVEKIT_TOKEN_ENDPOINT", "https://relay.example/token"),
        ])
        .unwrap();

        let expected = if relay_supported() {
            TransportKind::Relay
        } else {
            TransportKind::Mock
        };
        assert_eq!(config.transport_kind, expected);
        assert_eq!(config.relay.relay_url, "wss://relay.example");
    }
}
