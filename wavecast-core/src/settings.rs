use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::mechanism::Mechanism;

/// Autoplay behavior requested by the hosting application.  `Deferred`
/// means "start playback once metadata has been fetched".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Autoplay {
    #[default]
    Off,
    On,
    Deferred,
}

// Accepts both the boolean form and the "deferred" string form.
impl Serialize for Autoplay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Off => serializer.serialize_bool(false),
            Self::On => serializer.serialize_bool(true),
            Self::Deferred => serializer.serialize_str("deferred"),
        }
    }
}

impl<'de> Deserialize<'de> for Autoplay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Mode(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Flag(true) => Ok(Autoplay::On),
            Raw::Flag(false) => Ok(Autoplay::Off),
            Raw::Mode(mode) if mode == "deferred" => Ok(Autoplay::Deferred),
            Raw::Mode(mode) => Err(de::Error::custom(format!("invalid autoplay mode '{mode}'"))),
        }
    }
}

/// Caller-supplied settings bundle.  Unrecognized options are ignored by
/// serde defaults; everything has a sensible baseline.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Initial gain, 0.0 to 1.0.
    pub volume: f64,
    pub muted: bool,
    pub autoplay: Autoplay,
    /// Whether the host should fetch metadata before starting playback.
    pub fetch_metadata_first: bool,
    /// Moves the given mechanism to the front of the candidate list.
    pub preferred_mechanism: Option<Mechanism>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            volume: 0.9,
            muted: false,
            autoplay: Autoplay::Off,
            fetch_metadata_first: false,
            preferred_mechanism: None,
        }
    }
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self, crate::error::Error> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert_eq!(settings.volume, 0.9);
        assert!(!settings.muted);
        assert_eq!(settings.autoplay, Autoplay::Off);
    }

    #[test]
    fn autoplay_accepts_bool_and_deferred() {
        let on: Settings = serde_json::from_str(r#"{ "autoplay": true }"#).unwrap();
        assert_eq!(on.autoplay, Autoplay::On);
        let off: Settings = serde_json::from_str(r#"{ "autoplay": false }"#).unwrap();
        assert_eq!(off.autoplay, Autoplay::Off);
        let deferred: Settings = serde_json::from_str(r#"{ "autoplay": "deferred" }"#).unwrap();
        assert_eq!(deferred.autoplay, Autoplay::Deferred);
    }

    #[test]
    fn autoplay_rejects_unknown_mode() {
        assert!(serde_json::from_str::<Settings>(r#"{ "autoplay": "sometimes" }"#).is_err());
    }

    #[test]
    fn preferred_mechanism_parses() {
        let settings: Settings =
            serde_json::from_str(r#"{ "preferred_mechanism": "progressive" }"#).unwrap();
        assert_eq!(settings.preferred_mechanism, Some(Mechanism::Progressive));
    }
}
