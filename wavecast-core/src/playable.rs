use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{error::Error, scheme::SchemeRegistry};

/// Percentage of a file past which playback counts as complete.  Some
/// backends fail to report a terminal completion callback when the play
/// head is scrubbed to the very end, so ticks past this point are folded
/// into completion.
pub(crate) const EOF_THRESHOLD: f64 = 0.99995;

const DEFAULT_BUFFER_TIME: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    OnDemand,
    Live,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Discriminates regular content from sponsor messages inserted before it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Variant {
    Standard,
    Underwriting {
        click_url: Option<String>,
        has_played: bool,
    },
}

/// A timestamped chapter within an on-demand playable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Segment {
    pub start_time: Duration,
    pub title: String,
    pub css_class: String,
    pub active: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SegmentAttrs {
    pub start_time_ms: u64,
    pub title: String,
    pub css_class: String,
}

/// Caller-supplied attribute bundle for constructing a [`Playable`].  Only
/// the identifier is mandatory; the kind may come from a registered scheme.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PlayableAttrs {
    pub identifier: String,
    pub kind: Option<MediaKind>,

    pub stream_server: Option<String>,
    pub stream_path: Option<String>,
    pub progressive_url: Option<String>,
    pub buffer_time: Option<f64>,
    pub downloadable: Option<bool>,

    pub title: Option<String>,
    pub description: Option<String>,
    pub detail: Option<String>,
    pub date: Option<String>,
    pub program: Option<String>,
    pub host: Option<String>,
    pub url: Option<String>,
    pub image_sm: Option<String>,
    pub image_lg: Option<String>,

    pub start_time_ms: Option<u64>,
    pub end_time_ms: Option<u64>,
    pub segments: Vec<SegmentAttrs>,
}

/// One streamable audio resource: its source locations, metadata and live
/// playback telemetry.  Telemetry fields are mutated continuously while the
/// item is active and reset when it is unloaded.
#[derive(Clone, Debug)]
pub struct Playable {
    pub identifier: String,
    pub kind: MediaKind,
    pub variant: Variant,

    // Source locations.  Zero or more may be set; which one is used
    // depends on the active playback mechanism.
    pub stream_server: String,
    pub stream_path: String,
    pub progressive_url: String,
    pub buffer_time: Duration,
    pub downloadable: bool,

    // Metadata.
    pub title: String,
    pub description: String,
    pub detail: String,
    pub date: String,
    pub program: String,
    pub host: String,
    pub url: String,
    pub image_sm: String,
    pub image_lg: String,
    pub ad_context: Option<String>,

    // Telemetry.
    pub duration: Duration,
    pub position: Duration,
    pub percent_played: f64,
    pub percent_loaded: f64,

    // Clip bounds, for playing a window out of a longer file.
    pub start_time: Option<Duration>,
    pub end_time: Option<Duration>,
    pub segments: Vec<Segment>,

    /// Mirror of the global playback state, provided as a courtesy to
    /// passive listeners such as the analytics tracker.
    pub state: PlaybackState,
}

impl Playable {
    /// Builds a standard playable.  Attributes resolved from a registered
    /// identifier scheme override anything supplied by the caller; centrally
    /// managed stream endpoints are not overridable.
    pub fn new(attrs: PlayableAttrs, schemes: &SchemeRegistry) -> Result<Playable, Error> {
        Self::with_variant(attrs, schemes, Variant::Standard)
    }

    /// Builds a sponsor-message playable meant to play before regular
    /// content.
    pub fn underwriting(
        attrs: PlayableAttrs,
        schemes: &SchemeRegistry,
        click_url: Option<String>,
    ) -> Result<Playable, Error> {
        Self::with_variant(
            attrs,
            schemes,
            Variant::Underwriting {
                click_url,
                has_played: false,
            },
        )
    }

    fn with_variant(
        attrs: PlayableAttrs,
        schemes: &SchemeRegistry,
        variant: Variant,
    ) -> Result<Playable, Error> {
        if attrs.identifier.is_empty() {
            return Err(Error::InvalidPlayable("missing identifier".into()));
        }

        let mut kind = attrs.kind;
        let mut stream_server = attrs.stream_server.unwrap_or_default();
        let mut stream_path = attrs.stream_path.unwrap_or_default();
        let mut progressive_url = attrs.progressive_url.unwrap_or_default();
        let mut buffer_time = attrs
            .buffer_time
            .map(Duration::from_secs_f64)
            .unwrap_or(DEFAULT_BUFFER_TIME);

        if let Some(resolved) = schemes.resolve(&attrs.identifier) {
            // Scheme values trump whatever the caller passed in.
            if let Some(k) = resolved.kind {
                kind = Some(k);
            }
            if let Some(server) = resolved.stream_server {
                stream_server = server;
            }
            if let Some(path) = resolved.stream_path {
                stream_path = path;
            }
            if let Some(url) = resolved.progressive_url {
                progressive_url = url;
            }
            if let Some(secs) = resolved.buffer_time {
                buffer_time = Duration::from_secs_f64(secs);
            }
        }

        let kind = kind.ok_or_else(|| {
            Error::InvalidPlayable(format!(
                "'{}' has no media kind and matches no registered scheme",
                attrs.identifier
            ))
        })?;

        let start_time = attrs.start_time_ms.map(Duration::from_millis);
        Ok(Playable {
            identifier: attrs.identifier,
            kind,
            variant,
            stream_server,
            stream_path,
            progressive_url,
            buffer_time,
            downloadable: attrs.downloadable.unwrap_or(true),
            title: attrs.title.unwrap_or_default(),
            description: attrs.description.unwrap_or_default(),
            detail: attrs.detail.unwrap_or_default(),
            date: attrs.date.unwrap_or_default(),
            program: attrs.program.unwrap_or_default(),
            host: attrs.host.unwrap_or_default(),
            url: attrs.url.unwrap_or_default(),
            image_sm: attrs.image_sm.unwrap_or_default(),
            image_lg: attrs.image_lg.unwrap_or_default(),
            ad_context: None,
            duration: Duration::ZERO,
            position: start_time.unwrap_or_default(),
            percent_played: 0.0,
            percent_loaded: 0.0,
            start_time,
            end_time: attrs.end_time_ms.map(Duration::from_millis),
            segments: attrs
                .segments
                .into_iter()
                .map(|s| Segment {
                    start_time: Duration::from_millis(s.start_time_ms),
                    title: s.title,
                    css_class: s.css_class,
                    active: false,
                })
                .collect(),
            state: PlaybackState::Stopped,
        })
    }

    pub fn is_underwriting(&self) -> bool {
        matches!(self.variant, Variant::Underwriting { .. })
    }

    pub fn is_eof(&self) -> bool {
        self.percent_played > EOF_THRESHOLD
    }

    /// Whether a session-streaming source is available.  Used to
    /// allow/disallow seeking before the item loads.
    pub fn is_stream_capable(&self) -> bool {
        !self.stream_server.is_empty() && !self.stream_path.is_empty()
    }

    /// Drops the session-streaming source so that only the progressive
    /// mechanism remains possible for this item.
    pub fn clear_stream_source(&mut self) {
        self.stream_server.clear();
        self.stream_path.clear();
    }

    /// Resets telemetry back to the unloaded baseline.
    pub fn reset(&mut self) {
        self.position = self.start_time.unwrap_or_default();
        self.percent_played = 0.0;
        self.percent_loaded = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_identifier() {
        let schemes = SchemeRegistry::new();
        assert!(Playable::new(PlayableAttrs::default(), &schemes).is_err());
    }

    #[test]
    fn rejects_unresolvable_kind() {
        let schemes = SchemeRegistry::new();
        let attrs = PlayableAttrs {
            identifier: "mystery:/thing".into(),
            ..Default::default()
        };
        assert!(Playable::new(attrs, &schemes).is_err());
    }

    #[test]
    fn reset_restores_start_time() {
        let schemes = SchemeRegistry::new();
        let attrs = PlayableAttrs {
            identifier: "clip".into(),
            kind: Some(MediaKind::OnDemand),
            start_time_ms: Some(5_000),
            ..Default::default()
        };
        let mut playable = Playable::new(attrs, &schemes).unwrap();
        playable.position = Duration::from_secs(42);
        playable.percent_played = 0.7;
        playable.percent_loaded = 1.0;
        playable.reset();
        assert_eq!(playable.position, Duration::from_secs(5));
        assert_eq!(playable.percent_played, 0.0);
        assert_eq!(playable.percent_loaded, 0.0);
    }

    #[test]
    fn eof_threshold() {
        let schemes = SchemeRegistry::new();
        let attrs = PlayableAttrs {
            identifier: "clip".into(),
            kind: Some(MediaKind::OnDemand),
            ..Default::default()
        };
        let mut playable = Playable::new(attrs, &schemes).unwrap();
        playable.percent_played = 0.9999;
        assert!(!playable.is_eof());
        playable.percent_played = 0.99996;
        assert!(playable.is_eof());
    }

    #[test]
    fn underwriting_is_discriminated() {
        let schemes = SchemeRegistry::new();
        let attrs = PlayableAttrs {
            identifier: "sponsor".into(),
            kind: Some(MediaKind::OnDemand),
            ..Default::default()
        };
        let playable = Playable::underwriting(attrs, &schemes, None).unwrap();
        assert!(playable.is_underwriting());
    }
}
