use std::collections::HashMap;

use serde::Deserialize;
use url::Url;

use crate::{
    error::Error,
    event::{Event, EventKind},
};

/// Rewrites a stream source URL before the backend connects, typically to
/// attach a listener session for server-side ad insertion.
pub trait StreamDecorator {
    fn decorate(&self, url: &str) -> Result<String, Error>;
}

/// Applies a decorator when one is present, passing the URL through
/// untouched when decoration fails or no decorator is configured.
pub fn decorate_stream(decorator: Option<&dyn StreamDecorator>, url: &str) -> String {
    match decorator {
        Some(d) => match d.decorate(url) {
            Ok(decorated) => decorated,
            Err(err) => {
                log::warn!("stream decoration failed, using plain URL: {err}");
                url.to_owned()
            }
        },
        None => url.to_owned(),
    }
}

/// Pixel dimensions of a companion display zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct ZoneConfig {
    pub width: u32,
    pub height: u32,
}

/// Receives render instructions for companion zones.  `render` shows the
/// delivery frame for an active ad; `fallback` restores the zone's default
/// content.
pub trait ZoneRenderer {
    fn render(&mut self, zone: &str, config: ZoneConfig, frame_url: &Url);
    fn fallback(&mut self, zone: &str, config: ZoneConfig);
}

#[derive(Clone, Debug, Deserialize)]
struct SponsorConfig {
    delivery_url: Url,
    #[serde(default)]
    zones: HashMap<String, ZoneConfig>,
    /// Stream title that marks an ad break, mapped to the delivery zone id
    /// for each display zone.
    #[serde(default)]
    triggers: HashMap<String, HashMap<String, u32>>,
}

/// Companion ad overlay.  Watches stream metadata; when the title matches a
/// registered trigger, display zones are pointed at the ad delivery server,
/// otherwise they fall back to their defaults.
pub struct SponsorOverlay {
    delivery_url: Url,
    zones: HashMap<String, ZoneConfig>,
    triggers: HashMap<String, HashMap<String, u32>>,
}

impl SponsorOverlay {
    pub fn new(delivery_url: Url) -> Self {
        Self {
            delivery_url,
            zones: HashMap::new(),
            triggers: HashMap::new(),
        }
    }

    pub fn with_delivery(delivery_url: &str) -> Result<Self, Error> {
        Ok(Self::new(Url::parse(delivery_url)?))
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: SponsorConfig = serde_json::from_str(json)?;
        Ok(Self {
            delivery_url: config.delivery_url,
            zones: config.zones,
            triggers: config.triggers,
        })
    }

    pub fn register_zone(&mut self, name: impl Into<String>, config: ZoneConfig) {
        self.zones.insert(name.into(), config);
    }

    pub fn register_trigger(
        &mut self,
        title: impl Into<String>,
        zone_ids: HashMap<String, u32>,
    ) {
        self.triggers.insert(title.into(), zone_ids);
    }

    /// Metadata intake.  Non-metadata events are ignored.
    pub fn handle(&mut self, event: &Event, renderer: &mut dyn ZoneRenderer) {
        if event.kind != EventKind::Metadata {
            return;
        }
        let Some(playable) = event.playable() else {
            return;
        };
        let trigger = self.triggers.get(&playable.title);
        if trigger.is_some() {
            log::info!("stream title '{}' triggered companion ads", playable.title);
        }
        for (zone, config) in &self.zones {
            match trigger.and_then(|ids| ids.get(zone)) {
                Some(&zone_id) => {
                    let frame = frame_url(
                        &self.delivery_url,
                        zone_id,
                        playable.ad_context.as_deref(),
                    );
                    renderer.render(zone, *config, &frame);
                }
                None => renderer.fallback(zone, *config),
            }
        }
    }
}

/// Builds the delivery frame URL for one zone.  A random cache buster keeps
/// intermediaries from replaying a stale creative.
fn frame_url(delivery_url: &Url, zone_id: u32, context: Option<&str>) -> Url {
    let mut url = delivery_url.clone();
    url.query_pairs_mut()
        .append_pair("zoneid", &zone_id.to_string())
        .append_pair("context", context.unwrap_or(""))
        .append_pair("cb", &rand::random::<u32>().to_string());
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        event::EventData,
        playable::{MediaKind, Playable, PlayableAttrs},
        scheme::SchemeRegistry,
    };

    #[derive(Default)]
    struct RecordingRenderer {
        rendered: Vec<(String, Url)>,
        fallbacks: Vec<String>,
    }

    impl ZoneRenderer for RecordingRenderer {
        fn render(&mut self, zone: &str, _config: ZoneConfig, frame_url: &Url) {
            self.rendered.push((zone.to_owned(), frame_url.clone()));
        }

        fn fallback(&mut self, zone: &str, _config: ZoneConfig) {
            self.fallbacks.push(zone.to_owned());
        }
    }

    fn overlay() -> SponsorOverlay {
        SponsorOverlay::from_json(
            r#"{
                "delivery_url": "https://ads.example.com/afr.php",
                "zones": {
                    "banner": { "width": 728, "height": 90 },
                    "box": { "width": 300, "height": 250 }
                },
                "triggers": {
                    "ad_break_midroll": { "banner": 42 }
                }
            }"#,
        )
        .unwrap()
    }

    fn metadata_event(title: &str, context: Option<&str>) -> Event {
        let mut playable = Playable::new(
            PlayableAttrs {
                identifier: "station".into(),
                kind: Some(MediaKind::Live),
                ..Default::default()
            },
            &SchemeRegistry::new(),
        )
        .unwrap();
        playable.title = title.into();
        playable.ad_context = context.map(str::to_owned);
        Event {
            kind: EventKind::Metadata,
            data: EventData::Playable(playable),
        }
    }

    #[test]
    fn trigger_renders_matched_zone_and_falls_back_rest() {
        let mut overlay = overlay();
        let mut renderer = RecordingRenderer::default();
        overlay.handle(&metadata_event("ad_break_midroll", Some("ctx123")), &mut renderer);
        assert_eq!(renderer.rendered.len(), 1);
        assert_eq!(renderer.fallbacks, vec!["box".to_owned()]);
        let (zone, frame) = &renderer.rendered[0];
        assert_eq!(zone, "banner");
        let pairs: std::collections::HashMap<_, _> = frame.query_pairs().collect();
        assert_eq!(pairs.get("zoneid").map(AsRef::as_ref), Some("42"));
        assert_eq!(pairs.get("context").map(AsRef::as_ref), Some("ctx123"));
        assert!(pairs.contains_key("cb"));
    }

    #[test]
    fn ordinary_title_falls_back_everywhere() {
        let mut overlay = overlay();
        let mut renderer = RecordingRenderer::default();
        overlay.handle(&metadata_event("Morning News Hour", None), &mut renderer);
        assert!(renderer.rendered.is_empty());
        assert_eq!(renderer.fallbacks.len(), 2);
    }

    #[test]
    fn non_metadata_events_are_ignored() {
        let mut overlay = overlay();
        let mut renderer = RecordingRenderer::default();
        let mut event = metadata_event("ad_break_midroll", None);
        event.kind = EventKind::Playing;
        overlay.handle(&event, &mut renderer);
        assert!(renderer.rendered.is_empty());
        assert!(renderer.fallbacks.is_empty());
    }

    #[test]
    fn decoration_failure_passes_url_through() {
        struct Failing;
        impl StreamDecorator for Failing {
            fn decorate(&self, _url: &str) -> Result<String, Error> {
                Err(Error::InvalidPlayable("no session".into()))
            }
        }
        let url = "https://stream.example.com/live";
        assert_eq!(decorate_stream(Some(&Failing), url), url);
        assert_eq!(decorate_stream(None, url), url);
    }

    #[test]
    fn decorator_rewrites_url() {
        struct Session;
        impl StreamDecorator for Session {
            fn decorate(&self, url: &str) -> Result<String, Error> {
                Ok(format!("{url}?lsid=abc"))
            }
        }
        let decorated = decorate_stream(Some(&Session), "https://stream.example.com/live");
        assert!(decorated.ends_with("?lsid=abc"));
    }
}
