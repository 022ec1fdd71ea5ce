use std::collections::HashMap;

use serde::Deserialize;

use crate::{error::Error, playable::MediaKind};

/// Attribute bundle attached to a registered identifier scheme.  Prefix
/// fields are expanded with the identifier path at resolution time; plain
/// fields are taken verbatim.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SchemeAttrs {
    pub kind: Option<MediaKind>,
    pub stream_server: Option<String>,
    pub stream_path: Option<String>,
    pub stream_path_prefix: Option<String>,
    pub progressive_url: Option<String>,
    pub progressive_prefix: Option<String>,
    pub buffer_time: Option<f64>,
}

impl SchemeAttrs {
    /// Per-field merge, with `over` taking precedence.
    fn merged(&self, over: &SchemeAttrs) -> SchemeAttrs {
        SchemeAttrs {
            kind: over.kind.or(self.kind),
            stream_server: over.stream_server.clone().or_else(|| self.stream_server.clone()),
            stream_path: over.stream_path.clone().or_else(|| self.stream_path.clone()),
            stream_path_prefix: over
                .stream_path_prefix
                .clone()
                .or_else(|| self.stream_path_prefix.clone()),
            progressive_url: over
                .progressive_url
                .clone()
                .or_else(|| self.progressive_url.clone()),
            progressive_prefix: over
                .progressive_prefix
                .clone()
                .or_else(|| self.progressive_prefix.clone()),
            buffer_time: over.buffer_time.or(self.buffer_time),
        }
    }
}

/// One scheme: defaults for every identifier under it, plus one level of
/// path-keyed overrides (e.g. a live-stream slug).
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SchemeEntry {
    #[serde(flatten)]
    pub defaults: SchemeAttrs,
    #[serde(default)]
    pub aliases: HashMap<String, SchemeAttrs>,
}

/// Fully expanded attributes for one identifier.
#[derive(Clone, Debug, Default)]
pub struct ResolvedScheme {
    pub kind: Option<MediaKind>,
    pub stream_server: Option<String>,
    pub stream_path: Option<String>,
    pub progressive_url: Option<String>,
    pub buffer_time: Option<f64>,
}

/// Table of `scheme:/path` shortcuts for commonly played items.  Anything a
/// scheme resolves always overrides caller-supplied values for that item,
/// so centrally managed stream endpoints cannot be clobbered.
#[derive(Debug, Default)]
pub struct SchemeRegistry {
    schemes: HashMap<String, SchemeEntry>,
}

impl SchemeRegistry {
    pub fn new() -> Self {
        Self {
            schemes: HashMap::new(),
        }
    }

    /// Loads a scheme table from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let schemes: HashMap<String, SchemeEntry> = serde_json::from_str(json)?;
        Ok(Self { schemes })
    }

    pub fn register(&mut self, scheme: impl Into<String>, entry: SchemeEntry) {
        self.schemes.insert(scheme.into(), entry);
    }

    pub fn has_schemes(&self) -> bool {
        !self.schemes.is_empty()
    }

    pub fn is_scheme(&self, identifier: &str, scheme: &str) -> bool {
        matches!(self.parse(identifier), Some((s, _)) if s == scheme)
    }

    /// Splits `scheme:/path` when the scheme is registered and the path is
    /// well formed.  Unregistered schemes do not parse.
    pub fn parse<'a>(&self, identifier: &'a str) -> Option<(&'a str, &'a str)> {
        let (scheme, path) = identifier.split_once(":/")?;
        if !self.schemes.contains_key(scheme) {
            return None;
        }
        if path.is_empty()
            || !path
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '/' | '.' | '-' | '_'))
        {
            return None;
        }
        Some((scheme, path))
    }

    /// Expands an identifier against the table.  Returns `None` for
    /// unregistered schemes, letting the identifier pass through unresolved.
    pub fn resolve(&self, identifier: &str) -> Option<ResolvedScheme> {
        let (scheme, path) = self.parse(identifier)?;
        let entry = &self.schemes[scheme];
        let attrs = match entry.aliases.get(path) {
            Some(alias) => entry.defaults.merged(alias),
            None => entry.defaults.clone(),
        };

        let stream_path = attrs
            .stream_path
            .or_else(|| attrs.stream_path_prefix.map(|p| format!("{p}/{path}")));
        let progressive_url = attrs
            .progressive_url
            .or_else(|| attrs.progressive_prefix.map(|p| format!("{p}/{path}")));

        Some(ResolvedScheme {
            kind: attrs.kind,
            stream_server: attrs.stream_server,
            stream_path,
            progressive_url,
            buffer_time: attrs.buffer_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMES: &str = r#"{
        "radio-audio": {
            "stream_server": "rtmp://ondemand.stream.example.org/music",
            "stream_path_prefix": "mp3:ondemand",
            "progressive_prefix": "http://ondemand.stream.example.org",
            "buffer_time": 3.0,
            "kind": "on_demand"
        },
        "radio-live": {
            "kind": "live",
            "buffer_time": 6.0,
            "aliases": {
                "news": {
                    "stream_server": "rtmp://live.stream.example.org/news",
                    "stream_path": "news.stream",
                    "progressive_url": "http://news.stream.example.org/news.mp3"
                }
            }
        }
    }"#;

    fn registry() -> SchemeRegistry {
        SchemeRegistry::from_json(SCHEMES).unwrap()
    }

    #[test]
    fn expands_prefixes_for_on_demand_paths() {
        let resolved = registry()
            .resolve("radio-audio:/shows/2012/04/18/morning_report.mp3")
            .unwrap();
        assert_eq!(resolved.kind, Some(MediaKind::OnDemand));
        assert_eq!(
            resolved.stream_path.as_deref(),
            Some("mp3:ondemand/shows/2012/04/18/morning_report.mp3")
        );
        assert_eq!(
            resolved.progressive_url.as_deref(),
            Some("http://ondemand.stream.example.org/shows/2012/04/18/morning_report.mp3")
        );
        assert_eq!(resolved.buffer_time, Some(3.0));
    }

    #[test]
    fn alias_overrides_defaults() {
        let resolved = registry().resolve("radio-live:/news").unwrap();
        assert_eq!(resolved.kind, Some(MediaKind::Live));
        assert_eq!(
            resolved.stream_server.as_deref(),
            Some("rtmp://live.stream.example.org/news")
        );
        assert_eq!(resolved.stream_path.as_deref(), Some("news.stream"));
        assert_eq!(resolved.buffer_time, Some(6.0));
    }

    #[test]
    fn unregistered_scheme_passes_through() {
        assert!(registry().resolve("podcast:/whatever.mp3").is_none());
    }

    #[test]
    fn rejects_malformed_paths() {
        let reg = registry();
        assert!(reg.parse("radio-audio:/").is_none());
        assert!(reg.parse("radio-audio:/bad path!").is_none());
        assert!(reg.parse("radio-audio").is_none());
    }

    #[test]
    fn is_scheme_matches() {
        let reg = registry();
        assert!(reg.is_scheme("radio-live:/news", "radio-live"));
        assert!(!reg.is_scheme("radio-live:/news", "radio-audio"));
    }
}
