use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// A playback backend technology.  `Stream` talks to a stateful streaming
/// server session; `Progressive` plays a plain HTTP resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mechanism {
    Stream,
    Progressive,
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream => write!(f, "stream"),
            Self::Progressive => write!(f, "progressive"),
        }
    }
}

impl FromStr for Mechanism {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stream" => Ok(Self::Stream),
            "progressive" => Ok(Self::Progressive),
            other => Err(format!("unknown playback mechanism '{other}'")),
        }
    }
}

/// Ordered candidate list of playback mechanisms.  The head is always the
/// active one; removal is one-directional and a removed mechanism is never
/// re-added.  Once the list runs dry, playback is permanently unavailable
/// for the session.
#[derive(Clone, Debug)]
pub struct MechanismSelector {
    solutions: Vec<Mechanism>,
}

impl Default for MechanismSelector {
    fn default() -> Self {
        Self {
            solutions: vec![Mechanism::Stream, Mechanism::Progressive],
        }
    }
}

impl MechanismSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Mechanism> {
        self.solutions.first().copied()
    }

    /// Pops the active mechanism after a hard failure, enabling fallback to
    /// the next candidate.  Returns false when nothing remains to remove.
    pub fn remove_current(&mut self) -> bool {
        if self.solutions.is_empty() {
            log::error!("no playback solutions remain to remove");
            return false;
        }
        let removed = self.solutions.remove(0);
        log::info!("removed playback mechanism {removed}");
        true
    }

    /// Replaces the candidate list wholesale.
    pub fn set_solutions(&mut self, solutions: Vec<Mechanism>) {
        self.solutions = solutions;
    }

    /// Moves the given mechanism to the front of the candidate list, if
    /// present.
    pub fn prefer(&mut self, mechanism: Mechanism) {
        if let Some(index) = self.solutions.iter().position(|&m| m == mechanism) {
            let preferred = self.solutions.remove(index);
            self.solutions.insert(0, preferred);
        } else {
            log::warn!("preferred mechanism {mechanism} is not a candidate");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_is_active() {
        let selector = MechanismSelector::new();
        assert_eq!(selector.current(), Some(Mechanism::Stream));
    }

    #[test]
    fn removal_exhausts_to_none() {
        let mut selector = MechanismSelector::new();
        assert!(selector.remove_current());
        assert_eq!(selector.current(), Some(Mechanism::Progressive));
        assert!(selector.remove_current());
        assert_eq!(selector.current(), None);
        assert!(!selector.remove_current());
        assert_eq!(selector.current(), None);
    }

    #[test]
    fn set_solutions_replaces_wholesale() {
        let mut selector = MechanismSelector::new();
        selector.set_solutions(vec![Mechanism::Progressive]);
        assert_eq!(selector.current(), Some(Mechanism::Progressive));
        selector.set_solutions(Vec::new());
        assert_eq!(selector.current(), None);
    }

    #[test]
    fn prefer_moves_to_front() {
        let mut selector = MechanismSelector::new();
        selector.prefer(Mechanism::Progressive);
        assert_eq!(selector.current(), Some(Mechanism::Progressive));
    }

    #[test]
    fn parses_from_config_strings() {
        assert_eq!("stream".parse(), Ok(Mechanism::Stream));
        assert_eq!("progressive".parse(), Ok(Mechanism::Progressive));
        assert!("quicktime".parse::<Mechanism>().is_err());
    }
}
