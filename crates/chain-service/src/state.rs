use serde::{Deserialize, Serialize};

/// Data-source health, tracked per instrument class (auth) and per ticker
/// (synthetic fallback).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceState {
    #[default]
    Unknown,
    Healthy,
    /// A provider rejected our credentials; real providers are skipped
    AuthFailed,
    /// Served from the synthetic generator; real providers are skipped
    SyntheticOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEvent {
    FetchSucceeded,
    AuthRejected,
    FellBackToSynthetic,
    ForcedRefresh,
}

impl SourceState {
    pub fn on(self, event: SourceEvent) -> SourceState {
        match (self, event) {
            (_, SourceEvent::ForcedRefresh) => SourceState::Unknown,
            (_, SourceEvent::FetchSucceeded) => SourceState::Healthy,
            (_, SourceEvent::AuthRejected) => SourceState::AuthFailed,
            (SourceState::AuthFailed, SourceEvent::FellBackToSynthetic) => SourceState::AuthFailed,
            (_, SourceEvent::FellBackToSynthetic) => SourceState::SyntheticOnly,
        }
    }

    /// Whether real providers should be bypassed in this state.
    pub fn skips_providers(&self) -> bool {
        matches!(self, SourceState::AuthFailed | SourceState::SyntheticOnly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        let s = SourceState::default();
        assert_eq!(s, SourceState::Unknown);
        assert_eq!(s.on(SourceEvent::FetchSucceeded), SourceState::Healthy);
        assert_eq!(s.on(SourceEvent::AuthRejected), SourceState::AuthFailed);
        assert_eq!(
            SourceState::Healthy.on(SourceEvent::FellBackToSynthetic),
            SourceState::SyntheticOnly
        );
    }

    #[test]
    fn test_auth_failure_sticks_through_fallback() {
        let s = SourceState::AuthFailed.on(SourceEvent::FellBackToSynthetic);
        assert_eq!(s, SourceState::AuthFailed);
        assert!(s.skips_providers());
    }

    #[test]
    fn test_forced_refresh_clears_everything() {
        for s in [
            SourceState::Healthy,
            SourceState::AuthFailed,
            SourceState::SyntheticOnly,
        ] {
            let cleared = s.on(SourceEvent::ForcedRefresh);
            assert_eq!(cleared, SourceState::Unknown);
            assert!(!cleared.skips_providers());
        }
    }
}
