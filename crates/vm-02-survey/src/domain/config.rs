//! Survey timing configuration.

use std::time::Duration;

/// Engine-wide survey settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveyConfig {
    /// How long an `ask` waits when the caller does not say otherwise.
    pub default_timeout: Duration,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(500),
        }
    }
}

impl SurveyConfig {
    /// Shorter waits for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            default_timeout: Duration::from_millis(250),
        }
    }
}

/// Per-call overrides. `None` falls back to the engine timeout and the
/// handler's default `limit_peers`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurveyOptions {
    pub timeout: Option<Duration>,
    /// `Some(0)` waits out the full timeout.
    pub limit_peers: Option<usize>,
}

impl SurveyOptions {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit_peers: usize) -> Self {
        self.limit_peers = Some(limit_peers);
        self
    }
}
