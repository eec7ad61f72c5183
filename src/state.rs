use std::sync::Arc;
use std::time::Instant;

use subtle::{Choice, ConstantTimeEq};

use crate::config::ServiceConfig;
use crate::engine::Recognizer;

/// Shared application state
///
/// Built once before the listener is bound; handlers only read it.
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServiceConfig>,

    /// Recognition backend (shared across requests)
    pub recognizer: Arc<dyn Recognizer>,

    pub started_at: Instant,
}

impl ServerState {
    pub fn new(config: ServiceConfig, recognizer: Arc<dyn Recognizer>) -> Self {
        Self {
            config: Arc::new(config),
            recognizer,
            started_at: Instant::now(),
        }
    }

    /// Check a presented token against the configured set.
    ///
    /// Every configured token is compared in constant time, so the response
    /// time does not reveal how close a guess was.
    pub fn is_authorized(&self, token: Option<&str>) -> bool {
        let Some(token) = token else {
            return false;
        };

        let matched = self
            .config
            .auth_token
            .iter()
            .fold(Choice::from(0), |acc, allowed| {
                acc | allowed.as_bytes().ct_eq(token.as_bytes())
            });
        matched.into()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
