//! `[api]` configuration section.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Events kept for the recent-events view.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_event_buffer() -> usize {
    1000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            event_buffer: default_event_buffer(),
        }
    }
}
