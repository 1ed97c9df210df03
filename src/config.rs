use std::time::Duration;

use crate::workflow::TERMINAL_NODE;

/// Local ComfyUI on its standard port.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8188";

/// Configuration for a [`Generator`](crate::Generator).
///
/// Use [`GeneratorConfig::builder()`] for ergonomic construction, or
/// [`GeneratorConfig::default()`] for a local server with a random session.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Base HTTP URL of the ComfyUI server.
    pub base_url: String,

    /// Fixed client session id. `None` = generate one.
    pub client_id: Option<String>,

    /// Bound on each HTTP request. `None` = wait as long as the server takes.
    pub request_timeout: Option<Duration>,

    /// Node whose `executed` event completes a generation.
    pub terminal_node: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SERVER_URL.to_string(),
            client_id: None,
            request_timeout: None,
            terminal_node: TERMINAL_NODE.to_string(),
        }
    }
}

impl GeneratorConfig {
    /// Start building a config with the builder pattern.
    pub fn builder() -> GeneratorConfigBuilder {
        GeneratorConfigBuilder::default()
    }
}

/// Builder for [`GeneratorConfig`].
#[derive(Default)]
pub struct GeneratorConfigBuilder {
    config: GeneratorConfig,
}

impl GeneratorConfigBuilder {
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    /// Pin the client session id instead of generating one.
    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.config.client_id = Some(id.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    pub fn with_terminal_node(mut self, node: impl Into<String>) -> Self {
        self.config.terminal_node = node.into();
        self
    }

    /// Build the final [`GeneratorConfig`].
    pub fn build(self) -> GeneratorConfig {
        self.config
    }
}
