//! Session configuration.

use std::sync::Arc;
use std::time::Duration;

use netconf_core::default_capabilities;
use netconf_protocol::DEFAULT_MAX_MESSAGE_SIZE;

use crate::message_id::{MessageIdGenerator, UuidGenerator};

/// How inbound replies are matched to outstanding requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CorrelationMode {
    /// Each reply goes to the oldest outstanding request. The server must
    /// answer in request order.
    #[default]
    Positional,
    /// Each reply goes to the request whose `message-id` it echoes. Replies
    /// without the attribute fall back to positional matching.
    MessageId,
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capabilities announced when the server does not offer base:1.1.
    pub capabilities: Vec<String>,

    /// Reply correlation strategy.
    pub correlation: CorrelationMode,

    /// Largest inbound message accepted before the session is torn down.
    pub max_message_size: usize,

    /// How long to wait for the server hello.
    pub hello_timeout: Duration,

    /// Source of `message-id` values.
    pub message_ids: Arc<dyn MessageIdGenerator>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capabilities: default_capabilities(),
            correlation: CorrelationMode::Positional,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            hello_timeout: Duration::from_secs(30),
            message_ids: Arc::new(UuidGenerator),
        }
    }
}

impl SessionConfig {
    /// Creates a configuration announcing the given capabilities.
    pub fn new(capabilities: Vec<String>) -> Self {
        Self {
            capabilities,
            ..Default::default()
        }
    }

    /// Builder: set correlation mode.
    pub fn with_correlation(mut self, mode: CorrelationMode) -> Self {
        self.correlation = mode;
        self
    }

    /// Builder: set maximum inbound message size.
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }

    /// Builder: set hello timeout.
    pub fn with_hello_timeout(mut self, timeout: Duration) -> Self {
        self.hello_timeout = timeout;
        self
    }

    /// Builder: set the message id source.
    pub fn with_message_ids(mut self, ids: impl MessageIdGenerator + 'static) -> Self {
        self.message_ids = Arc::new(ids);
        self
    }
}
