//! Runtime limits shared by stubs and handlers.

use std::time::Duration;

use crate::error::ConfigError;

/// How often a registered callback may be invoked by the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallbackPolicy {
    /// The trampoline is removed on its first invocation.
    #[default]
    Once,
    /// The trampoline stays registered until explicitly unregistered.
    Repeated,
}

/// Limits applied to every call on one side of a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcConfig {
    /// Largest message context that may be allocated, in bytes
    pub max_message_size: usize,
    /// Largest scratchpad an inbound header may announce, in bytes
    pub max_scratchpad: usize,
    /// How long a command waits for its response (transports that can time
    /// out honour this)
    pub response_timeout: Duration,
    /// Number of message contexts that may be in flight at once
    pub message_slots: usize,
    /// Invocation policy for callbacks registered by stubs
    pub callback_policy: CallbackPolicy,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            max_message_size: 1024,
            max_scratchpad: 4096,
            response_timeout: Duration::from_secs(5),
            message_slots: 16,
            callback_policy: CallbackPolicy::Once,
        }
    }
}

impl RpcConfig {
    /// Override the maximum message size.
    #[must_use]
    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    /// Override the maximum scratchpad size.
    #[must_use]
    pub fn with_max_scratchpad(mut self, bytes: usize) -> Self {
        self.max_scratchpad = bytes;
        self
    }

    /// Override the response timeout.
    #[must_use]
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Override the number of message slots.
    #[must_use]
    pub fn with_message_slots(mut self, slots: usize) -> Self {
        self.message_slots = slots;
        self
    }

    /// Override the callback policy.
    #[must_use]
    pub fn with_callback_policy(mut self, policy: CallbackPolicy) -> Self {
        self.callback_policy = policy;
        self
    }

    /// Check the limits are usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first unusable limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.message_slots == 0 {
            return Err(ConfigError::Zero("message_slots"));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::Zero("max_message_size"));
        }
        if self.response_timeout.is_zero() {
            return Err(ConfigError::Zero("response_timeout"));
        }
        if u32::try_from(self.max_scratchpad).is_err() {
            return Err(ConfigError::ScratchpadTooLarge(self.max_scratchpad));
        }
        Ok(())
    }
}
