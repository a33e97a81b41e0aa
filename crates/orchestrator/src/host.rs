#![forbid(unsafe_code)]

use crate::error::HookError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// The chat gateway connection.
#[async_trait]
pub trait Transport: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Cheap authenticated round trip, e.g. fetching the bot's own user.
    async fn self_lookup(&self) -> Result<(), HookError>;

    async fn reconnect(&self) -> Result<(), HookError>;

    async fn send(&self, channel: u64, content: &str) -> Result<(), HookError>;
}

/// A feature module loaded into the host. Both hooks are optional; `None`
/// means the module does not provide one.
#[async_trait]
pub trait Subsystem: Send + Sync {
    async fn restart(&self) -> Option<Result<(), HookError>> {
        None
    }

    async fn setup(&self) -> Option<Result<(), HookError>> {
        None
    }
}

/// The process hosting the feature modules.
#[async_trait]
pub trait Host: Send + Sync {
    /// Resolve a loaded collaborator by name.
    fn subsystem(&self, name: &str) -> Option<Arc<dyn Subsystem>>;

    /// Install a collaborator that is not loaded. `None` when the host has no
    /// installer for `name`.
    async fn setup(&self, name: &str) -> Option<Result<(), HookError>>;

    /// Registered commands, `None` without a command registry.
    fn command_count(&self) -> Option<usize>;

    /// Registered event listeners, `None` without an event registry.
    fn listener_count(&self) -> Option<usize>;

    async fn release_memory(&self) -> Result<(), HookError>;
}

/// Transport used when the engine runs without a gateway. Always connected,
/// notifications go to the log.
#[derive(Debug, Default)]
pub struct NoopTransport;

#[async_trait]
impl Transport for NoopTransport {
    fn is_connected(&self) -> bool {
        true
    }

    async fn self_lookup(&self) -> Result<(), HookError> {
        Ok(())
    }

    async fn reconnect(&self) -> Result<(), HookError> {
        Ok(())
    }

    async fn send(&self, channel: u64, content: &str) -> Result<(), HookError> {
        debug!(channel, content, "notification (no transport)");
        Ok(())
    }
}

/// Host with no collaborators and no registries.
#[derive(Debug, Default)]
pub struct NoopHost;

#[async_trait]
impl Host for NoopHost {
    fn subsystem(&self, _name: &str) -> Option<Arc<dyn Subsystem>> {
        None
    }

    async fn setup(&self, _name: &str) -> Option<Result<(), HookError>> {
        None
    }

    fn command_count(&self) -> Option<usize> {
        None
    }

    fn listener_count(&self) -> Option<usize> {
        None
    }

    async fn release_memory(&self) -> Result<(), HookError> {
        Ok(())
    }
}
