//! Command and event dispatch table.
//!
//! Handlers are registered once through a [`RegistryBuilder`]; `build`
//! freezes the table. Lookup is by `(group, kind, op)`, so a command and an
//! event may share an op id inside one group.

use std::{collections::BTreeMap, sync::Arc};

use stubwire_proto::{OperationId, RouteKey};

use crate::{
    config::RpcConfig,
    error::RegistryError,
    handler::HandlerOutcome,
    pool::MessagePool,
    report::{DecodeErrorReporter, TracingReporter},
};

/// Shared resources passed to every handler invocation.
#[derive(Clone, Copy)]
pub struct HandlerEnv<'a> {
    /// Runtime limits
    pub config: &'a RpcConfig,
    /// Pool responses are encoded from
    pub pool: &'a MessagePool,
    /// Sink for rejected messages
    pub reporter: &'a dyn DecodeErrorReporter,
}

impl std::fmt::Debug for HandlerEnv<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerEnv").field("config", self.config).field("pool", self.pool).finish()
    }
}

/// Type-erased entry point for one operation.
pub trait Handler: Send + Sync {
    /// Operation this handler serves.
    fn id(&self) -> OperationId;

    /// Run one invocation over an inbound message.
    fn handle(&self, message: &[u8], env: &HandlerEnv<'_>) -> HandlerOutcome;
}

/// Collects handlers before the table is frozen.
pub struct RegistryBuilder {
    config: RpcConfig,
    reporter: Arc<dyn DecodeErrorReporter>,
    routes: BTreeMap<RouteKey, Arc<dyn Handler>>,
}

impl RegistryBuilder {
    /// Start an empty table using `config` for every invocation.
    pub fn new(config: RpcConfig) -> Self {
        Self { config, reporter: Arc::new(TracingReporter), routes: BTreeMap::new() }
    }

    /// Replace the default [`TracingReporter`].
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn DecodeErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Add a handler.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if the route is taken.
    pub fn register(
        &mut self,
        handler: impl Handler + 'static,
    ) -> Result<&mut Self, RegistryError> {
        let id = handler.id();
        let key = id.route_key();
        if self.routes.contains_key(&key) {
            return Err(RegistryError::Duplicate(id));
        }
        self.routes.insert(key, Arc::new(handler));
        Ok(self)
    }

    /// Freeze the table.
    pub fn build(self) -> Registry {
        tracing::debug!(handlers = self.routes.len(), "registry built");
        let pool = MessagePool::from_config(&self.config);
        Registry { routes: self.routes, config: self.config, pool, reporter: self.reporter }
    }
}

/// Frozen dispatch table for one side of a link.
pub struct Registry {
    routes: BTreeMap<RouteKey, Arc<dyn Handler>>,
    config: RpcConfig,
    pool: MessagePool,
    reporter: Arc<dyn DecodeErrorReporter>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .field("config", &self.config)
            .field("pool", &self.pool)
            .finish()
    }
}

impl Registry {
    /// Route an inbound message to its handler.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownOperation`] if nothing serves the
    /// route. Everything past the lookup is reported through the returned
    /// [`HandlerOutcome`].
    pub fn deliver(
        &self,
        route: RouteKey,
        message: &[u8],
    ) -> Result<HandlerOutcome, RegistryError> {
        let handler = self.routes.get(&route).ok_or(RegistryError::UnknownOperation {
            group: route.group,
            kind: route.kind,
            op: route.op,
        })?;
        let env =
            HandlerEnv { config: &self.config, pool: &self.pool, reporter: self.reporter.as_ref() };
        Ok(handler.handle(message, &env))
    }

    /// True if a handler serves `op`.
    pub fn contains(&self, op: OperationId) -> bool {
        self.routes.contains_key(&op.route_key())
    }

    /// Operations served, in route order.
    pub fn operations(&self) -> impl Iterator<Item = OperationId> + '_ {
        self.routes.values().map(|handler| handler.id())
    }

    /// Number of handlers.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// True if no handler was registered.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Limits applied to every invocation.
    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Pool responses are leased from.
    pub fn pool(&self) -> &MessagePool {
        &self.pool
    }
}
