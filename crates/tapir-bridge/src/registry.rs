//! Static `(resource, operation)` → handler table.

use std::collections::HashMap;
use std::sync::Arc;

use crate::envelope::DispatchKey;
use crate::handler::Handler;
use crate::handlers::{
    RoleMappingHandler, SessionObserver, UserProfileHandler, VerifyEmailHandler,
};

/// Read-only after construction; unregistered keys are ignored by the bridge.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<DispatchKey, Arc<dyn Handler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.handlers.keys().map(DispatchKey::dispatch_name).collect();
        names.sort();
        f.debug_struct("HandlerRegistry")
            .field("handlers", &names)
            .finish()
    }
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every handler the legacy store needs.
    pub fn standard() -> Self {
        Self::new()
            .with("realm_role_mapping", "create", RoleMappingHandler::create())
            .with("realm_role_mapping", "delete", RoleMappingHandler::delete())
            .with("user", "update", UserProfileHandler)
            .with("authn", "verify_email", VerifyEmailHandler)
            .with("authn", "login", SessionObserver::login())
            .with("authn", "logout", SessionObserver::logout())
    }

    /// Register `handler` for `(resource, operation)`, replacing any previous one.
    pub fn with(
        mut self,
        resource: &str,
        operation: &str,
        handler: impl Handler + 'static,
    ) -> Self {
        self.register(DispatchKey::new(resource, operation), Arc::new(handler));
        self
    }

    pub fn register(&mut self, key: DispatchKey, handler: Arc<dyn Handler>) {
        self.handlers.insert(key, handler);
    }

    pub fn lookup(&self, key: &DispatchKey) -> Option<Arc<dyn Handler>> {
        self.handlers.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
