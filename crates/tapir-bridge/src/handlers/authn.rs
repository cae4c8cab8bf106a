//! Login and logout events. Nothing is written; they are only logged.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::envelope::IdentityEvent;
use crate::handler::{ChangeSet, Handler, HandlerContext, Outcome};
use crate::store::LegacyTx;

#[derive(Debug, Clone, Copy)]
pub struct SessionObserver {
    name: &'static str,
}

impl SessionObserver {
    pub fn login() -> Self {
        Self {
            name: "dispatch_authn_do_login",
        }
    }

    pub fn logout() -> Self {
        Self {
            name: "dispatch_authn_do_logout",
        }
    }
}

#[async_trait]
impl Handler for SessionObserver {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn handle(
        &self,
        _ctx: &HandlerContext,
        event: &IdentityEvent,
        _representation: &Value,
        _tx: &mut dyn LegacyTx,
    ) -> Outcome {
        debug!(
            dispatch = self.name,
            username = event.detail("username").unwrap_or("-"),
            user_id = event.user_id.as_deref().unwrap_or("-"),
            "Session event"
        );
        Outcome::Applied(ChangeSet::new())
    }
}
