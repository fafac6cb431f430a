use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{
    User, UserId,
    error::EventError,
    flow::RequestContext,
    repositories::{RepositoryProvider, UserRepository},
};

/// Kinds of change a user aggregate can go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserChange {
    #[serde(rename = "user.update.email.create")]
    EmailCreate,
}

impl UserChange {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserChange::EmailCreate => "user.update.email.create",
        }
    }
}

/// Represents events that can be emitted by the event bus
#[derive(Debug, Clone)]
pub enum Event {
    /// The user aggregate changed. Carries the freshly hydrated user.
    UserChanged { change: UserChange, user: User },
}

/// A trait for handling events emitted by the event bus
///
/// Implementors can be registered with the [`EventBus`] and are called in
/// registration order for every event.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle_event(&self, event: &Event) -> Result<(), EventError>;
}

/// Event bus that can emit events and register event handlers
///
/// ```
/// # use keystone_core::events::EventBus;
/// let event_bus = EventBus::new();
/// ```
#[derive(Clone)]
pub struct EventBus {
    handlers: Arc<RwLock<Vec<Arc<dyn EventHandler>>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.write().await.push(handler);
    }

    /// Emit an event to all registered handlers, stopping at the first error
    pub async fn emit(&self, event: &Event) -> Result<(), EventError> {
        for handler in self.handlers.read().await.iter() {
            handler.handle_event(event).await?;
        }

        Ok(())
    }
}

/// Outbound notification that a user changed.
///
/// Best effort: there is no return value, failures are logged by the
/// implementation and never abort the caller.
#[async_trait]
pub trait ChangeNotifier: Send + Sync + 'static {
    type Tx: Send;

    async fn notify(
        &self,
        request: &RequestContext,
        tx: &mut Self::Tx,
        change: UserChange,
        user_id: &UserId,
    );
}

/// [`ChangeNotifier`] that loads the changed user through the store and
/// publishes it on an [`EventBus`].
pub struct EventBusNotifier<P: RepositoryProvider> {
    storage: Arc<P>,
    bus: EventBus,
}

impl<P: RepositoryProvider> EventBusNotifier<P> {
    pub fn new(storage: Arc<P>, bus: EventBus) -> Self {
        Self { storage, bus }
    }
}

#[async_trait]
impl<P: RepositoryProvider> ChangeNotifier for EventBusNotifier<P> {
    type Tx = P::Tx;

    async fn notify(
        &self,
        request: &RequestContext,
        tx: &mut Self::Tx,
        change: UserChange,
        user_id: &UserId,
    ) {
        let user = match self.storage.user().get(tx, user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::warn!(
                    request_id = %request.request_id,
                    user_id = %user_id,
                    change = change.as_str(),
                    "Skipping change notification for unknown user"
                );
                return;
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %request.request_id,
                    user_id = %user_id,
                    error = %e,
                    "Failed to load user for change notification"
                );
                return;
            }
        };

        if let Err(e) = self.bus.emit(&Event::UserChanged { change, user }).await {
            tracing::warn!(
                request_id = %request.request_id,
                user_id = %user_id,
                error = %e,
                "Failed to deliver change notification"
            );
        }
    }
}
