//! Contract between the flow engine and the hooks it runs
//!
//! The engine owns the transaction and the values collected by earlier steps.
//! It hands both to a [`Hook`] through a [`HookContext`]; the hook performs its
//! writes on that transaction and the engine commits or rolls back afterwards.
pub mod email_persist_verified_status;

pub use email_persist_verified_status::EmailPersistVerifiedStatus;

use crate::{Error, User, error::ValidationError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Per-request data used for tracing and audit metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn with_ip_address(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// How the user is logging in, as recorded by the login steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginMethod {
    Passcode,
    Password,
    Passkey,
    ThirdParty,
}

impl FromStr for LoginMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "passcode" => Ok(LoginMethod::Passcode),
            "password" => Ok(LoginMethod::Password),
            "passkey" => Ok(LoginMethod::Passkey),
            "third_party" => Ok(LoginMethod::ThirdParty),
            other => Err(ValidationError::InvalidField(format!(
                "login_method: unknown value {other}"
            ))),
        }
    }
}

/// Values earlier flow steps left for later ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStash {
    /// Set once the user proved ownership of `email`.
    pub email_verified: bool,
    /// The address being registered or verified.
    pub email: Option<String>,
    /// Unparsed id of the user the flow acts on.
    pub user_id: Option<String>,
    /// Only written by login steps.
    pub login_method: Option<LoginMethod>,
}

/// Everything a hook may touch while it runs.
pub struct HookContext<'a, Tx> {
    /// The engine's open transaction.
    pub tx: &'a mut Tx,
    pub request: &'a RequestContext,
    pub flow_id: Uuid,
    pub stash: &'a FlowStash,
    /// The user view the engine is tracking for the session, kept in sync
    /// with whatever the hook persists.
    pub session_user: Option<&'a mut User>,
}

impl<'a, Tx> HookContext<'a, Tx> {
    pub fn new(
        tx: &'a mut Tx,
        request: &'a RequestContext,
        flow_id: Uuid,
        stash: &'a FlowStash,
    ) -> Self {
        Self {
            tx,
            request,
            flow_id,
            stash,
            session_user: None,
        }
    }

    pub fn with_session_user(mut self, user: &'a mut User) -> Self {
        self.session_user = Some(user);
        self
    }
}

#[derive(Debug, Error)]
pub enum HookError {
    /// A value the hook requires was never stashed.
    #[error("{0} not set on the stash")]
    MissingContext(&'static str),

    #[error("failed to parse stashed user_id")]
    Parse(#[source] ValidationError),

    #[error("could not {action}")]
    Persistence {
        action: &'static str,
        #[source]
        source: Error,
    },

    #[error("could not create audit log")]
    Audit(#[source] Error),
}

impl HookError {
    pub(crate) fn persistence(action: &'static str) -> impl FnOnce(Error) -> HookError {
        move |source| HookError::Persistence { action, source }
    }

    /// Whether rerunning the step in a fresh transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            HookError::MissingContext(_) | HookError::Parse(_) => false,
            HookError::Persistence { source, .. } | HookError::Audit(source) => {
                source.is_retryable()
            }
        }
    }
}

/// A step the flow engine runs inside its transaction.
#[async_trait]
pub trait Hook<Tx: Send>: Send + Sync {
    async fn execute(&self, ctx: &mut HookContext<'_, Tx>) -> Result<(), HookError>;
}
