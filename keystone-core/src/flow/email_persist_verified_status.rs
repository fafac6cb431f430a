use std::sync::Arc;

use async_trait::async_trait;

use super::{Hook, HookContext, HookError, LoginMethod};
use crate::{
    Email, PrimaryEmail, UserId,
    audit::{AuditDetail, AuditLogType, AuditLogger},
    events::{ChangeNotifier, UserChange},
    repositories::{EmailRepository, PrimaryEmailRepository, RepositoryProvider},
};

/// Commits a verified email address into the user aggregate.
///
/// Runs after the flow confirmed the user owns `stash.email`. Depending on
/// what is already stored it creates the email (promoting it to primary when
/// it is the user's only one), marks an existing one verified, or leaves an
/// already verified one alone. Audit entries go through the same
/// transaction; the change notification for a created email does not.
pub struct EmailPersistVerifiedStatus<P, A, N> {
    storage: Arc<P>,
    audit: Arc<A>,
    notifier: Arc<N>,
}

impl<P, A, N> EmailPersistVerifiedStatus<P, A, N> {
    pub fn new(storage: Arc<P>, audit: Arc<A>, notifier: Arc<N>) -> Self {
        Self {
            storage,
            audit,
            notifier,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Created,
    MarkedVerified,
    AlreadyVerified,
}

impl<P, A, N> EmailPersistVerifiedStatus<P, A, N>
where
    P: RepositoryProvider,
    A: AuditLogger<Tx = P::Tx>,
    N: ChangeNotifier<Tx = P::Tx>,
{
    async fn persist(
        &self,
        ctx: &mut HookContext<'_, P::Tx>,
        user_id: UserId,
        address: &str,
    ) -> Result<Outcome, HookError> {
        let existing = self
            .storage
            .email()
            .find_by_address(ctx.tx, address)
            .await
            .map_err(HookError::persistence("fetch email"))?;

        match existing {
            None => {
                let email = Email::new(user_id, address).verified();
                self.storage
                    .email()
                    .create(ctx.tx, &email)
                    .await
                    .map_err(HookError::persistence("save email"))?;

                let owned = self
                    .storage
                    .email()
                    .find_by_user_id(ctx.tx, &user_id)
                    .await
                    .map_err(HookError::persistence("fetch emails"))?;

                if let Some(user) = ctx.session_user.as_deref_mut() {
                    user.emails.push(email.clone());
                }

                // The first email a user ever gets becomes their primary one.
                if owned.len() == 1 && owned[0].id == email.id {
                    let primary = PrimaryEmail::new(email.id, user_id);
                    self.storage
                        .primary_email()
                        .create(ctx.tx, &primary)
                        .await
                        .map_err(HookError::persistence("save primary email"))?;

                    if let Some(user) = ctx.session_user.as_deref_mut() {
                        user.set_primary_email(primary);
                    }
                }

                Ok(Outcome::Created)
            }
            Some(mut email) if !email.verified => {
                email.verified = true;
                email.updated_at = crate::now();
                self.storage
                    .email()
                    .update(ctx.tx, &email)
                    .await
                    .map_err(HookError::persistence("update email"))?;

                if let Some(user) = ctx.session_user.as_deref_mut() {
                    user.update_email(email);
                }

                Ok(Outcome::MarkedVerified)
            }
            Some(_) => Ok(Outcome::AlreadyVerified),
        }
    }

    async fn audit(
        &self,
        ctx: &mut HookContext<'_, P::Tx>,
        kind: AuditLogType,
        user_id: &UserId,
        address: &str,
    ) -> Result<(), HookError> {
        let details = vec![
            AuditDetail::new("email", address),
            AuditDetail::new("flow_id", ctx.flow_id.to_string()),
        ];
        self.audit
            .create(ctx.tx, ctx.request, kind, Some(user_id), None, details)
            .await
            .map_err(HookError::Audit)
    }
}

#[async_trait]
impl<P, A, N> Hook<P::Tx> for EmailPersistVerifiedStatus<P, A, N>
where
    P: RepositoryProvider,
    A: AuditLogger<Tx = P::Tx>,
    N: ChangeNotifier<Tx = P::Tx>,
{
    async fn execute(&self, ctx: &mut HookContext<'_, P::Tx>) -> Result<(), HookError> {
        let stash = ctx.stash;

        if !stash.email_verified {
            tracing::debug!(flow_id = %ctx.flow_id, "skipped");
            return Ok(());
        }

        let address = stash
            .email
            .as_deref()
            .ok_or(HookError::MissingContext("email"))?;

        let user_id: UserId = stash
            .user_id
            .as_deref()
            .ok_or(HookError::MissingContext("user_id"))?
            .parse()
            .map_err(HookError::Parse)?;

        let outcome = self.persist(ctx, user_id, address).await?;

        match outcome {
            Outcome::Created => {
                tracing::debug!(user_id = %user_id, flow_id = %ctx.flow_id, "email_created")
            }
            Outcome::MarkedVerified => {
                tracing::debug!(user_id = %user_id, flow_id = %ctx.flow_id, "email_marked_verified")
            }
            Outcome::AlreadyVerified => {
                tracing::debug!(user_id = %user_id, flow_id = %ctx.flow_id, "email_already_verified");
                return Ok(());
            }
        }

        // A passcode login implies verification and is audited by the login step.
        if stash.login_method != Some(LoginMethod::Passcode) {
            self.audit(ctx, AuditLogType::EmailVerified, &user_id, address)
                .await?;
        }

        if let Outcome::Created = outcome {
            self.audit(ctx, AuditLogType::EmailCreated, &user_id, address)
                .await?;

            self.notifier
                .notify(ctx.request, ctx.tx, UserChange::EmailCreate, &user_id)
                .await;
        }

        Ok(())
    }
}
