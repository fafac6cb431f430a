//! Batched loading of the sub-entities that make up a [`User`].
//!
//! Each query kind names a [`Hydration`] and the loader issues one
//! `IN (...)` query per enabled sub-entity, regardless of how many users are
//! being hydrated.
use std::collections::HashMap;
use std::hash::Hash;

use keystone_core::{
    Email, Error, Identity, OtpSecret, PasswordCredential, PrimaryEmail, Transport, User,
    UserMetadata, Username, WebauthnCredential,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};

use crate::error::db_error;
use crate::models::{
    SqliteEmail, SqliteIdentity, SqliteOtpSecret, SqlitePasswordCredential, SqlitePrimaryEmail,
    SqliteTransport, SqliteUser, SqliteUserMetadata, SqliteUsername, SqliteWebauthnCredential,
};

/// Keeps each statement well under SQLite's bound parameter limit.
const BATCH_SIZE: usize = 500;

/// Which parts of the aggregate a query loads alongside the user row.
///
/// `primary_emails` and `identities` only apply when `emails` is set, and
/// `transports` only when `webauthn_credentials` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Hydration {
    pub emails: bool,
    pub primary_emails: bool,
    pub identities: bool,
    pub webauthn_credentials: bool,
    pub transports: bool,
    pub username: bool,
    pub password_credential: bool,
    pub otp_secret: bool,
    pub metadata: bool,
}

impl Hydration {
    /// Only the user row.
    pub const NONE: Hydration = Hydration {
        emails: false,
        primary_emails: false,
        identities: false,
        webauthn_credentials: false,
        transports: false,
        username: false,
        password_credential: false,
        otp_secret: false,
        metadata: false,
    };

    /// Single-user lookups.
    pub const FULL: Hydration = Hydration {
        emails: true,
        primary_emails: true,
        identities: true,
        webauthn_credentials: true,
        transports: true,
        username: true,
        password_credential: true,
        otp_secret: true,
        metadata: true,
    };

    /// Paginated listing.
    pub const LISTING: Hydration = Hydration {
        emails: true,
        primary_emails: true,
        webauthn_credentials: true,
        transports: true,
        username: true,
        ..Hydration::NONE
    };

    /// Unfiltered export of every user.
    pub const ALL_USERS: Hydration = Hydration {
        password_credential: false,
        otp_secret: false,
        metadata: false,
        ..Hydration::FULL
    };
}

/// Run `prefix IN (ids) suffix` in batches and collect every row.
async fn fetch_in<T>(
    conn: &mut SqliteConnection,
    prefix: &str,
    ids: &[String],
    suffix: &str,
    message: &'static str,
) -> Result<Vec<T>, Error>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let mut rows = Vec::new();

    for chunk in ids.chunks(BATCH_SIZE) {
        let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(prefix);
        builder.push(" IN (");
        let mut separated = builder.separated(", ");
        for id in chunk {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");
        builder.push(" ");
        builder.push(suffix);

        let batch = builder
            .build_query_as::<T>()
            .fetch_all(&mut *conn)
            .await
            .map_err(db_error(message))?;
        rows.extend(batch);
    }

    Ok(rows)
}

fn group_by<K, V>(items: Vec<V>, key: impl Fn(&V) -> K) -> HashMap<K, Vec<V>>
where
    K: Eq + Hash,
{
    let mut grouped: HashMap<K, Vec<V>> = HashMap::new();
    for item in items {
        grouped.entry(key(&item)).or_default().push(item);
    }
    grouped
}

fn convert<R, T>(rows: Vec<R>) -> Result<Vec<T>, Error>
where
    T: TryFrom<R, Error = Error>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// Turn user rows into aggregates, loading what `hydration` asks for.
///
/// Input order is preserved.
pub(crate) async fn hydrate(
    conn: &mut SqliteConnection,
    rows: Vec<SqliteUser>,
    hydration: Hydration,
) -> Result<Vec<User>, Error> {
    let mut users: Vec<User> = convert(rows)?;
    if users.is_empty() {
        return Ok(users);
    }

    let user_ids: Vec<String> = users.iter().map(|u| u.id.to_string()).collect();

    if hydration.emails {
        let mut emails: Vec<Email> = convert(
            fetch_in::<SqliteEmail>(
                conn,
                "SELECT * FROM emails WHERE user_id",
                &user_ids,
                "ORDER BY created_at ASC, id ASC",
                "Failed to load emails",
            )
            .await?,
        )?;
        let email_ids: Vec<String> = emails.iter().map(|e| e.id.to_string()).collect();

        if hydration.primary_emails {
            let primaries: Vec<PrimaryEmail> = convert(
                fetch_in::<SqlitePrimaryEmail>(
                    conn,
                    "SELECT * FROM primary_emails WHERE email_id",
                    &email_ids,
                    "",
                    "Failed to load primary emails",
                )
                .await?,
            )?;
            let mut by_email: HashMap<_, _> =
                primaries.into_iter().map(|p| (p.email_id, p)).collect();
            for email in &mut emails {
                email.primary_email = by_email.remove(&email.id);
            }
        }

        if hydration.identities {
            let identities: Vec<Identity> = convert(
                fetch_in::<SqliteIdentity>(
                    conn,
                    "SELECT * FROM identities WHERE email_id",
                    &email_ids,
                    "ORDER BY created_at ASC, id ASC",
                    "Failed to load identities",
                )
                .await?,
            )?;
            let mut by_email = group_by(identities, |i| i.email_id);
            for email in &mut emails {
                email.identities = by_email.remove(&email.id).unwrap_or_default();
            }
        }

        let mut by_user = group_by(emails, |e| e.user_id);
        for user in &mut users {
            user.emails = by_user.remove(&Some(user.id)).unwrap_or_default();
        }
    }

    if hydration.webauthn_credentials {
        let mut credentials: Vec<WebauthnCredential> = convert(
            fetch_in::<SqliteWebauthnCredential>(
                conn,
                "SELECT * FROM webauthn_credentials WHERE user_id",
                &user_ids,
                "ORDER BY created_at ASC, id ASC",
                "Failed to load webauthn credentials",
            )
            .await?,
        )?;

        if hydration.transports {
            let credential_ids: Vec<String> = credentials.iter().map(|c| c.id.clone()).collect();
            let transports: Vec<Transport> = convert(
                fetch_in::<SqliteTransport>(
                    conn,
                    "SELECT * FROM webauthn_credential_transports WHERE webauthn_credential_id",
                    &credential_ids,
                    "ORDER BY name ASC",
                    "Failed to load credential transports",
                )
                .await?,
            )?;
            let mut by_credential = group_by(transports, |t| t.credential_id.clone());
            for credential in &mut credentials {
                credential.transports = by_credential.remove(&credential.id).unwrap_or_default();
            }
        }

        let mut by_user = group_by(credentials, |c| c.user_id);
        for user in &mut users {
            user.webauthn_credentials = by_user.remove(&user.id).unwrap_or_default();
        }
    }

    if hydration.username {
        let usernames: Vec<Username> = convert(
            fetch_in::<SqliteUsername>(
                conn,
                "SELECT * FROM usernames WHERE user_id",
                &user_ids,
                "",
                "Failed to load usernames",
            )
            .await?,
        )?;
        let mut by_user: HashMap<_, _> = usernames.into_iter().map(|u| (u.user_id, u)).collect();
        for user in &mut users {
            user.username = by_user.remove(&user.id);
        }
    }

    if hydration.password_credential {
        let passwords: Vec<PasswordCredential> = convert(
            fetch_in::<SqlitePasswordCredential>(
                conn,
                "SELECT * FROM password_credentials WHERE user_id",
                &user_ids,
                "",
                "Failed to load password credentials",
            )
            .await?,
        )?;
        let mut by_user: HashMap<_, _> = passwords.into_iter().map(|p| (p.user_id, p)).collect();
        for user in &mut users {
            user.password_credential = by_user.remove(&user.id);
        }
    }

    if hydration.otp_secret {
        let secrets: Vec<OtpSecret> = convert(
            fetch_in::<SqliteOtpSecret>(
                conn,
                "SELECT * FROM otp_secrets WHERE user_id",
                &user_ids,
                "",
                "Failed to load otp secrets",
            )
            .await?,
        )?;
        let mut by_user: HashMap<_, _> = secrets.into_iter().map(|s| (s.user_id, s)).collect();
        for user in &mut users {
            user.otp_secret = by_user.remove(&user.id);
        }
    }

    if hydration.metadata {
        let metadata: Vec<UserMetadata> = convert(
            fetch_in::<SqliteUserMetadata>(
                conn,
                "SELECT * FROM user_metadata WHERE user_id",
                &user_ids,
                "",
                "Failed to load user metadata",
            )
            .await?,
        )?;
        let mut by_user: HashMap<_, _> = metadata.into_iter().map(|m| (m.user_id, m)).collect();
        for user in &mut users {
            user.metadata = by_user.remove(&user.id);
        }
    }

    Ok(users)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_skips_secrets() {
        let listing = Hydration::LISTING;
        assert!(listing.emails && listing.primary_emails && listing.username);
        assert!(listing.webauthn_credentials && listing.transports);
        assert!(!listing.identities);
        assert!(!listing.password_credential && !listing.otp_secret && !listing.metadata);
    }

    #[test]
    fn test_all_users_includes_identities() {
        let all = Hydration::ALL_USERS;
        assert!(all.emails && all.primary_emails && all.identities);
        assert!(all.webauthn_credentials && all.transports && all.username);
        assert!(!all.password_credential && !all.otp_secret && !all.metadata);
        assert_eq!(Hydration::default(), Hydration::NONE);
    }

    #[test]
    fn test_group_by_preserves_order_within_group() {
        let grouped = group_by(vec![(1, "a"), (2, "b"), (1, "c")], |(k, _)| *k);
        assert_eq!(grouped[&1], vec![(1, "a"), (1, "c")]);
        assert_eq!(grouped[&2], vec![(2, "b")]);
    }
}
