#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use keystone_core::{
    Email, PrimaryEmail, User, UserId, Username,
    repositories::{
        EmailRepository, PrimaryEmailRepository, RepositoryProvider, UserRepository,
        UsernameRepository,
    },
};
use keystone_storage_sqlite::{SqliteRepositoryProvider, SqliteStorageConfig};
use sqlx::SqliteConnection;
use uuid::Uuid;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Fresh in-memory database with every migration applied.
pub async fn setup() -> SqliteRepositoryProvider {
    init_tracing();
    let storage = SqliteRepositoryProvider::connect(&SqliteStorageConfig::default())
        .await
        .expect("Failed to open in-memory database");
    storage.migrate().await.expect("Failed to run migrations");
    storage
}

/// Create a bare user whose creation time is `offset_secs` after a fixed epoch,
/// so ordering in tests does not depend on the clock.
pub async fn create_user(
    storage: &SqliteRepositoryProvider,
    conn: &mut SqliteConnection,
    offset_secs: i64,
) -> User {
    let created_at = base_time() + Duration::seconds(offset_secs);
    let user = User::builder()
        .created_at(created_at)
        .updated_at(created_at)
        .build()
        .expect("valid user");
    storage.user().create(conn, &user).await.expect("create user");
    user
}

pub fn base_time() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_700_000_000_000).expect("valid timestamp")
}

pub async fn add_email(
    storage: &SqliteRepositoryProvider,
    conn: &mut SqliteConnection,
    user_id: UserId,
    address: &str,
    verified: bool,
) -> Email {
    let mut email = Email::new(user_id, address);
    email.verified = verified;
    storage.email().create(conn, &email).await.expect("create email");
    email
}

pub async fn make_primary(
    storage: &SqliteRepositoryProvider,
    conn: &mut SqliteConnection,
    email: &Email,
) -> PrimaryEmail {
    let user_id = email.user_id.expect("owned email");
    let primary = PrimaryEmail::new(email.id, user_id);
    storage
        .primary_email()
        .create(conn, &primary)
        .await
        .expect("create primary email");
    primary
}

pub async fn add_username(
    storage: &SqliteRepositoryProvider,
    conn: &mut SqliteConnection,
    user_id: UserId,
    name: &str,
) -> Username {
    let username = Username::new(user_id, name);
    storage
        .username()
        .create(conn, &username)
        .await
        .expect("create username");
    username
}

/// Insert an orphaned email, as left behind by an unfinished registration.
pub async fn add_orphan_email(conn: &mut SqliteConnection, address: &str) {
    let now = Utc::now().timestamp_millis();
    sqlx::query(
        "INSERT INTO emails (id, user_id, address, verified, created_at, updated_at) VALUES (?1, NULL, ?2, 0, ?3, ?3)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(address)
    .bind(now)
    .execute(&mut *conn)
    .await
    .expect("insert orphan email");
}

pub async fn add_identity(conn: &mut SqliteConnection, email: &Email, provider: &str) {
    let now = Utc::now().timestamp_millis();
    sqlx::query(
        r#"
        INSERT INTO identities (id, email_id, provider_id, provider_name, saml_domain, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?5)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(email.id.to_string())
    .bind(format!("{provider}-{}", email.id))
    .bind(provider)
    .bind(now)
    .execute(&mut *conn)
    .await
    .expect("insert identity");
}

pub async fn add_webauthn_credential(
    conn: &mut SqliteConnection,
    user_id: UserId,
    credential_id: &str,
    mfa_only: bool,
    transports: &[&str],
) {
    let now = Utc::now().timestamp_millis();
    sqlx::query(
        r#"
        INSERT INTO webauthn_credentials
            (id, user_id, name, public_key, attestation_type, aaguid, sign_count,
             backup_eligible, backup_state, mfa_only, last_used_at, created_at, updated_at)
        VALUES (?1, ?2, NULL, 'pk', 'none', ?3, 0, 0, 0, ?4, NULL, ?5, ?5)
        "#,
    )
    .bind(credential_id)
    .bind(user_id.to_string())
    .bind(Uuid::nil().to_string())
    .bind(mfa_only)
    .bind(now)
    .execute(&mut *conn)
    .await
    .expect("insert webauthn credential");

    for transport in transports {
        sqlx::query(
            "INSERT INTO webauthn_credential_transports (id, name, webauthn_credential_id) VALUES (?1, ?2, ?3)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(*transport)
        .bind(credential_id)
        .execute(&mut *conn)
        .await
        .expect("insert transport");
    }
}

pub async fn add_password(conn: &mut SqliteConnection, user_id: UserId) {
    let now = Utc::now().timestamp_millis();
    sqlx::query(
        "INSERT INTO password_credentials (id, user_id, password, created_at, updated_at) VALUES (?1, ?2, '$argon2id$hash', ?3, ?3)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id.to_string())
    .bind(now)
    .execute(&mut *conn)
    .await
    .expect("insert password credential");
}

pub async fn add_otp_secret(conn: &mut SqliteConnection, user_id: UserId) {
    let now = Utc::now().timestamp_millis();
    sqlx::query(
        "INSERT INTO otp_secrets (id, user_id, secret, created_at, updated_at) VALUES (?1, ?2, 'JBSWY3DPEHPK3PXP', ?3, ?3)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id.to_string())
    .bind(now)
    .execute(&mut *conn)
    .await
    .expect("insert otp secret");
}

pub async fn add_metadata(conn: &mut SqliteConnection, user_id: UserId, public: &str) {
    let now = Utc::now().timestamp_millis();
    sqlx::query(
        r#"
        INSERT INTO user_metadata (id, user_id, public_metadata, private_metadata, unsafe_metadata, created_at, updated_at)
        VALUES (?1, ?2, ?3, NULL, NULL, ?4, ?4)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id.to_string())
    .bind(public)
    .bind(now)
    .execute(&mut *conn)
    .await
    .expect("insert user metadata");
}
