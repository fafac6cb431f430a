mod common;

use common::*;
use keystone_core::{
    UserId,
    error::{Error, StorageError},
    repositories::{
        EmailRepository, RepositoryProvider, SortDirection, UserFilter, UserListQuery,
        UserRepository, UsernameRepository,
    },
};
use uuid::Uuid;

#[tokio::test]
async fn test_get_hydrates_full_aggregate() {
    let storage = setup().await;
    let mut tx = storage.begin().await.unwrap();

    let user = create_user(&storage, &mut tx, 0).await;
    let email = add_email(&storage, &mut tx, user.id, "jane@example.com", true).await;
    make_primary(&storage, &mut tx, &email).await;
    add_identity(&mut tx, &email, "google").await;
    add_webauthn_credential(&mut tx, user.id, "cred-1", false, &["usb", "nfc"]).await;
    add_webauthn_credential(&mut tx, user.id, "cred-2", true, &[]).await;
    add_username(&storage, &mut tx, user.id, "jane").await;
    add_password(&mut tx, user.id).await;
    add_otp_secret(&mut tx, user.id).await;
    add_metadata(&mut tx, user.id, r#"{"plan":"pro"}"#).await;

    let loaded = storage.user().get(&mut tx, &user.id).await.unwrap().unwrap();

    assert_eq!(loaded.id, user.id);
    assert_eq!(loaded.created_at, user.created_at);
    assert_eq!(loaded.emails.len(), 1);
    assert_eq!(loaded.primary_email().unwrap().address, "jane@example.com");
    assert_eq!(loaded.emails[0].identities.len(), 1);
    assert_eq!(loaded.emails[0].identities[0].provider_name, "google");

    assert_eq!(loaded.webauthn_credentials.len(), 2);
    let passkey = loaded.passkeys().next().unwrap();
    assert_eq!(passkey.id, "cred-1");
    let transports: Vec<_> = passkey.transports.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(transports, vec!["nfc", "usb"]);
    assert_eq!(loaded.mfa_credentials().count(), 1);

    assert_eq!(loaded.username.as_ref().unwrap().username, "jane");
    assert!(loaded.password_credential.is_some());
    assert!(loaded.has_otp_secret());
    let metadata = loaded.metadata.unwrap();
    assert_eq!(metadata.public_metadata.unwrap()["plan"], "pro");
}

#[tokio::test]
async fn test_get_unknown_user_is_none() {
    let storage = setup().await;
    let mut tx = storage.begin().await.unwrap();

    let found = storage
        .user()
        .get(&mut tx, &UserId::new_random())
        .await
        .unwrap();

    assert!(found.is_none());
}

#[tokio::test]
async fn test_get_by_email_address() {
    let storage = setup().await;
    let mut tx = storage.begin().await.unwrap();

    let user = create_user(&storage, &mut tx, 0).await;
    add_email(&storage, &mut tx, user.id, "jane@example.com", true).await;
    add_orphan_email(&mut tx, "orphan@example.com").await;

    let found = storage
        .user()
        .get_by_email_address(&mut tx, "jane@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, user.id);
    assert_eq!(found.emails.len(), 1);

    let orphan = storage
        .user()
        .get_by_email_address(&mut tx, "orphan@example.com")
        .await
        .unwrap();
    assert!(orphan.is_none());

    let unknown = storage
        .user()
        .get_by_email_address(&mut tx, "nobody@example.com")
        .await
        .unwrap();
    assert!(unknown.is_none());
}

#[tokio::test]
async fn test_get_by_username() {
    let storage = setup().await;
    let mut tx = storage.begin().await.unwrap();

    let user = create_user(&storage, &mut tx, 0).await;
    add_username(&storage, &mut tx, user.id, "jane").await;

    let found = storage
        .user()
        .get_by_username(&mut tx, "jane")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, user.id);
    assert_eq!(found.username.unwrap().username, "jane");

    let missing = storage.user().get_by_username(&mut tx, "JANE").await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_create_rejects_invalid_user() {
    let storage = setup().await;
    let mut tx = storage.begin().await.unwrap();

    let mut user = create_user(&storage, &mut tx, 0).await;
    user.id = UserId::new(Uuid::nil());

    let err = storage.user().create(&mut tx, &user).await.unwrap_err();
    assert!(err.is_validation_error());
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_create_duplicate_user_already_exists() {
    let storage = setup().await;
    let mut tx = storage.begin().await.unwrap();

    let user = create_user(&storage, &mut tx, 0).await;
    let err = storage.user().create(&mut tx, &user).await.unwrap_err();

    assert!(matches!(err, Error::Storage(StorageError::AlreadyExists(_))));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_update_user() {
    let storage = setup().await;
    let mut tx = storage.begin().await.unwrap();

    let mut user = create_user(&storage, &mut tx, 0).await;
    user.updated_at = user.created_at + chrono::Duration::minutes(5);
    storage.user().update(&mut tx, &user).await.unwrap();

    let loaded = storage.user().get(&mut tx, &user.id).await.unwrap().unwrap();
    assert_eq!(loaded.updated_at, user.updated_at);
}

#[tokio::test]
async fn test_update_missing_user_is_not_found() {
    let storage = setup().await;
    let mut tx = storage.begin().await.unwrap();

    let user = create_user(&storage, &mut tx, 0).await;
    storage.user().delete(&mut tx, &user).await.unwrap();

    let err = storage.user().update(&mut tx, &user).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_delete_cascades_to_owned_rows() {
    let storage = setup().await;
    let mut tx = storage.begin().await.unwrap();

    let user = create_user(&storage, &mut tx, 0).await;
    let email = add_email(&storage, &mut tx, user.id, "jane@example.com", true).await;
    make_primary(&storage, &mut tx, &email).await;
    add_username(&storage, &mut tx, user.id, "jane").await;
    add_webauthn_credential(&mut tx, user.id, "cred-1", false, &["usb"]).await;

    storage.user().delete(&mut tx, &user).await.unwrap();

    assert!(storage.user().get(&mut tx, &user.id).await.unwrap().is_none());
    assert!(
        storage
            .email()
            .find_by_address(&mut tx, "jane@example.com")
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        storage
            .username()
            .find_by_user_id(&mut tx, &user.id)
            .await
            .unwrap()
            .is_none()
    );
    let transports: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM webauthn_credential_transports")
        .fetch_one(&mut *tx)
        .await
        .unwrap();
    assert_eq!(transports, 0);
}

#[tokio::test]
async fn test_list_and_count_exclude_incomplete_users() {
    let storage = setup().await;
    let mut tx = storage.begin().await.unwrap();

    let with_email = create_user(&storage, &mut tx, 0).await;
    add_email(&storage, &mut tx, with_email.id, "jane@example.com", true).await;
    let with_username = create_user(&storage, &mut tx, 1).await;
    add_username(&storage, &mut tx, with_username.id, "john").await;
    let bare = create_user(&storage, &mut tx, 2).await;

    let listed = storage
        .user()
        .list(&mut tx, &UserListQuery::default())
        .await
        .unwrap();
    let ids: Vec<_> = listed.iter().map(|u| u.id).collect();
    assert_eq!(ids, vec![with_email.id, with_username.id]);
    assert!(listed.iter().all(|u| u.is_complete()));

    let count = storage
        .user()
        .count(&mut tx, &UserFilter::default())
        .await
        .unwrap();
    assert_eq!(count, 2);

    let all = storage.user().all(&mut tx).await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.iter().any(|u| u.id == bare.id));
}

#[tokio::test]
async fn test_list_user_with_many_emails_appears_once() {
    let storage = setup().await;
    let mut tx = storage.begin().await.unwrap();

    let user = create_user(&storage, &mut tx, 0).await;
    add_email(&storage, &mut tx, user.id, "one@example.com", true).await;
    add_email(&storage, &mut tx, user.id, "two@example.com", false).await;
    add_username(&storage, &mut tx, user.id, "jane").await;

    let listed = storage
        .user()
        .list(&mut tx, &UserListQuery::default())
        .await
        .unwrap();

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].emails.len(), 2);
    assert_eq!(
        storage
            .user()
            .count(&mut tx, &UserFilter::default())
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_list_filters() {
    let storage = setup().await;
    let mut tx = storage.begin().await.unwrap();

    let jane = create_user(&storage, &mut tx, 0).await;
    add_email(&storage, &mut tx, jane.id, "jane@example.com", true).await;
    let john = create_user(&storage, &mut tx, 1).await;
    add_username(&storage, &mut tx, john.id, "johnny").await;
    let other = create_user(&storage, &mut tx, 2).await;
    add_email(&storage, &mut tx, other.id, "other@corp.io", true).await;

    let ids = |users: Vec<keystone_core::User>| users.into_iter().map(|u| u.id).collect::<Vec<_>>();

    let by_email = UserListQuery::default().filter(UserFilter::new().with_email("example"));
    assert_eq!(
        ids(storage.user().list(&mut tx, &by_email).await.unwrap()),
        vec![jane.id]
    );

    let by_username = UserListQuery::default().filter(UserFilter::new().with_username("john"));
    assert_eq!(
        ids(storage.user().list(&mut tx, &by_username).await.unwrap()),
        vec![john.id]
    );

    let either = UserFilter::new().with_email("example").with_username("john");
    assert_eq!(
        ids(storage
            .user()
            .list(&mut tx, &UserListQuery::default().filter(either.clone()))
            .await
            .unwrap()),
        vec![jane.id, john.id]
    );
    assert_eq!(storage.user().count(&mut tx, &either).await.unwrap(), 2);

    let restricted = either.with_user_ids(vec![john.id, other.id]);
    assert_eq!(
        ids(storage
            .user()
            .list(&mut tx, &UserListQuery::default().filter(restricted.clone()))
            .await
            .unwrap()),
        vec![john.id]
    );
    assert_eq!(storage.user().count(&mut tx, &restricted).await.unwrap(), 1);
}

#[tokio::test]
async fn test_list_filter_matches_wildcards_literally() {
    let storage = setup().await;
    let mut tx = storage.begin().await.unwrap();

    let underscored = create_user(&storage, &mut tx, 0).await;
    add_email(&storage, &mut tx, underscored.id, "a_b@example.com", true).await;
    let plain = create_user(&storage, &mut tx, 1).await;
    add_email(&storage, &mut tx, plain.id, "axb@example.com", true).await;

    let filter = UserFilter::new().with_email("a_b");
    let listed = storage
        .user()
        .list(&mut tx, &UserListQuery::default().filter(filter.clone()))
        .await
        .unwrap();

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, underscored.id);
    assert_eq!(storage.user().count(&mut tx, &filter).await.unwrap(), 1);
}

#[tokio::test]
async fn test_list_pagination_and_sort() {
    let storage = setup().await;
    let mut tx = storage.begin().await.unwrap();

    let mut created = Vec::new();
    for i in 0..5 {
        let user = create_user(&storage, &mut tx, i).await;
        add_email(&storage, &mut tx, user.id, &format!("user{i}@example.com"), true).await;
        created.push(user.id);
    }

    let page = |page, per_page| UserListQuery::default().page(page, per_page);
    let ids = |users: Vec<keystone_core::User>| users.into_iter().map(|u| u.id).collect::<Vec<_>>();

    let first = ids(storage.user().list(&mut tx, &page(1, 2)).await.unwrap());
    assert_eq!(first, created[0..2].to_vec());

    let last = ids(storage.user().list(&mut tx, &page(3, 2)).await.unwrap());
    assert_eq!(last, created[4..5].to_vec());

    let beyond = storage.user().list(&mut tx, &page(4, 2)).await.unwrap();
    assert!(beyond.is_empty());

    let zero_page = ids(storage.user().list(&mut tx, &page(0, 2)).await.unwrap());
    assert_eq!(zero_page, first);

    let empty = storage.user().list(&mut tx, &page(1, 0)).await.unwrap();
    assert!(empty.is_empty());

    let newest_first = ids(storage
        .user()
        .list(&mut tx, &page(1, 5).sort(SortDirection::Desc))
        .await
        .unwrap());
    let mut reversed = created.clone();
    reversed.reverse();
    assert_eq!(newest_first, reversed);

    assert_eq!(
        storage
            .user()
            .count(&mut tx, &UserFilter::default())
            .await
            .unwrap(),
        5
    );
}

#[tokio::test]
async fn test_list_hydration_leaves_out_secrets() {
    let storage = setup().await;
    let mut tx = storage.begin().await.unwrap();

    let user = create_user(&storage, &mut tx, 0).await;
    let email = add_email(&storage, &mut tx, user.id, "jane@example.com", true).await;
    make_primary(&storage, &mut tx, &email).await;
    add_identity(&mut tx, &email, "github").await;
    add_username(&storage, &mut tx, user.id, "jane").await;
    add_webauthn_credential(&mut tx, user.id, "cred-1", false, &["internal"]).await;
    add_password(&mut tx, user.id).await;
    add_otp_secret(&mut tx, user.id).await;
    add_metadata(&mut tx, user.id, "{}").await;

    let listed = storage
        .user()
        .list(&mut tx, &UserListQuery::default())
        .await
        .unwrap();
    let listed = &listed[0];
    assert!(listed.primary_email().is_some());
    assert!(listed.username.is_some());
    assert_eq!(listed.webauthn_credentials[0].transports.len(), 1);
    assert!(listed.emails[0].identities.is_empty());
    assert!(listed.password_credential.is_none());
    assert!(listed.otp_secret.is_none());
    assert!(listed.metadata.is_none());

    let all = storage.user().all(&mut tx).await.unwrap();
    let exported = &all[0];
    assert_eq!(exported.emails[0].identities.len(), 1);
    assert!(exported.primary_email().is_some());
    assert!(exported.password_credential.is_none());
    assert!(exported.metadata.is_none());
}
