use async_trait::async_trait;
use keystone_core::{Error, UserId, Username, repositories::UsernameRepository};
use sqlx::SqliteConnection;

use crate::error::db_error;
use crate::models::SqliteUsername;

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteUsernameRepository;

impl SqliteUsernameRepository {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl UsernameRepository for SqliteUsernameRepository {
    type Tx = SqliteConnection;

    async fn find_by_user_id(
        &self,
        tx: &mut Self::Tx,
        user_id: &UserId,
    ) -> Result<Option<Username>, Error> {
        let row = sqlx::query_as::<_, SqliteUsername>("SELECT * FROM usernames WHERE user_id = ?1")
            .bind(user_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error("Failed to fetch username"))?;

        row.map(Username::try_from).transpose()
    }

    async fn create(&self, tx: &mut Self::Tx, username: &Username) -> Result<(), Error> {
        username.validate()?;

        sqlx::query(
            r#"
            INSERT INTO usernames (id, user_id, username, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(username.id.to_string())
        .bind(username.user_id.to_string())
        .bind(&username.username)
        .bind(username.created_at.timestamp_millis())
        .bind(username.updated_at.timestamp_millis())
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to create username"))?;

        Ok(())
    }
}
