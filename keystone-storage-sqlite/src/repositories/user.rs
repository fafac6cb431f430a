use async_trait::async_trait;
use keystone_core::{
    Error, User, UserId,
    error::StorageError,
    repositories::{UserFilter, UserListQuery, UserRepository},
};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::error::{db_error, insert_error};
use crate::loader::{Hydration, hydrate};
use crate::models::SqliteUser;

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteUserRepository;

impl SqliteUserRepository {
    pub fn new() -> Self {
        Self
    }

    async fn load_one(
        conn: &mut SqliteConnection,
        row: Option<SqliteUser>,
    ) -> Result<Option<User>, Error> {
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(hydrate(conn, vec![row], Hydration::FULL)
            .await?
            .into_iter()
            .next())
    }
}

/// `%term%` with LIKE wildcards in `term` matched literally.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Push the grouped, filtered and completeness-checked user selection.
fn push_filtered_users(builder: &mut QueryBuilder<'_, Sqlite>, columns: &str, filter: &UserFilter) {
    builder.push("SELECT ");
    builder.push(columns);
    builder.push(
        " FROM users \
         LEFT JOIN emails ON emails.user_id = users.id \
         LEFT JOIN usernames ON usernames.user_id = users.id \
         WHERE 1 = 1",
    );

    match (&filter.email, &filter.username) {
        (Some(email), Some(username)) => {
            builder.push(" AND (emails.address LIKE ");
            builder.push_bind(like_pattern(email));
            builder.push(" ESCAPE '\\' OR usernames.username LIKE ");
            builder.push_bind(like_pattern(username));
            builder.push(" ESCAPE '\\')");
        }
        (Some(email), None) => {
            builder.push(" AND emails.address LIKE ");
            builder.push_bind(like_pattern(email));
            builder.push(" ESCAPE '\\'");
        }
        (None, Some(username)) => {
            builder.push(" AND usernames.username LIKE ");
            builder.push_bind(like_pattern(username));
            builder.push(" ESCAPE '\\'");
        }
        (None, None) => {}
    }

    if !filter.user_ids.is_empty() {
        builder.push(" AND users.id IN (");
        let mut separated = builder.separated(", ");
        for id in &filter.user_ids {
            separated.push_bind(id.to_string());
        }
        separated.push_unseparated(")");
    }

    builder.push(
        " GROUP BY users.id \
         HAVING COUNT(emails.id) > 0 OR COUNT(usernames.id) > 0",
    );
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    type Tx = SqliteConnection;

    async fn get(&self, tx: &mut Self::Tx, id: &UserId) -> Result<Option<User>, Error> {
        let row = sqlx::query_as::<_, SqliteUser>("SELECT * FROM users WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error("Failed to fetch user"))?;

        Self::load_one(tx, row).await
    }

    async fn get_by_email_address(
        &self,
        tx: &mut Self::Tx,
        address: &str,
    ) -> Result<Option<User>, Error> {
        let row = sqlx::query_as::<_, SqliteUser>(
            r#"
            SELECT users.* FROM users
            JOIN emails ON emails.user_id = users.id
            WHERE emails.address = ?1
            "#,
        )
        .bind(address)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("Failed to fetch user by email"))?;

        Self::load_one(tx, row).await
    }

    async fn get_by_username(
        &self,
        tx: &mut Self::Tx,
        username: &str,
    ) -> Result<Option<User>, Error> {
        let row = sqlx::query_as::<_, SqliteUser>(
            r#"
            SELECT users.* FROM users
            JOIN usernames ON usernames.user_id = users.id
            WHERE usernames.username = ?1
            "#,
        )
        .bind(username)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("Failed to fetch user by username"))?;

        Self::load_one(tx, row).await
    }

    async fn create(&self, tx: &mut Self::Tx, user: &User) -> Result<(), Error> {
        user.validate()?;

        sqlx::query("INSERT INTO users (id, created_at, updated_at) VALUES (?1, ?2, ?3)")
            .bind(user.id.to_string())
            .bind(user.created_at.timestamp_millis())
            .bind(user.updated_at.timestamp_millis())
            .execute(&mut *tx)
            .await
            .map_err(insert_error("Failed to create user"))?;

        tracing::debug!(user_id = %user.id, "Created user");
        Ok(())
    }

    async fn update(&self, tx: &mut Self::Tx, user: &User) -> Result<(), Error> {
        user.validate()?;

        let result = sqlx::query("UPDATE users SET created_at = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(user.id.to_string())
            .bind(user.created_at.timestamp_millis())
            .bind(user.updated_at.timestamp_millis())
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to update user"))?;

        if result.rows_affected() == 0 {
            return Err(Error::Storage(StorageError::NotFound));
        }

        Ok(())
    }

    async fn delete(&self, tx: &mut Self::Tx, user: &User) -> Result<(), Error> {
        sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(user.id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to delete user"))?;

        tracing::debug!(user_id = %user.id, "Deleted user");
        Ok(())
    }

    async fn list(&self, tx: &mut Self::Tx, query: &UserListQuery) -> Result<Vec<User>, Error> {
        if query.per_page == 0 {
            return Ok(Vec::new());
        }

        let direction = query.sort_direction.as_sql();
        let mut builder = QueryBuilder::<Sqlite>::new("");
        push_filtered_users(&mut builder, "users.*", &query.filter);
        builder.push(format!(
            " ORDER BY users.created_at {direction}, users.id {direction} LIMIT "
        ));
        builder.push_bind(i64::from(query.per_page));
        builder.push(" OFFSET ");
        builder.push_bind(i64::try_from(query.offset()).unwrap_or(i64::MAX));

        let rows = builder
            .build_query_as::<SqliteUser>()
            .fetch_all(&mut *tx)
            .await
            .map_err(db_error("Failed to list users"))?;

        hydrate(tx, rows, Hydration::LISTING).await
    }

    async fn count(&self, tx: &mut Self::Tx, filter: &UserFilter) -> Result<u64, Error> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM (");
        push_filtered_users(&mut builder, "users.id", filter);
        builder.push(")");

        let count = builder
            .build_query_scalar::<i64>()
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error("Failed to count users"))?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn all(&self, tx: &mut Self::Tx) -> Result<Vec<User>, Error> {
        let rows = sqlx::query_as::<_, SqliteUser>(
            "SELECT * FROM users ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error("Failed to fetch all users"))?;

        hydrate(tx, rows, Hydration::ALL_USERS).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("jane"), "%jane%");
        assert_eq!(like_pattern("100%_a\\b"), "%100\\%\\_a\\\\b%");
    }

    #[test]
    fn test_filtered_users_or_and_id_set() {
        let filter = UserFilter::new()
            .with_email("example")
            .with_username("jane")
            .with_user_ids(vec![UserId::new_random(), UserId::new_random()]);
        let mut builder = QueryBuilder::<Sqlite>::new("");
        push_filtered_users(&mut builder, "users.id", &filter);
        let sql = builder.sql();

        assert!(sql.contains("emails.address LIKE ? ESCAPE '\\' OR usernames.username LIKE ?"));
        assert!(sql.contains("users.id IN (?, ?)"));
        assert!(sql.ends_with("HAVING COUNT(emails.id) > 0 OR COUNT(usernames.id) > 0"));
    }

    #[test]
    fn test_filtered_users_without_filter() {
        let mut builder = QueryBuilder::<Sqlite>::new("");
        push_filtered_users(&mut builder, "users.*", &UserFilter::default());
        let sql = builder.sql();

        assert!(!sql.contains("LIKE"));
        assert!(!sql.contains(" IN ("));
    }
}
