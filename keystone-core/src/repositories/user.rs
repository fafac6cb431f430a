use crate::{Error, User, UserId, error::ValidationError};
use async_trait::async_trait;
use std::str::FromStr;

/// Ordering applied to `created_at` when listing users.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

impl FromStr for SortDirection {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            other => Err(ValidationError::InvalidField(format!(
                "sort_direction: expected asc or desc, got {other}"
            ))),
        }
    }
}

/// Filters shared by [`UserRepository::list`] and [`UserRepository::count`].
///
/// When both substrings are set a user matches if either one does. A
/// non-empty `user_ids` restricts the result to those ids on top of that.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub user_ids: Vec<UserId>,
    pub email: Option<String>,
    pub username: Option<String>,
}

impl UserFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_ids(mut self, user_ids: Vec<UserId>) -> Self {
        self.user_ids = user_ids;
        self
    }

    /// Empty strings are treated as no filter.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into()).filter(|s: &String| !s.is_empty());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into()).filter(|s: &String| !s.is_empty());
        self
    }
}

/// One page of [`UserRepository::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserListQuery {
    /// 1-indexed; 0 is read as 1.
    pub page: u32,
    pub per_page: u32,
    pub filter: UserFilter,
    pub sort_direction: SortDirection,
}

impl Default for UserListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
            filter: UserFilter::default(),
            sort_direction: SortDirection::Asc,
        }
    }
}

impl UserListQuery {
    pub fn page(mut self, page: u32, per_page: u32) -> Self {
        self.page = page;
        self.per_page = per_page;
        self
    }

    pub fn filter(mut self, filter: UserFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn sort(mut self, sort_direction: SortDirection) -> Self {
        self.sort_direction = sort_direction;
        self
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.per_page)
    }
}

/// Persistence and queries over the whole [`User`] aggregate.
///
/// All operations run on the caller's open transaction. Lookups return
/// `Ok(None)` for a missing user and reserve `Err` for infrastructure
/// failures.
///
/// # Hydration
///
/// | Operation              | Loaded sub-entities                                                                   |
/// | ---------------------- | ------------------------------------------------------------------------------------- |
/// | `get`, `get_by_*`      | emails, primary link, identities, credentials, transports, username, password, OTP secret, metadata |
/// | `list`                 | emails, primary link, credentials, transports, username                               |
/// | `all`                  | emails, primary link, identities, credentials, transports, username                   |
#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    type Tx: Send;

    async fn get(&self, tx: &mut Self::Tx, id: &UserId) -> Result<Option<User>, Error>;

    /// Resolve through the globally unique email address. Orphaned emails
    /// resolve to `None`.
    async fn get_by_email_address(
        &self,
        tx: &mut Self::Tx,
        address: &str,
    ) -> Result<Option<User>, Error>;

    async fn get_by_username(
        &self,
        tx: &mut Self::Tx,
        username: &str,
    ) -> Result<Option<User>, Error>;

    /// Insert the user row. Sub-entities are written by their own
    /// repositories.
    async fn create(&self, tx: &mut Self::Tx, user: &User) -> Result<(), Error>;

    async fn update(&self, tx: &mut Self::Tx, user: &User) -> Result<(), Error>;

    /// Delete the user and, by cascade, everything it owns.
    async fn delete(&self, tx: &mut Self::Tx, user: &User) -> Result<(), Error>;

    /// Users owning at least one email or username, filtered, sorted by
    /// creation time and paginated.
    async fn list(&self, tx: &mut Self::Tx, query: &UserListQuery) -> Result<Vec<User>, Error>;

    async fn count(&self, tx: &mut Self::Tx, filter: &UserFilter) -> Result<u64, Error>;

    /// Every user, complete or not.
    async fn all(&self, tx: &mut Self::Tx) -> Result<Vec<User>, Error>;
}
