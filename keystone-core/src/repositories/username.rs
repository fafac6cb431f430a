use crate::{Error, UserId, Username};
use async_trait::async_trait;

/// Repository for usernames
#[async_trait]
pub trait UsernameRepository: Send + Sync + 'static {
    type Tx: Send;

    async fn find_by_user_id(
        &self,
        tx: &mut Self::Tx,
        user_id: &UserId,
    ) -> Result<Option<Username>, Error>;

    async fn create(&self, tx: &mut Self::Tx, username: &Username) -> Result<(), Error>;
}
