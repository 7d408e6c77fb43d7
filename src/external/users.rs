//! User Directory
//!
//! Read-only lookup into the platform user service. Role resolution and
//! authentication live outside the engine; bidding eligibility is derived
//! from the returned profile.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::errors::CoreResult;
use crate::models::UserProfile;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find(&self, user_id: i64) -> CoreResult<Option<UserProfile>>;
}
