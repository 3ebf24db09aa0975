use crate::domain::model::{
    PullRequest, PullRequestId, Status, StatusId, Team, TeamId, User, UserId,
};
use crate::utils::error::StoreError;
use async_trait::async_trait;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// User directory.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user(&self, id: UserId) -> StoreResult<User>;
    async fn all_users(&self) -> StoreResult<Vec<User>>;
    async fn create_user(&self, user: &User) -> StoreResult<()>;
    /// Overwrites username and active flag.
    async fn update_user(&self, user: &User) -> StoreResult<()>;
    async fn delete_user(&self, id: UserId) -> StoreResult<()>;
}

/// Team directory. A user belongs to at most one team; writing a member list
/// moves its users out of any other team.
#[async_trait]
pub trait TeamRepository: Send + Sync {
    async fn find_team(&self, id: TeamId) -> StoreResult<Team>;
    async fn find_team_by_name(&self, name: &str) -> StoreResult<Team>;
    async fn find_team_by_member(&self, user_id: UserId) -> StoreResult<Team>;
    async fn all_teams(&self) -> StoreResult<Vec<Team>>;
    async fn create_team(&self, team: &Team) -> StoreResult<()>;
    /// Overwrites the name and the full member list.
    async fn update_team(&self, team: &Team) -> StoreResult<()>;
    async fn delete_team(&self, id: TeamId) -> StoreResult<()>;
}

/// Read-only status catalog.
#[async_trait]
pub trait StatusRepository: Send + Sync {
    async fn find_status(&self, id: StatusId) -> StoreResult<Status>;
    async fn all_statuses(&self) -> StoreResult<Vec<Status>>;
}

/// Pull request store. Listing operations return pull requests in creation order.
#[async_trait]
pub trait PullRequestRepository: Send + Sync {
    /// Persists the entity and its reviewer list atomically.
    async fn create_pull_request(&self, pr: &PullRequest) -> StoreResult<()>;
    async fn find_pull_request(&self, id: PullRequestId) -> StoreResult<PullRequest>;
    async fn all_pull_requests(&self) -> StoreResult<Vec<PullRequest>>;
    async fn pull_requests_by_author(&self, author_id: UserId) -> StoreResult<Vec<PullRequest>>;
    async fn pull_requests_by_reviewer(&self, reviewer_id: UserId)
        -> StoreResult<Vec<PullRequest>>;
    /// Full overwrite of `pr`, applied only if the stored version still equals
    /// `expected_version`. Otherwise fails with `StoreError::VersionConflict`.
    async fn update_pull_request(&self, pr: &PullRequest, expected_version: u64)
        -> StoreResult<()>;
    async fn delete_pull_request(&self, id: PullRequestId) -> StoreResult<()>;
}

/// Everything the engine needs from a store.
pub trait Directory: UserRepository + TeamRepository + StatusRepository + PullRequestRepository {}

impl<T> Directory for T where
    T: UserRepository + TeamRepository + StatusRepository + PullRequestRepository
{
}

/// Settings shared by the command-line and file configurations.
pub trait ConfigProvider: Send + Sync {
    fn bind_addr(&self) -> String;
    fn store_backend(&self) -> crate::config::StoreBackend;
    fn database_path(&self) -> &str;
    fn operation_timeout_ms(&self) -> u64;
    fn status_cache(&self) -> bool;
}
