//! In-memory directory store.
//!
//! All tables sit behind one `RwLock`, so every write (a pull request with its
//! reviewers, a team with its members) is applied atomically. Rows are kept in
//! insertion order. All state is lost on restart.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::model::{
    PullRequest, PullRequestId, Status, StatusId, Team, TeamId, User, UserId,
};
use crate::domain::ports::{
    PullRequestRepository, StatusRepository, StoreResult, TeamRepository, UserRepository,
};
use crate::utils::error::{Entity, StoreError};

#[derive(Debug, Default)]
struct Tables {
    users: Vec<User>,
    teams: Vec<Team>,
    statuses: Vec<Status>,
    pull_requests: Vec<PullRequest>,
}

impl Tables {
    /// Removes `members` from every team except `keep`.
    fn detach_members(&mut self, keep: TeamId, members: &[UserId]) {
        for team in self.teams.iter_mut().filter(|team| team.id != keep) {
            team.members.retain(|id| !members.contains(id));
        }
    }
}

#[derive(Debug)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    /// Successful pull request writes (create, update, delete).
    pr_writes: AtomicU64,
}

impl InMemoryStore {
    /// Store seeded with the default OPEN/MERGED catalog.
    pub fn new() -> Self {
        Self::with_statuses(Status::default_catalog())
    }

    pub fn with_statuses(statuses: Vec<Status>) -> Self {
        Self {
            tables: RwLock::new(Tables {
                statuses,
                ..Tables::default()
            }),
            pr_writes: AtomicU64::new(0),
        }
    }

    pub fn pull_request_writes(&self) -> u64 {
        self.pr_writes.load(Ordering::SeqCst)
    }

    fn record_write(&self) {
        self.pr_writes.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn find_user(&self, id: UserId) -> StoreResult<User> {
        let tables = self.tables.read().await;
        tables
            .users
            .iter()
            .find(|user| user.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(Entity::User, id))
    }

    async fn all_users(&self) -> StoreResult<Vec<User>> {
        Ok(self.tables.read().await.users.clone())
    }

    async fn create_user(&self, user: &User) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.users.iter().any(|existing| existing.id == user.id) {
            return Err(StoreError::already_exists(Entity::User, user.id));
        }
        tables.users.push(user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let existing = tables
            .users
            .iter_mut()
            .find(|existing| existing.id == user.id)
            .ok_or_else(|| StoreError::not_found(Entity::User, user.id))?;
        existing.username = user.username.clone();
        existing.is_active = user.is_active;
        existing.updated_at = user.updated_at;
        Ok(())
    }

    async fn delete_user(&self, id: UserId) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let before = tables.users.len();
        tables.users.retain(|user| user.id != id);
        if tables.users.len() == before {
            return Err(StoreError::not_found(Entity::User, id));
        }
        for team in tables.teams.iter_mut() {
            team.members.retain(|member| *member != id);
        }
        Ok(())
    }
}

#[async_trait]
impl TeamRepository for InMemoryStore {
    async fn find_team(&self, id: TeamId) -> StoreResult<Team> {
        let tables = self.tables.read().await;
        tables
            .teams
            .iter()
            .find(|team| team.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(Entity::Team, id))
    }

    async fn find_team_by_name(&self, name: &str) -> StoreResult<Team> {
        let tables = self.tables.read().await;
        tables
            .teams
            .iter()
            .find(|team| team.name == name)
            .cloned()
            .ok_or_else(|| StoreError::not_found(Entity::Team, name))
    }

    async fn find_team_by_member(&self, user_id: UserId) -> StoreResult<Team> {
        let tables = self.tables.read().await;
        tables
            .teams
            .iter()
            .find(|team| team.has_member(user_id))
            .cloned()
            .ok_or_else(|| StoreError::not_found(Entity::Team, format!("member {user_id}")))
    }

    async fn all_teams(&self) -> StoreResult<Vec<Team>> {
        Ok(self.tables.read().await.teams.clone())
    }

    async fn create_team(&self, team: &Team) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables
            .teams
            .iter()
            .any(|existing| existing.id == team.id || existing.name == team.name)
        {
            return Err(StoreError::already_exists(Entity::Team, &team.name));
        }
        tables.detach_members(team.id, &team.members);
        tables.teams.push(team.clone());
        Ok(())
    }

    async fn update_team(&self, team: &Team) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables
            .teams
            .iter()
            .any(|existing| existing.id != team.id && existing.name == team.name)
        {
            return Err(StoreError::already_exists(Entity::Team, &team.name));
        }
        if !tables.teams.iter().any(|existing| existing.id == team.id) {
            return Err(StoreError::not_found(Entity::Team, team.id));
        }
        tables.detach_members(team.id, &team.members);
        if let Some(existing) = tables.teams.iter_mut().find(|existing| existing.id == team.id) {
            existing.name = team.name.clone();
            existing.members = team.members.clone();
            existing.updated_at = team.updated_at;
        }
        Ok(())
    }

    async fn delete_team(&self, id: TeamId) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let before = tables.teams.len();
        tables.teams.retain(|team| team.id != id);
        if tables.teams.len() == before {
            return Err(StoreError::not_found(Entity::Team, id));
        }
        Ok(())
    }
}

#[async_trait]
impl StatusRepository for InMemoryStore {
    async fn find_status(&self, id: StatusId) -> StoreResult<Status> {
        let tables = self.tables.read().await;
        tables
            .statuses
            .iter()
            .find(|status| status.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(Entity::Status, id))
    }

    async fn all_statuses(&self) -> StoreResult<Vec<Status>> {
        Ok(self.tables.read().await.statuses.clone())
    }
}

#[async_trait]
impl PullRequestRepository for InMemoryStore {
    async fn create_pull_request(&self, pr: &PullRequest) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.pull_requests.iter().any(|existing| existing.id == pr.id) {
            return Err(StoreError::already_exists(Entity::PullRequest, pr.id));
        }
        tables.pull_requests.push(pr.clone());
        self.record_write();
        Ok(())
    }

    async fn find_pull_request(&self, id: PullRequestId) -> StoreResult<PullRequest> {
        let tables = self.tables.read().await;
        tables
            .pull_requests
            .iter()
            .find(|pr| pr.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(Entity::PullRequest, id))
    }

    async fn all_pull_requests(&self) -> StoreResult<Vec<PullRequest>> {
        Ok(self.tables.read().await.pull_requests.clone())
    }

    async fn pull_requests_by_author(&self, author_id: UserId) -> StoreResult<Vec<PullRequest>> {
        let tables = self.tables.read().await;
        Ok(tables
            .pull_requests
            .iter()
            .filter(|pr| pr.author_id == author_id)
            .cloned()
            .collect())
    }

    async fn pull_requests_by_reviewer(
        &self,
        reviewer_id: UserId,
    ) -> StoreResult<Vec<PullRequest>> {
        let tables = self.tables.read().await;
        Ok(tables
            .pull_requests
            .iter()
            .filter(|pr| pr.is_reviewer(reviewer_id))
            .cloned()
            .collect())
    }

    async fn update_pull_request(
        &self,
        pr: &PullRequest,
        expected_version: u64,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let existing = tables
            .pull_requests
            .iter_mut()
            .find(|existing| existing.id == pr.id)
            .ok_or_else(|| StoreError::not_found(Entity::PullRequest, pr.id))?;
        if existing.version != expected_version {
            return Err(StoreError::VersionConflict {
                id: pr.id.to_string(),
                expected: expected_version,
                found: existing.version,
            });
        }
        *existing = pr.clone();
        self.record_write();
        Ok(())
    }

    async fn delete_pull_request(&self, id: PullRequestId) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let before = tables.pull_requests.len();
        tables.pull_requests.retain(|pr| pr.id != id);
        if tables.pull_requests.len() == before {
            return Err(StoreError::not_found(Entity::PullRequest, id));
        }
        self.record_write();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_team_membership_is_exclusive() {
        let store = InMemoryStore::new();
        let a = UserId::new_v4();
        let first = Team::new("first", vec![a]);
        let second = Team::new("second", vec![a]);

        store.create_team(&first).await.unwrap();
        store.create_team(&second).await.unwrap();

        assert_eq!(store.find_team_by_member(a).await.unwrap().name, "second");
        assert!(store.find_team(first.id).await.unwrap().members.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_team_name_rejected() {
        let store = InMemoryStore::new();
        store.create_team(&Team::new("dup", vec![])).await.unwrap();
        let err = store.create_team(&Team::new("dup", vec![])).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { entity: Entity::Team, .. }));
    }

    #[tokio::test]
    async fn test_update_checks_version() {
        let store = InMemoryStore::new();
        let mut pr = PullRequest::open(
            PullRequestId::new_v4(),
            "t",
            UserId::new_v4(),
            StatusId::new_v4(),
            vec![],
        );
        store.create_pull_request(&pr).await.unwrap();

        pr.title = "renamed".to_string();
        pr.version = 1;
        store.update_pull_request(&pr, 0).await.unwrap();

        let err = store.update_pull_request(&pr, 0).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { expected: 0, found: 1, .. }));
        assert_eq!(store.pull_request_writes(), 2);
    }

    #[tokio::test]
    async fn test_listing_by_author_and_reviewer() {
        let store = InMemoryStore::new();
        let (a, b, c) = (UserId::new_v4(), UserId::new_v4(), UserId::new_v4());
        let status = StatusId::new_v4();
        let one = PullRequest::open(PullRequestId::new_v4(), "one", a, status, vec![b]);
        let two = PullRequest::open(PullRequestId::new_v4(), "two", c, status, vec![b, a]);
        store.create_pull_request(&one).await.unwrap();
        store.create_pull_request(&two).await.unwrap();

        assert_eq!(store.pull_requests_by_author(a).await.unwrap(), vec![one.clone()]);
        assert_eq!(store.pull_requests_by_reviewer(b).await.unwrap(), vec![one, two.clone()]);
        assert_eq!(store.pull_requests_by_reviewer(a).await.unwrap(), vec![two]);

        store.delete_pull_request(PullRequestId::new_v4()).await.unwrap_err();
    }
}
