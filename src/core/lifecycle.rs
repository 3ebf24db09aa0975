//! Pull request lifecycle: creation, reviewer reassignment and merge.
//!
//! The engine keeps no domain state of its own. Every operation reads what it
//! needs from the directory store, computes the next entity and writes it back
//! in a single store call. Updates carry the version that was read, so two
//! racing reassignments on the same pull request cannot silently overwrite each
//! other: the loser gets `ConcurrentModification` and nothing is retried here.

use crate::core::selection;
use crate::core::status::StatusResolver;
use crate::domain::model::{
    PrState, PullRequest, PullRequestId, PullRequestView, Reassignment, StatusId, UserId,
};
use crate::domain::ports::Directory;
use crate::utils::error::{AssignError, Result, StoreError};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct ReviewEngine<D: Directory> {
    store: Arc<D>,
    statuses: StatusResolver,
    rng: Mutex<Box<dyn RngCore + Send>>,
    operation_timeout: Option<Duration>,
}

impl<D: Directory> ReviewEngine<D> {
    pub fn new(store: Arc<D>) -> Self {
        Self::with_rng(store, StdRng::from_entropy())
    }

    /// Builds an engine drawing reviewers from `rng`.
    pub fn with_rng(store: Arc<D>, rng: impl RngCore + Send + 'static) -> Self {
        Self {
            store,
            statuses: StatusResolver::new(false),
            rng: Mutex::new(Box::new(rng)),
            operation_timeout: None,
        }
    }

    pub fn with_status_cache(mut self, enabled: bool) -> Self {
        self.statuses = StatusResolver::new(enabled);
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    pub fn store(&self) -> &Arc<D> {
        &self.store
    }

    pub fn statuses(&self) -> &StatusResolver {
        &self.statuses
    }

    /// Creates an OPEN pull request with up to two reviewers from the author's team.
    pub async fn create_pull_request(
        &self,
        pr_id: PullRequestId,
        title: &str,
        author_id: UserId,
    ) -> Result<PullRequestView> {
        self.deadline("create pull request", self.create_inner(pr_id, title, author_id))
            .await
    }

    /// Replaces `user_id` in the reviewer list of `pr_id` with another eligible
    /// member of that user's team.
    pub async fn reassign_reviewer(
        &self,
        user_id: UserId,
        pr_id: PullRequestId,
    ) -> Result<Reassignment> {
        self.deadline("reassign reviewer", self.reassign_inner(user_id, pr_id))
            .await
    }

    /// Moves `pr_id` to MERGED. Merging an already merged pull request returns
    /// it unchanged without writing.
    pub async fn mark_merged(&self, pr_id: PullRequestId) -> Result<PullRequestView> {
        self.deadline("merge pull request", self.merge_inner(pr_id)).await
    }

    async fn create_inner(
        &self,
        pr_id: PullRequestId,
        title: &str,
        author_id: UserId,
    ) -> Result<PullRequestView> {
        match self.store.find_pull_request(pr_id).await {
            Ok(_) => return Err(AssignError::PrAlreadyExists { pr_id }),
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                let context = format!("check for existing pull request {pr_id}");
                return Err(AssignError::store(context)(e));
            }
        }

        match self.store.find_user(author_id).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => return Err(AssignError::AuthorNotFound { author_id }),
            Err(e) => return Err(AssignError::store(format!("load author {author_id}"))(e)),
        }

        let team = match self.store.find_team_by_member(author_id).await {
            Ok(team) => team,
            Err(e) if e.is_not_found() => {
                return Err(AssignError::TeamNotFound {
                    lookup: format!("author {author_id}"),
                })
            }
            Err(e) => {
                return Err(AssignError::store(format!("load team of author {author_id}"))(e))
            }
        };

        let activity = self.activity_of(&team.members, author_id).await?;
        let reviewers = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            selection::pick_initial_reviewers(
                &team,
                author_id,
                |id| activity.get(&id).copied().unwrap_or(false),
                &mut **rng,
            )?
        };

        let open = self
            .statuses
            .resolve(self.store.as_ref(), PrState::Open.as_str())
            .await?;

        let pr = PullRequest::open(pr_id, title, author_id, open, reviewers);
        match self.store.create_pull_request(&pr).await {
            Ok(()) => {}
            Err(StoreError::AlreadyExists { .. }) => {
                return Err(AssignError::PrAlreadyExists { pr_id })
            }
            Err(e) => return Err(AssignError::store(format!("insert pull request {pr_id}"))(e)),
        }

        tracing::info!(
            pr_id = %pr_id,
            author_id = %author_id,
            team = %team.name,
            reviewers = ?pr.reviewers,
            "Created pull request"
        );

        Ok(PullRequestView {
            pull_request: pr,
            status: PrState::Open.as_str().to_string(),
        })
    }

    async fn reassign_inner(&self, user_id: UserId, pr_id: PullRequestId) -> Result<Reassignment> {
        let pr = self.load_pull_request(pr_id).await?;

        match self.statuses.state_of(self.store.as_ref(), pr.status_id).await {
            Ok(Some(state)) if state.is_terminal() => {
                return Err(AssignError::PrAlreadyMerged { pr_id })
            }
            Ok(_) => {}
            Err(AssignError::StatusNotFound { status_id }) => {
                tracing::warn!(
                    pr_id = %pr_id,
                    status_id = %status_id,
                    "Status row missing; treating pull request as not merged"
                );
            }
            Err(e) => return Err(e),
        }

        let slot = pr
            .reviewer_slot(user_id)
            .ok_or(AssignError::UserNotReviewer { user_id, pr_id })?;

        let team = match self.store.find_team_by_member(user_id).await {
            Ok(team) => team,
            Err(e) if e.is_not_found() => {
                return Err(AssignError::TeamNotFound {
                    lookup: format!("reviewer {user_id}"),
                })
            }
            Err(e) => {
                return Err(AssignError::store(format!("load team of reviewer {user_id}"))(e))
            }
        };

        let activity = self.activity_of(&team.members, pr.author_id).await?;
        let replacement = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            selection::pick_replacement(
                &team,
                pr.author_id,
                &pr.reviewers,
                |id| activity.get(&id).copied().unwrap_or(false),
                &mut **rng,
            )?
        };

        let mut updated = pr.clone();
        updated.reviewers[slot] = replacement;
        updated.updated_at = Utc::now();
        updated.version = pr.version + 1;
        self.write_update(&updated, pr.version).await?;

        tracing::info!(
            pr_id = %pr_id,
            replaced = %user_id,
            replaced_by = %replacement,
            "Reassigned reviewer"
        );

        let status = self.status_name(updated.status_id).await?;
        Ok(Reassignment {
            pull_request: PullRequestView {
                pull_request: updated,
                status,
            },
            replaced_by: replacement,
        })
    }

    async fn merge_inner(&self, pr_id: PullRequestId) -> Result<PullRequestView> {
        let pr = self.load_pull_request(pr_id).await?;
        let merged = self
            .statuses
            .resolve(self.store.as_ref(), PrState::Merged.as_str())
            .await?;

        if pr.status_id == merged {
            tracing::debug!(pr_id = %pr_id, "Pull request already merged");
            return Ok(PullRequestView {
                pull_request: pr,
                status: PrState::Merged.as_str().to_string(),
            });
        }

        let now = Utc::now();
        let mut updated = pr.clone();
        updated.status_id = merged;
        updated.merged_at = Some(now);
        updated.updated_at = now;
        updated.version = pr.version + 1;
        self.write_update(&updated, pr.version).await?;

        tracing::info!(pr_id = %pr_id, merged_at = %now, "Merged pull request");

        Ok(PullRequestView {
            pull_request: updated,
            status: PrState::Merged.as_str().to_string(),
        })
    }

    pub(crate) async fn load_pull_request(&self, pr_id: PullRequestId) -> Result<PullRequest> {
        match self.store.find_pull_request(pr_id).await {
            Ok(pr) => Ok(pr),
            Err(e) if e.is_not_found() => Err(AssignError::PullRequestNotFound { pr_id }),
            Err(e) => Err(AssignError::store(format!("load pull request {pr_id}"))(e)),
        }
    }

    pub(crate) async fn status_name(&self, id: StatusId) -> Result<String> {
        Ok(self
            .statuses
            .name_of(self.store.as_ref(), id)
            .await?
            .unwrap_or_default())
    }

    async fn write_update(&self, pr: &PullRequest, expected_version: u64) -> Result<()> {
        match self.store.update_pull_request(pr, expected_version).await {
            Ok(()) => Ok(()),
            Err(StoreError::VersionConflict { .. }) => {
                tracing::warn!(pr_id = %pr.id, "Lost update prevented by version check");
                Err(AssignError::ConcurrentModification { pr_id: pr.id })
            }
            Err(e) if e.is_not_found() => Err(AssignError::PullRequestNotFound { pr_id: pr.id }),
            Err(e) => Err(AssignError::store(format!("update pull request {}", pr.id))(e)),
        }
    }

    /// Active flag of every team member except `author`. Members missing from
    /// the user directory are left out and therefore count as inactive.
    async fn activity_of(
        &self,
        members: &[UserId],
        author: UserId,
    ) -> Result<HashMap<UserId, bool>> {
        let mut activity = HashMap::with_capacity(members.len());
        for &member in members {
            if member == author || activity.contains_key(&member) {
                continue;
            }
            match self.store.find_user(member).await {
                Ok(user) => {
                    activity.insert(member, user.is_active);
                }
                Err(e) if e.is_not_found() => {
                    tracing::debug!(user_id = %member, "Team member missing from user directory");
                }
                Err(e) => return Err(AssignError::store(format!("load team member {member}"))(e)),
            }
        }
        Ok(activity)
    }

    /// Runs `fut` under the configured operation timeout and logs its failure.
    pub(crate) async fn deadline<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let result = match self.operation_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => Err(AssignError::Timeout {
                    operation,
                    timeout_ms: limit.as_millis() as u64,
                }),
            },
            None => fut.await,
        };

        if let Err(e) = &result {
            if e.is_expected() {
                tracing::debug!(operation, error = %e, "Operation rejected");
            } else {
                tracing::error!(operation, error = %e, "Operation failed");
            }
        }
        result
    }
}
