//! Read-only views over the pull request store.

use crate::core::lifecycle::ReviewEngine;
use crate::domain::model::{ReviewSummary, StatusId, UserId};
use crate::domain::ports::Directory;
use crate::utils::error::{AssignError, Result};
use std::collections::HashMap;

impl<D: Directory> ReviewEngine<D> {
    /// Pull requests that currently list `user_id` as a reviewer.
    ///
    /// Results follow the store's listing order, which is creation order for
    /// the bundled stores; other stores may not guarantee a stable order.
    /// A pull request whose status row is missing is reported with an empty
    /// status name instead of failing the whole query.
    pub async fn find_by_reviewer(&self, user_id: UserId) -> Result<Vec<ReviewSummary>> {
        self.deadline("find reviews", self.find_by_reviewer_inner(user_id))
            .await
    }

    async fn find_by_reviewer_inner(&self, user_id: UserId) -> Result<Vec<ReviewSummary>> {
        let all = self
            .store()
            .all_pull_requests()
            .await
            .map_err(AssignError::store(format!(
                "list pull requests for reviewer {user_id}"
            )))?;

        let mut names: HashMap<StatusId, String> = HashMap::new();
        let mut reviews = Vec::new();
        for pr in all.into_iter().filter(|pr| pr.is_reviewer(user_id)) {
            let status = match names.get(&pr.status_id) {
                Some(name) => name.clone(),
                None => {
                    let name = self.status_name(pr.status_id).await?;
                    names.insert(pr.status_id, name.clone());
                    name
                }
            };
            reviews.push(ReviewSummary {
                pull_request_id: pr.id,
                title: pr.title,
                author_id: pr.author_id,
                status,
            });
        }

        tracing::debug!(user_id = %user_id, count = reviews.len(), "Listed reviews");
        Ok(reviews)
    }
}
