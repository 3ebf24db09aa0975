#![cfg(feature = "sqlite")]

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use reviewer_assign::domain::model::{
    PullRequest, PullRequestId, StatusId, Team, TeamMember, User, UserId,
};
use reviewer_assign::domain::ports::{
    PullRequestRepository, StatusRepository, TeamRepository, UserRepository,
};
use reviewer_assign::utils::error::{AssignError, StoreError};
use reviewer_assign::{ReviewEngine, SqliteStore};
use std::sync::Arc;
use tempfile::TempDir;

async fn open_store() -> Result<(TempDir, SqliteStore)> {
    let dir = TempDir::new()?;
    let store = SqliteStore::open(&dir.path().join("nested").join("reviewers.db")).await?;
    Ok((dir, store))
}

async fn open_status(store: &SqliteStore) -> Result<StatusId> {
    let statuses = store.all_statuses().await?;
    let open = statuses
        .into_iter()
        .find(|status| status.name == "OPEN")
        .ok_or_else(|| anyhow::anyhow!("OPEN status not seeded"))?;
    Ok(open.id)
}

#[tokio::test]
async fn test_status_catalog_is_seeded() -> Result<()> {
    let (_dir, store) = open_store().await?;
    let names: Vec<String> = store.all_statuses().await?.into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["OPEN".to_string(), "MERGED".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_user_round_trip() -> Result<()> {
    let (_dir, store) = open_store().await?;
    let mut user = User::new(UserId::new_v4(), "alice", true);
    store.create_user(&user).await?;

    user.is_active = false;
    store.update_user(&user).await?;

    let loaded = store.find_user(user.id).await?;
    assert_eq!(loaded.username, "alice");
    assert!(!loaded.is_active);

    let err = store.create_user(&user).await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists { .. }));

    store.delete_user(user.id).await?;
    assert!(store.find_user(user.id).await.unwrap_err().is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_failed_reviewer_insert_rolls_back_pull_request() -> Result<()> {
    let (_dir, store) = open_store().await?;
    let status = open_status(&store).await?;
    let reviewer = UserId::new_v4();

    // The same reviewer twice violates UNIQUE (pull_request_id, reviewer_id).
    let pr = PullRequest::open(
        PullRequestId::new_v4(),
        "broken",
        UserId::new_v4(),
        status,
        vec![reviewer, reviewer],
    );

    assert!(store.create_pull_request(&pr).await.is_err());
    assert!(store.find_pull_request(pr.id).await.unwrap_err().is_not_found());
    assert!(store.all_pull_requests().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_pull_request_round_trip_preserves_reviewer_order() -> Result<()> {
    let (_dir, store) = open_store().await?;
    let status = open_status(&store).await?;
    let (author, first, second) = (UserId::new_v4(), UserId::new_v4(), UserId::new_v4());

    let reviewers = vec![second, first];
    let pr = PullRequest::open(PullRequestId::new_v4(), "ordered", author, status, reviewers);
    store.create_pull_request(&pr).await?;

    let loaded = store.find_pull_request(pr.id).await?;
    assert_eq!(loaded.reviewers, vec![second, first]);
    assert_eq!(loaded.title, "ordered");
    assert_eq!(loaded.version, 0);
    assert!(loaded.merged_at.is_none());

    assert_eq!(store.pull_requests_by_reviewer(first).await?.len(), 1);
    assert_eq!(store.pull_requests_by_author(author).await?.len(), 1);

    let err = store.create_pull_request(&pr).await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists { .. }));
    Ok(())
}

#[tokio::test]
async fn test_update_is_compare_and_swap() -> Result<()> {
    let (_dir, store) = open_store().await?;
    let status = open_status(&store).await?;
    let (a, b, c) = (UserId::new_v4(), UserId::new_v4(), UserId::new_v4());

    let pr = PullRequest::open(PullRequestId::new_v4(), "cas", a, status, vec![b]);
    store.create_pull_request(&pr).await?;

    let mut winner = pr.clone();
    winner.reviewers = vec![c];
    winner.version = 1;
    store.update_pull_request(&winner, 0).await?;

    let mut loser = pr.clone();
    loser.title = "stale".to_string();
    loser.version = 1;
    let err = store.update_pull_request(&loser, 0).await.unwrap_err();
    assert!(matches!(err, StoreError::VersionConflict { expected: 0, found: 1, .. }));

    let stored = store.find_pull_request(pr.id).await?;
    assert_eq!(stored.reviewers, vec![c]);
    assert_eq!(stored.title, "cas");

    let missing = PullRequest::open(PullRequestId::new_v4(), "ghost", a, status, vec![]);
    assert!(store.update_pull_request(&missing, 0).await.unwrap_err().is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_team_membership_moves_between_teams() -> Result<()> {
    let (_dir, store) = open_store().await?;
    let (a, b) = (UserId::new_v4(), UserId::new_v4());

    let red = Team::new("red", vec![a, b]);
    store.create_team(&red).await?;
    let blue = Team::new("blue", vec![a]);
    store.create_team(&blue).await?;

    assert_eq!(store.find_team_by_member(a).await?.name, "blue");
    assert_eq!(store.find_team_by_member(b).await?.name, "red");
    assert_eq!(store.find_team(red.id).await?.members, vec![b]);

    let err = store.create_team(&Team::new("red", vec![])).await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists { .. }));

    store.delete_team(red.id).await?;
    assert!(store.find_team_by_member(b).await.unwrap_err().is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_engine_on_sqlite() -> Result<()> {
    let (_dir, store) = open_store().await?;
    let store = Arc::new(store);
    let engine =
        ReviewEngine::with_rng(store.clone(), StdRng::seed_from_u64(9)).with_status_cache(true);
    let (a, b, c) = (UserId::new_v4(), UserId::new_v4(), UserId::new_v4());

    engine
        .upsert_team(
            "T",
            [(a, "A"), (b, "B"), (c, "C")]
                .into_iter()
                .map(|(user_id, name)| TeamMember {
                    user_id,
                    username: name.to_string(),
                    is_active: true,
                })
                .collect(),
        )
        .await?;

    let pr_id = PullRequestId::new_v4();
    let created = engine.create_pull_request(pr_id, "title", a).await?;
    assert_eq!(created.pull_request.reviewers.len(), 2);

    let first = engine.mark_merged(pr_id).await?;
    let second = engine.mark_merged(pr_id).await?;
    assert_eq!(
        first.pull_request.merged_at.map(|t| t.timestamp_millis()),
        second.pull_request.merged_at.map(|t| t.timestamp_millis())
    );
    assert_eq!(second.status, "MERGED");

    let err = engine.reassign_reviewer(b, pr_id).await.unwrap_err();
    assert!(matches!(err, AssignError::PrAlreadyMerged { .. }));

    let for_c = engine.find_by_reviewer(c).await?;
    assert_eq!(for_c.len(), 1);
    assert_eq!(for_c[0].status, "MERGED");
    Ok(())
}
