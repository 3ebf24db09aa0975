//! SQLite directory store.
//!
//! Multi-row writes (a pull request with its reviewers, a team with its
//! members) run inside one transaction, so a failed sub-write leaves nothing
//! visible. Pull request updates are compare-and-swap on the `version` column.

pub mod pool;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};
use uuid::Uuid;

use crate::domain::model::{
    PrState, PullRequest, PullRequestId, Status, StatusId, Team, TeamId, User, UserId,
};
use crate::domain::ports::{
    PullRequestRepository, StatusRepository, StoreResult, TeamRepository, UserRepository,
};
use crate::utils::error::{Entity, StoreError};
use pool::DbPool;

const INITIAL_SCHEMA: &str = include_str!("migrations/0001_initial_schema.sql");

const SELECT_PULL_REQUEST: &str =
    "SELECT id, title, author_id, status_id, merged_at, created_at, updated_at, version \
     FROM pull_requests";

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId(row.id),
            username: row.username,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct TeamRow {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct StatusRow {
    id: Uuid,
    name: String,
}

impl From<StatusRow> for Status {
    fn from(row: StatusRow) -> Self {
        Self {
            id: StatusId(row.id),
            name: row.name,
        }
    }
}

#[derive(Debug, FromRow)]
struct PullRequestRow {
    id: Uuid,
    title: String,
    author_id: Uuid,
    status_id: Uuid,
    merged_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl PullRequestRow {
    fn into_pull_request(self, reviewers: Vec<UserId>) -> PullRequest {
        PullRequest {
            id: PullRequestId(self.id),
            title: self.title,
            author_id: UserId(self.author_id),
            status_id: StatusId(self.status_id),
            merged_at: self.merged_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            reviewers,
            version: self.version.max(0) as u64,
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    /// Opens the database at `db_path`, applying migrations and seeding the
    /// status catalog.
    pub async fn open(db_path: &Path) -> StoreResult<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
                message: format!("failed to create database directory: {e}"),
            })?;
        }

        let pool = pool::create_pool(db_path).await?;
        let store = Self { pool };
        store.migrate().await?;
        tracing::info!(path = %db_path.display(), "Opened SQLite directory store");
        Ok(store)
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn migrate(&self) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                applied_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            )
            "#,
        )
        .execute(&mut *conn)
        .await?;

        let applied: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM _migrations WHERE name = '0001_initial_schema'")
                .fetch_optional(&mut *conn)
                .await?;

        if applied.is_none() {
            for statement in sql_statements(INITIAL_SCHEMA) {
                sqlx::query(&statement).execute(&mut *conn).await?;
            }
            sqlx::query("INSERT INTO _migrations (name) VALUES ('0001_initial_schema')")
                .execute(&mut *conn)
                .await?;
            tracing::debug!("Applied migration 0001_initial_schema");
        }

        for state in PrState::all() {
            sqlx::query("INSERT OR IGNORE INTO pull_request_statuses (id, name) VALUES (?, ?)")
                .bind(Uuid::new_v4())
                .bind(state.as_str())
                .execute(&mut *conn)
                .await?;
        }

        Ok(())
    }

    async fn team_from_row(&self, row: TeamRow) -> StoreResult<Team> {
        let mut conn = self.pool.acquire().await?;
        let members = load_members(&mut conn, row.id).await?;
        Ok(Team {
            id: TeamId(row.id),
            name: row.name,
            members,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    async fn hydrate(&self, rows: Vec<PullRequestRow>) -> StoreResult<Vec<PullRequest>> {
        let mut conn = self.pool.acquire().await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let reviewers = load_reviewers(&mut conn, row.id).await?;
            out.push(row.into_pull_request(reviewers));
        }
        Ok(out)
    }
}

/// Splits a migration script into statements, dropping `--` comments.
fn sql_statements(sql: &str) -> Vec<String> {
    let stripped: String = sql
        .lines()
        .map(|line| match line.find("--") {
            Some(idx) => &line[..idx],
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n");

    stripped
        .split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .map(str::to_string)
        .collect()
}

async fn load_members(conn: &mut SqliteConnection, team_id: Uuid) -> StoreResult<Vec<UserId>> {
    let ids: Vec<Uuid> =
        sqlx::query_scalar("SELECT user_id FROM team_members WHERE team_id = ? ORDER BY position")
            .bind(team_id)
            .fetch_all(&mut *conn)
            .await?;
    Ok(ids.into_iter().map(UserId).collect())
}

async fn replace_members(conn: &mut SqliteConnection, team: &Team) -> StoreResult<()> {
    sqlx::query("DELETE FROM team_members WHERE team_id = ?")
        .bind(team.id.0)
        .execute(&mut *conn)
        .await?;

    for (position, user_id) in team.members.iter().enumerate() {
        // Upserting on user_id moves the user out of any previous team.
        sqlx::query(
            "INSERT INTO team_members (user_id, team_id, position) VALUES (?, ?, ?) \
             ON CONFLICT(user_id) DO UPDATE \
             SET team_id = excluded.team_id, position = excluded.position",
        )
        .bind(user_id.0)
        .bind(team.id.0)
        .bind(position as i64)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn load_reviewers(conn: &mut SqliteConnection, pr_id: Uuid) -> StoreResult<Vec<UserId>> {
    let ids: Vec<Uuid> = sqlx::query_scalar(
        "SELECT reviewer_id FROM pull_request_reviewers \
         WHERE pull_request_id = ? ORDER BY position",
    )
    .bind(pr_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(ids.into_iter().map(UserId).collect())
}

async fn write_reviewers(conn: &mut SqliteConnection, pr: &PullRequest) -> StoreResult<()> {
    sqlx::query("DELETE FROM pull_request_reviewers WHERE pull_request_id = ?")
        .bind(pr.id.0)
        .execute(&mut *conn)
        .await?;

    for (position, reviewer) in pr.reviewers.iter().enumerate() {
        sqlx::query(
            "INSERT INTO pull_request_reviewers \
             (pull_request_id, position, reviewer_id, assigned_at) VALUES (?, ?, ?, ?)",
        )
        .bind(pr.id.0)
        .bind(position as i64)
        .bind(reviewer.0)
        .bind(pr.updated_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl UserRepository for SqliteStore {
    async fn find_user(&self, id: UserId) -> StoreResult<User> {
        sqlx::query_as::<_, UserRow>(
            "SELECT id, username, is_active, created_at, updated_at FROM users WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?
        .map(User::from)
        .ok_or_else(|| StoreError::not_found(Entity::User, id))
    }

    async fn all_users(&self) -> StoreResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, is_active, created_at, updated_at FROM users ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn create_user(&self, user: &User) -> StoreResult<()> {
        let result = sqlx::query(
            "INSERT INTO users (id, username, is_active, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user.id.0)
        .bind(&user.username)
        .bind(user.is_active)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(StoreError::already_exists(Entity::User, user.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update_user(&self, user: &User) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE users SET username = ?, is_active = ?, updated_at = ? WHERE id = ?")
                .bind(&user.username)
                .bind(user.is_active)
                .bind(user.updated_at)
                .bind(user.id.0)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(Entity::User, user.id));
        }
        Ok(())
    }

    async fn delete_user(&self, id: UserId) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM team_members WHERE user_id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(Entity::User, id));
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl TeamRepository for SqliteStore {
    async fn find_team(&self, id: TeamId) -> StoreResult<Team> {
        let row = sqlx::query_as::<_, TeamRow>(
            "SELECT id, name, created_at, updated_at FROM teams WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found(Entity::Team, id))?;
        self.team_from_row(row).await
    }

    async fn find_team_by_name(&self, name: &str) -> StoreResult<Team> {
        let row = sqlx::query_as::<_, TeamRow>(
            "SELECT id, name, created_at, updated_at FROM teams WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found(Entity::Team, name))?;
        self.team_from_row(row).await
    }

    async fn find_team_by_member(&self, user_id: UserId) -> StoreResult<Team> {
        let row = sqlx::query_as::<_, TeamRow>(
            "SELECT t.id, t.name, t.created_at, t.updated_at FROM teams t \
             JOIN team_members m ON m.team_id = t.id WHERE m.user_id = ?",
        )
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found(Entity::Team, format!("member {user_id}")))?;
        self.team_from_row(row).await
    }

    async fn all_teams(&self) -> StoreResult<Vec<Team>> {
        let rows = sqlx::query_as::<_, TeamRow>(
            "SELECT id, name, created_at, updated_at FROM teams ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut teams = Vec::with_capacity(rows.len());
        for row in rows {
            teams.push(self.team_from_row(row).await?);
        }
        Ok(teams)
    }

    async fn create_team(&self, team: &Team) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let inserted =
            sqlx::query("INSERT INTO teams (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)")
                .bind(team.id.0)
                .bind(&team.name)
                .bind(team.created_at)
                .bind(team.updated_at)
                .execute(&mut *tx)
                .await;
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::already_exists(Entity::Team, &team.name))
            }
            Err(e) => return Err(e.into()),
        }
        replace_members(&mut tx, team).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_team(&self, team: &Team) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query("UPDATE teams SET name = ?, updated_at = ? WHERE id = ?")
            .bind(&team.name)
            .bind(team.updated_at)
            .bind(team.id.0)
            .execute(&mut *tx)
            .await;
        match updated {
            Ok(result) if result.rows_affected() == 0 => {
                return Err(StoreError::not_found(Entity::Team, team.id))
            }
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::already_exists(Entity::Team, &team.name))
            }
            Err(e) => return Err(e.into()),
        }
        replace_members(&mut tx, team).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_team(&self, id: TeamId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM teams WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(Entity::Team, id));
        }
        Ok(())
    }
}

#[async_trait]
impl StatusRepository for SqliteStore {
    async fn find_status(&self, id: StatusId) -> StoreResult<Status> {
        sqlx::query_as::<_, StatusRow>("SELECT id, name FROM pull_request_statuses WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .map(Status::from)
            .ok_or_else(|| StoreError::not_found(Entity::Status, id))
    }

    async fn all_statuses(&self) -> StoreResult<Vec<Status>> {
        let rows = sqlx::query_as::<_, StatusRow>(
            "SELECT id, name FROM pull_request_statuses ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Status::from).collect())
    }
}

#[async_trait]
impl PullRequestRepository for SqliteStore {
    async fn create_pull_request(&self, pr: &PullRequest) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO pull_requests \
             (id, title, author_id, status_id, merged_at, created_at, updated_at, version) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(pr.id.0)
        .bind(&pr.title)
        .bind(pr.author_id.0)
        .bind(pr.status_id.0)
        .bind(pr.merged_at)
        .bind(pr.created_at)
        .bind(pr.updated_at)
        .bind(pr.version as i64)
        .execute(&mut *tx)
        .await;
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::already_exists(Entity::PullRequest, pr.id))
            }
            Err(e) => return Err(e.into()),
        }
        // Dropping `tx` on any error below rolls back the insert above.
        write_reviewers(&mut tx, pr).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_pull_request(&self, id: PullRequestId) -> StoreResult<PullRequest> {
        let sql = format!("{SELECT_PULL_REQUEST} WHERE id = ?");
        let row = sqlx::query_as::<_, PullRequestRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found(Entity::PullRequest, id))?;
        let mut hydrated = self.hydrate(vec![row]).await?;
        hydrated
            .pop()
            .ok_or_else(|| StoreError::not_found(Entity::PullRequest, id))
    }

    async fn all_pull_requests(&self) -> StoreResult<Vec<PullRequest>> {
        let sql = format!("{SELECT_PULL_REQUEST} ORDER BY seq");
        let rows = sqlx::query_as::<_, PullRequestRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        self.hydrate(rows).await
    }

    async fn pull_requests_by_author(&self, author_id: UserId) -> StoreResult<Vec<PullRequest>> {
        let rows = sqlx::query_as::<_, PullRequestRow>(&format!(
            "{SELECT_PULL_REQUEST} WHERE author_id = ? ORDER BY seq"
        ))
        .bind(author_id.0)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(rows).await
    }

    async fn pull_requests_by_reviewer(
        &self,
        reviewer_id: UserId,
    ) -> StoreResult<Vec<PullRequest>> {
        let rows = sqlx::query_as::<_, PullRequestRow>(&format!(
            "{SELECT_PULL_REQUEST} WHERE id IN \
             (SELECT pull_request_id FROM pull_request_reviewers WHERE reviewer_id = ?) \
             ORDER BY seq"
        ))
        .bind(reviewer_id.0)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(rows).await
    }

    async fn update_pull_request(
        &self,
        pr: &PullRequest,
        expected_version: u64,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        // Writing first takes the database write lock before anything is read.
        let result = sqlx::query(
            "UPDATE pull_requests SET title = ?, author_id = ?, status_id = ?, merged_at = ?, \
             updated_at = ?, version = ? WHERE id = ? AND version = ?",
        )
        .bind(&pr.title)
        .bind(pr.author_id.0)
        .bind(pr.status_id.0)
        .bind(pr.merged_at)
        .bind(pr.updated_at)
        .bind(pr.version as i64)
        .bind(pr.id.0)
        .bind(expected_version as i64)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let found: Option<i64> =
                sqlx::query_scalar("SELECT version FROM pull_requests WHERE id = ?")
                    .bind(pr.id.0)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match found {
                None => StoreError::not_found(Entity::PullRequest, pr.id),
                Some(found) => StoreError::VersionConflict {
                    id: pr.id.to_string(),
                    expected: expected_version,
                    found: found.max(0) as u64,
                },
            });
        }

        write_reviewers(&mut tx, pr).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_pull_request(&self, id: PullRequestId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM pull_requests WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(Entity::PullRequest, id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sql_statements_skip_comments() {
        let statements = sql_statements(
            "-- header\nCREATE TABLE a (x INTEGER); -- trailing\n\nCREATE TABLE b (y TEXT);\n",
        );
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE a"));
        assert!(statements[1].starts_with("CREATE TABLE b"));
    }

    #[tokio::test]
    async fn test_open_is_idempotent_and_seeds_catalog_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("directory.db");

        let first = SqliteStore::open(&path).await.unwrap();
        let catalog = first.all_statuses().await.unwrap();
        drop(first);

        let second = SqliteStore::open(&path).await.unwrap();
        let reopened = second.all_statuses().await.unwrap();

        let names: Vec<_> = reopened.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["OPEN", "MERGED"]);
        assert_eq!(catalog, reopened);
    }
}
