use crate::domain::model::{PullRequestId, StatusId, UserId};
use std::fmt;
use thiserror::Error;

/// Entity kinds stored behind the directory ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    User,
    Team,
    Status,
    PullRequest,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::User => "user",
            Entity::Team => "team",
            Entity::Status => "status",
            Entity::PullRequest => "pull request",
        };
        f.write_str(name)
    }
}

/// Failures reported by a directory store.
///
/// `NotFound` is a tagged outcome so callers never compare error messages to
/// tell a missing row apart from a broken backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: String },

    #[error("{entity} {id} already exists")]
    AlreadyExists { entity: Entity, id: String },

    #[error("pull request {id} changed concurrently (expected version {expected}, found {found})")]
    VersionConflict { id: String, expected: u64, found: u64 },

    #[cfg(feature = "sqlite")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store backend error: {message}")]
    Backend { message: String },
}

impl StoreError {
    pub fn not_found(entity: Entity, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn already_exists(entity: Entity, id: impl ToString) -> Self {
        Self::AlreadyExists {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

#[derive(Error, Debug)]
pub enum AssignError {
    #[error("author {author_id} not found")]
    AuthorNotFound { author_id: UserId },

    #[error("team not found for {lookup}")]
    TeamNotFound { lookup: String },

    #[error("pull request {pr_id} not found")]
    PullRequestNotFound { pr_id: PullRequestId },

    #[error("user {user_id} not found")]
    UserNotFound { user_id: UserId },

    #[error("status {status_id} not found")]
    StatusNotFound { status_id: StatusId },

    #[error("pull request {pr_id} already exists")]
    PrAlreadyExists { pr_id: PullRequestId },

    #[error("pull request {pr_id} is already merged")]
    PrAlreadyMerged { pr_id: PullRequestId },

    #[error("team {team_name} already exists")]
    TeamAlreadyExists { team_name: String },

    #[error("pull request {pr_id} was modified by a concurrent request")]
    ConcurrentModification { pr_id: PullRequestId },

    #[error("user {user_id} is not a reviewer of pull request {pr_id}")]
    UserNotReviewer {
        user_id: UserId,
        pr_id: PullRequestId,
    },

    #[error("no active reviewers available in team {team}")]
    NoReviewCandidates { team: String },

    #[error("status '{name}' is not configured in the status catalog")]
    StatusNotConfigured { name: String },

    #[error("{context}: {source}")]
    Store {
        context: String,
        #[source]
        source: StoreError,
    },

    #[error("{operation} did not finish within {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AssignError>;

/// Caller-facing classification of an [`AssignError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidState,
    ResourceExhausted,
    Configuration,
    Unexpected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AssignError {
    /// Wraps a store failure with the step that produced it.
    pub fn store(context: impl Into<String>) -> impl FnOnce(StoreError) -> AssignError {
        let context = context.into();
        move |source| AssignError::Store { context, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AssignError::AuthorNotFound { .. }
            | AssignError::TeamNotFound { .. }
            | AssignError::PullRequestNotFound { .. }
            | AssignError::UserNotFound { .. }
            | AssignError::StatusNotFound { .. } => ErrorKind::NotFound,
            AssignError::PrAlreadyExists { .. }
            | AssignError::PrAlreadyMerged { .. }
            | AssignError::TeamAlreadyExists { .. }
            | AssignError::ConcurrentModification { .. } => ErrorKind::Conflict,
            AssignError::UserNotReviewer { .. } => ErrorKind::InvalidState,
            AssignError::NoReviewCandidates { .. } => ErrorKind::ResourceExhausted,
            AssignError::StatusNotConfigured { .. }
            | AssignError::ConfigError { .. }
            | AssignError::InvalidConfigValueError { .. } => ErrorKind::Configuration,
            AssignError::Store { .. } | AssignError::Timeout { .. } | AssignError::IoError(_) => {
                ErrorKind::Unexpected
            }
        }
    }

    /// True for outcomes a caller is expected to handle (everything but
    /// configuration and infrastructure failures).
    pub fn is_expected(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::Configuration | ErrorKind::Unexpected
        )
    }

    /// Stable machine-readable code used by the HTTP boundary.
    pub fn code(&self) -> &'static str {
        match self {
            AssignError::AuthorNotFound { .. } => "AUTHOR_NOT_FOUND",
            AssignError::TeamNotFound { .. } => "TEAM_NOT_FOUND",
            AssignError::PullRequestNotFound { .. } => "PR_NOT_FOUND",
            AssignError::UserNotFound { .. } => "USER_NOT_FOUND",
            AssignError::StatusNotFound { .. } => "STATUS_NOT_FOUND",
            AssignError::PrAlreadyExists { .. } => "PR_EXISTS",
            AssignError::PrAlreadyMerged { .. } => "PR_MERGED",
            AssignError::TeamAlreadyExists { .. } => "TEAM_EXISTS",
            AssignError::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
            AssignError::UserNotReviewer { .. } => "NOT_ASSIGNED",
            AssignError::NoReviewCandidates { .. } => "NO_CANDIDATE",
            AssignError::StatusNotConfigured { .. } => "STATUS_NOT_CONFIGURED",
            AssignError::Store { .. } => "STORE_FAILURE",
            AssignError::Timeout { .. } => "TIMEOUT",
            AssignError::ConfigError { .. } | AssignError::InvalidConfigValueError { .. } => {
                "CONFIG_ERROR"
            }
            AssignError::IoError(_) => "IO_ERROR",
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.kind() {
            ErrorKind::NotFound | ErrorKind::InvalidState => ErrorSeverity::Low,
            ErrorKind::Conflict | ErrorKind::ResourceExhausted => ErrorSeverity::Medium,
            ErrorKind::Configuration => ErrorSeverity::High,
            ErrorKind::Unexpected => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            AssignError::AuthorNotFound { .. } | AssignError::UserNotFound { .. } => {
                "Register the user through /team/add before using it"
            }
            AssignError::TeamNotFound { .. } => "Add the user to a team through /team/add",
            AssignError::PullRequestNotFound { .. } => "Check the pull request identifier",
            AssignError::StatusNotFound { .. } | AssignError::StatusNotConfigured { .. } => {
                "Seed the status catalog with OPEN and MERGED entries"
            }
            AssignError::PrAlreadyExists { .. } => "Use a fresh pull request identifier",
            AssignError::PrAlreadyMerged { .. } => "Merged pull requests can no longer change",
            AssignError::TeamAlreadyExists { .. } => {
                "Retry the request; the team was created concurrently"
            }
            AssignError::ConcurrentModification { .. } => {
                "Re-read the pull request and retry the request"
            }
            AssignError::UserNotReviewer { .. } => {
                "Only a currently assigned reviewer can be reassigned"
            }
            AssignError::NoReviewCandidates { .. } => {
                "Activate more team members or add users to the team"
            }
            AssignError::Store { .. } | AssignError::IoError(_) => {
                "Check that the database is reachable and writable"
            }
            AssignError::Timeout { .. } => "Check database load or raise operation_timeout_ms",
            AssignError::ConfigError { .. } | AssignError::InvalidConfigValueError { .. } => {
                "Fix the configuration file or command-line flags and restart"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.kind() {
            ErrorKind::Unexpected => "An internal error occurred; see the server log".to_string(),
            _ => self.to_string(),
        }
    }
}
