use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new_v4() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(value.trim()).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }
    };
}

uuid_id!(UserId);
uuid_id!(TeamId);
uuid_id!(StatusId);
uuid_id!(PullRequestId);

/// Lifecycle states a pull request moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrState {
    Open,
    Merged,
}

impl PrState {
    /// Symbolic name used in the status catalog.
    pub fn as_str(self) -> &'static str {
        match self {
            PrState::Open => "OPEN",
            PrState::Merged => "MERGED",
        }
    }

    /// Inverse of [`PrState::as_str`]. Catalog names outside the known states
    /// yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().into_iter().find(|state| state.as_str() == name)
    }

    /// A pull request in a terminal state accepts no further changes.
    pub fn is_terminal(self) -> bool {
        matches!(self, PrState::Merged)
    }

    pub fn all() -> [PrState; 2] {
        [PrState::Open, PrState::Merged]
    }
}

impl fmt::Display for PrState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: UserId, username: impl Into<String>, is_active: bool) -> Self {
        let now = Utc::now();
        Self {
            id,
            username: username.into(),
            is_active,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    /// Member ids; order carries no meaning.
    pub members: Vec<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Team {
    pub fn new(name: impl Into<String>, members: Vec<UserId>) -> Self {
        let now = Utc::now();
        Self {
            id: TeamId::new_v4(),
            name: name.into(),
            members,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_member(&self, user_id: UserId) -> bool {
        self.members.contains(&user_id)
    }
}

/// Entry of the status catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub id: StatusId,
    pub name: String,
}

impl Status {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: StatusId::new_v4(),
            name: name.into(),
        }
    }

    /// The OPEN and MERGED entries every store starts with.
    pub fn default_catalog() -> Vec<Status> {
        PrState::all()
            .into_iter()
            .map(|state| Status::new(state.as_str()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: PullRequestId,
    pub title: String,
    pub author_id: UserId,
    pub status_id: StatusId,
    pub merged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Currently assigned reviewers. Slots are replaced in place on reassignment.
    pub reviewers: Vec<UserId>,
    /// Bumped on every successful update; stores reject stale writes.
    pub version: u64,
}

impl PullRequest {
    pub fn open(
        id: PullRequestId,
        title: impl Into<String>,
        author_id: UserId,
        status_id: StatusId,
        reviewers: Vec<UserId>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: title.into(),
            author_id,
            status_id,
            merged_at: None,
            created_at: now,
            updated_at: now,
            reviewers,
            version: 0,
        }
    }

    pub fn is_reviewer(&self, user_id: UserId) -> bool {
        self.reviewers.contains(&user_id)
    }

    pub fn reviewer_slot(&self, user_id: UserId) -> Option<usize> {
        self.reviewers.iter().position(|id| *id == user_id)
    }
}

/// A pull request together with the symbolic name of its status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestView {
    pub pull_request: PullRequest,
    pub status: String,
}

/// Result of replacing one reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reassignment {
    pub pull_request: PullRequestView,
    pub replaced_by: UserId,
}

/// One row of "what is this user reviewing".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewSummary {
    pub pull_request_id: PullRequestId,
    pub title: String,
    pub author_id: UserId,
    /// Empty when the status row could not be found.
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub user_id: UserId,
    pub username: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamView {
    pub team_name: String,
    pub members: Vec<TeamMember>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserView {
    pub user_id: UserId,
    pub username: String,
    /// Empty when the user belongs to no team.
    pub team_name: String,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_parse_and_display() {
        let raw = "6f2c1f0e-6a4b-4d1e-9a43-2b8f0d6c1a77";
        let id: UserId = raw.parse().unwrap();
        assert_eq!(id.to_string(), raw);
        assert!("not-a-uuid".parse::<PullRequestId>().is_err());
    }

    #[test]
    fn test_pr_state_names() {
        assert_eq!(PrState::Open.as_str(), "OPEN");
        assert_eq!(PrState::Merged.to_string(), "MERGED");
        assert!(PrState::Merged.is_terminal());
        assert!(!PrState::Open.is_terminal());
        assert_eq!(PrState::from_name("MERGED"), Some(PrState::Merged));
        assert_eq!(PrState::from_name("merged"), None);
    }

    #[test]
    fn test_default_catalog_has_open_and_merged() {
        let names: Vec<String> = Status::default_catalog()
            .into_iter()
            .map(|status| status.name)
            .collect();
        assert_eq!(names, vec!["OPEN".to_string(), "MERGED".to_string()]);
    }

    #[test]
    fn test_reviewer_slot() {
        let a = UserId::new_v4();
        let b = UserId::new_v4();
        let c = UserId::new_v4();
        let pr = PullRequest::open(
            PullRequestId::new_v4(),
            "title",
            a,
            StatusId::new_v4(),
            vec![b, c],
        );

        assert_eq!(pr.reviewer_slot(c), Some(1));
        assert_eq!(pr.reviewer_slot(a), None);
        assert!(pr.merged_at.is_none());
        assert_eq!(pr.version, 0);
    }
}
