pub mod directory;
pub mod lifecycle;
pub mod query;
pub mod selection;
pub mod status;

pub use crate::domain::model::{PullRequestView, Reassignment, ReviewSummary};
pub use crate::domain::ports::{ConfigProvider, Directory};
pub use crate::utils::error::Result;
pub use lifecycle::ReviewEngine;
