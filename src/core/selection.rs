//! Reviewer selection.
//!
//! Pure functions over a team. The only source of variation is
//! the generator passed in by the caller, so a seeded generator gives fully
//! reproducible picks.

use crate::domain::model::{Team, UserId};
use crate::utils::error::{AssignError, Result};
use rand::seq::SliceRandom;
use rand::Rng;

/// Upper bound on reviewers assigned when a pull request is created.
pub const MAX_INITIAL_REVIEWERS: usize = 2;

/// Members other than the author (and anyone in `excluded`) that pass
/// `is_active`, deduplicated, in team order.
fn eligible<F>(
    team_members: &[UserId],
    author: UserId,
    excluded: &[UserId],
    is_active: F,
) -> Vec<UserId>
where
    F: Fn(UserId) -> bool,
{
    let mut out: Vec<UserId> = Vec::with_capacity(team_members.len());
    for &member in team_members {
        if member == author || excluded.contains(&member) || out.contains(&member) {
            continue;
        }
        if is_active(member) {
            out.push(member);
        }
    }
    out
}

/// Picks up to [`MAX_INITIAL_REVIEWERS`] distinct active members, never the author.
///
/// When no more than that many members are eligible, all of them are returned.
pub fn pick_initial_reviewers<R, F>(
    team: &Team,
    author: UserId,
    is_active: F,
    rng: &mut R,
) -> Result<Vec<UserId>>
where
    R: Rng + ?Sized,
    F: Fn(UserId) -> bool,
{
    let candidates = eligible(&team.members, author, &[], is_active);
    if candidates.is_empty() {
        return Err(no_candidates(team));
    }
    if candidates.len() <= MAX_INITIAL_REVIEWERS {
        return Ok(candidates);
    }

    Ok(candidates
        .choose_multiple(rng, MAX_INITIAL_REVIEWERS)
        .copied()
        .collect())
}

/// Picks one active member that is neither the author nor already reviewing.
pub fn pick_replacement<R, F>(
    team: &Team,
    author: UserId,
    current_reviewers: &[UserId],
    is_active: F,
    rng: &mut R,
) -> Result<UserId>
where
    R: Rng + ?Sized,
    F: Fn(UserId) -> bool,
{
    let candidates = eligible(&team.members, author, current_reviewers, is_active);
    candidates
        .choose(rng)
        .copied()
        .ok_or_else(|| no_candidates(team))
}

fn no_candidates(team: &Team) -> AssignError {
    AssignError::NoReviewCandidates {
        team: team.name.clone(),
    }
}
