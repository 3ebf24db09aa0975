//! Team and user administration. Thin delegation to the directory store.

use crate::core::lifecycle::ReviewEngine;
use crate::domain::model::{Team, TeamMember, TeamView, User, UserId, UserView};
use crate::domain::ports::Directory;
use crate::utils::error::{AssignError, Result, StoreError};
use chrono::Utc;

impl<D: Directory> ReviewEngine<D> {
    /// Creates the team `name` or overwrites its member list. Users are created
    /// or updated from the member entries first.
    pub async fn upsert_team(&self, name: &str, members: Vec<TeamMember>) -> Result<TeamView> {
        self.deadline("upsert team", self.upsert_team_inner(name, members))
            .await
    }

    /// Team `name` with its members' current directory entries. Members
    /// missing from the user directory are listed with an empty name, inactive.
    pub async fn get_team(&self, name: &str) -> Result<TeamView> {
        self.deadline("get team", self.get_team_inner(name)).await
    }

    /// Sets the active flag. Existing assignments are left untouched.
    pub async fn set_user_active(&self, user_id: UserId, is_active: bool) -> Result<UserView> {
        self.deadline("set user activity", self.set_user_active_inner(user_id, is_active))
            .await
    }

    async fn upsert_team_inner(&self, name: &str, members: Vec<TeamMember>) -> Result<TeamView> {
        let mut member_ids: Vec<UserId> = Vec::with_capacity(members.len());
        for member in &members {
            self.upsert_user(member).await?;
            if !member_ids.contains(&member.user_id) {
                member_ids.push(member.user_id);
            }
        }

        let store = self.store();
        match store.find_team_by_name(name).await {
            Ok(mut team) => {
                team.members = member_ids;
                team.updated_at = Utc::now();
                store
                    .update_team(&team)
                    .await
                    .map_err(AssignError::store(format!("update team {name}")))?;
                tracing::info!(team = name, members = team.members.len(), "Replaced team members");
            }
            Err(e) if e.is_not_found() => {
                let team = Team::new(name, member_ids);
                match store.create_team(&team).await {
                    Ok(()) => {}
                    Err(StoreError::AlreadyExists { .. }) => {
                        return Err(AssignError::TeamAlreadyExists {
                            team_name: name.to_string(),
                        })
                    }
                    Err(e) => return Err(AssignError::store(format!("create team {name}"))(e)),
                }
                tracing::info!(team = name, members = team.members.len(), "Created team");
            }
            Err(e) => return Err(AssignError::store(format!("look up team {name}"))(e)),
        }

        self.get_team_inner(name).await
    }

    async fn get_team_inner(&self, name: &str) -> Result<TeamView> {
        let team = match self.store().find_team_by_name(name).await {
            Ok(team) => team,
            Err(e) if e.is_not_found() => {
                return Err(AssignError::TeamNotFound {
                    lookup: format!("name {name}"),
                })
            }
            Err(e) => return Err(AssignError::store(format!("look up team {name}"))(e)),
        };

        let mut members = Vec::with_capacity(team.members.len());
        for user_id in team.members {
            let member = match self.store().find_user(user_id).await {
                Ok(user) => TeamMember {
                    user_id,
                    username: user.username,
                    is_active: user.is_active,
                },
                Err(e) if e.is_not_found() => TeamMember {
                    user_id,
                    username: String::new(),
                    is_active: false,
                },
                Err(e) => {
                    let context = format!("load member {user_id} of team {name}");
                    return Err(AssignError::store(context)(e));
                }
            };
            members.push(member);
        }

        Ok(TeamView {
            team_name: team.name,
            members,
        })
    }

    async fn set_user_active_inner(&self, user_id: UserId, is_active: bool) -> Result<UserView> {
        let store = self.store();
        let mut user = match store.find_user(user_id).await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => return Err(AssignError::UserNotFound { user_id }),
            Err(e) => return Err(AssignError::store(format!("load user {user_id}"))(e)),
        };

        user.is_active = is_active;
        user.updated_at = Utc::now();
        store
            .update_user(&user)
            .await
            .map_err(AssignError::store(format!("update user {user_id}")))?;

        let team_name = match store.find_team_by_member(user_id).await {
            Ok(team) => team.name,
            Err(e) if e.is_not_found() => String::new(),
            Err(e) => {
                return Err(AssignError::store(format!("load team of user {user_id}"))(e))
            }
        };

        tracing::info!(user_id = %user_id, is_active, "Updated user activity");
        Ok(UserView {
            user_id,
            username: user.username,
            team_name,
            is_active: user.is_active,
        })
    }

    async fn upsert_user(&self, member: &TeamMember) -> Result<()> {
        let store = self.store();
        match store.find_user(member.user_id).await {
            Ok(mut user) => {
                user.username = member.username.clone();
                user.is_active = member.is_active;
                user.updated_at = Utc::now();
                store
                    .update_user(&user)
                    .await
                    .map_err(AssignError::store(format!("update user {}", member.user_id)))
            }
            Err(e) if e.is_not_found() => store
                .create_user(&User::new(
                    member.user_id,
                    member.username.clone(),
                    member.is_active,
                ))
                .await
                .map_err(AssignError::store(format!("create user {}", member.user_id))),
            Err(e) => Err(AssignError::store(format!("load user {}", member.user_id))(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::adapters::memory::InMemoryStore;
    use crate::core::lifecycle::ReviewEngine;
    use crate::domain::model::{TeamMember, UserId};
    use crate::utils::error::AssignError;
    use std::sync::Arc;

    fn member(id: UserId, name: &str, active: bool) -> TeamMember {
        TeamMember {
            user_id: id,
            username: name.to_string(),
            is_active: active,
        }
    }

    #[tokio::test]
    async fn test_upsert_team_creates_then_overwrites_members() {
        let engine = ReviewEngine::new(Arc::new(InMemoryStore::new()));
        let (a, b, c) = (UserId::new_v4(), UserId::new_v4(), UserId::new_v4());

        let created = engine
            .upsert_team("payments", vec![member(a, "alice", true), member(b, "bob", true)])
            .await
            .unwrap();
        assert_eq!(created.members.len(), 2);

        let replaced = engine
            .upsert_team("payments", vec![member(b, "bobby", false), member(c, "carol", true)])
            .await
            .unwrap();
        let names: Vec<_> = replaced.members.iter().map(|m| m.username.as_str()).collect();
        assert_eq!(names, vec!["bobby", "carol"]);
        assert!(!replaced.members[0].is_active);
    }

    #[tokio::test]
    async fn test_user_moves_between_teams() {
        let engine = ReviewEngine::new(Arc::new(InMemoryStore::new()));
        let a = UserId::new_v4();

        engine.upsert_team("red", vec![member(a, "alice", true)]).await.unwrap();
        engine.upsert_team("blue", vec![member(a, "alice", true)]).await.unwrap();

        let user = engine.set_user_active(a, true).await.unwrap();
        assert_eq!(user.team_name, "blue");
        assert!(engine.get_team("red").await.unwrap().members.is_empty());
    }

    #[tokio::test]
    async fn test_set_user_active_unknown_user() {
        let engine = ReviewEngine::new(Arc::new(InMemoryStore::new()));
        let err = engine.set_user_active(UserId::new_v4(), false).await.unwrap_err();
        assert!(matches!(err, AssignError::UserNotFound { .. }));
    }

    #[tokio::test]
    async fn test_get_team_unknown_name() {
        let engine = ReviewEngine::new(Arc::new(InMemoryStore::new()));
        let err = engine.get_team("ghosts").await.unwrap_err();
        assert!(matches!(err, AssignError::TeamNotFound { .. }));
    }
}
