//! Project commands: lifecycle, roles, grants, members.

use std::collections::BTreeSet;

use crate::aggregate::project::{
    GrantAddedPayload, GrantChangedPayload, GrantMemberPayload, GrantMemberRemovedPayload,
    GrantRefPayload, GrantState, MemberPayload, MemberRemovedPayload, ProjectAddedPayload,
    ProjectChangedPayload, ProjectState, RolePayload, RoleRemovedPayload, GRANT_ADDED,
    GRANT_CHANGED, GRANT_DEACTIVATED, GRANT_MEMBER_ADDED, GRANT_MEMBER_CHANGED,
    GRANT_MEMBER_REMOVED, GRANT_REACTIVATED, GRANT_REMOVED, MEMBER_ADDED, MEMBER_CHANGED,
    MEMBER_REMOVED, PROJECT_ADDED, PROJECT_CHANGED, PROJECT_DEACTIVATED, PROJECT_REACTIVATED,
    PROJECT_REMOVED, ROLE_ADDED, ROLE_CHANGED, ROLE_REMOVED,
};
use crate::aggregate::{Aggregate, Project, User};
use crate::domain::validation::{require_max_len, require_non_empty, validate_role_key};
use crate::error::{AppResult, Error};
use crate::event_store::EventCommand;

use super::{CommandContext, Commands};

impl Commands {
    pub async fn add_project(
        &self,
        ctx: &CommandContext,
        org_id: &str,
        name: &str,
        role_assertion: bool,
        role_check: bool,
    ) -> AppResult<String> {
        self.ensure_deadline(ctx)?;
        let name = name.trim();
        require_non_empty(name, "PROJECT-001", "project name")?;
        require_max_len(name, 200, "PROJECT-001", "project name")?;

        self.existing_org(ctx, org_id).await?;

        let project_id = self.next_id();
        let command = EventCommand::new(Project::aggregate_type(), &project_id, PROJECT_ADDED)
            .payload(&ProjectAddedPayload {
                name: name.to_string(),
                role_assertion,
                role_check,
            })?
            .editor(&ctx.editor_user)
            .owner(org_id)
            .expected_version(0);
        self.push(ctx, vec![command]).await?;
        Ok(project_id)
    }

    pub async fn change_project(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        changes: ProjectChangedPayload,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        if let Some(name) = &changes.name {
            require_non_empty(name, "PROJECT-001", "project name")?;
            require_max_len(name, 200, "PROJECT-001", "project name")?;
        }

        self.retrying(|| {
            let changes = changes.clone();
            Box::pin(async move {
                let project = self.existing_project(ctx, project_id).await?;

                let mut effective = changes;
                if effective.name.as_deref() == Some(project.name.as_str()) {
                    effective.name = None;
                }
                if effective.role_assertion == Some(project.role_assertion) {
                    effective.role_assertion = None;
                }
                if effective.role_check == Some(project.role_check) {
                    effective.role_check = None;
                }
                if effective.is_empty() {
                    return Ok(());
                }

                let command =
                    EventCommand::new(Project::aggregate_type(), project_id, PROJECT_CHANGED)
                        .payload(&effective)?
                        .editor(&ctx.editor_user)
                        .owner(&project.stream().resource_owner)
                        .expected_version(project.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    pub async fn deactivate_project(&self, ctx: &CommandContext, project_id: &str) -> AppResult<()> {
        self.project_state_change(ctx, project_id, PROJECT_DEACTIVATED, ProjectState::Active, "active")
            .await
    }

    pub async fn reactivate_project(&self, ctx: &CommandContext, project_id: &str) -> AppResult<()> {
        self.project_state_change(
            ctx,
            project_id,
            PROJECT_REACTIVATED,
            ProjectState::Inactive,
            "inactive",
        )
        .await
    }

    pub async fn remove_project(&self, ctx: &CommandContext, project_id: &str) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let project = self.existing_project(ctx, project_id).await?;
                let command =
                    EventCommand::new(Project::aggregate_type(), project_id, PROJECT_REMOVED)
                        .editor(&ctx.editor_user)
                        .owner(&project.stream().resource_owner)
                        .expected_version(project.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Roles
    // -----------------------------------------------------------------------

    pub async fn add_project_role(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        key: &str,
        display_name: Option<String>,
        group: Option<String>,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        validate_role_key(key)?;

        self.retrying(|| {
            let display_name = display_name.clone();
            let group = group.clone();
            Box::pin(async move {
                let project = self.existing_project(ctx, project_id).await?;
                if project.has_role(key) {
                    return Err(Error::already_exists(
                        "PROJECT-ROLE-002",
                        format!("role key already exists: {key}"),
                    ));
                }
                let command = EventCommand::new(Project::aggregate_type(), project_id, ROLE_ADDED)
                    .payload(&RolePayload {
                        key: key.to_string(),
                        display_name,
                        group,
                    })?
                    .editor(&ctx.editor_user)
                    .owner(&project.stream().resource_owner)
                    .expected_version(project.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    pub async fn change_project_role(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        key: &str,
        display_name: Option<String>,
        group: Option<String>,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            let display_name = display_name.clone();
            let group = group.clone();
            Box::pin(async move {
                let project = self.existing_project(ctx, project_id).await?;
                let current = project.roles.get(key).ok_or_else(|| {
                    Error::not_found("PROJECT-ROLE-003", format!("role not found: {key}"))
                })?;
                if current.display_name == display_name && current.group == group {
                    return Ok(());
                }
                let command = EventCommand::new(Project::aggregate_type(), project_id, ROLE_CHANGED)
                    .payload(&RolePayload {
                        key: key.to_string(),
                        display_name,
                        group,
                    })?
                    .editor(&ctx.editor_user)
                    .owner(&project.stream().resource_owner)
                    .expected_version(project.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    /// Remove a role and cascade it out of every grant that carries it.
    pub async fn remove_project_role(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        key: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let project = self.existing_project(ctx, project_id).await?;
                if !project.has_role(key) {
                    return Err(Error::not_found(
                        "PROJECT-ROLE-003",
                        format!("role not found: {key}"),
                    ));
                }
                let owner = project.stream().resource_owner.clone();

                let mut commands = vec![
                    EventCommand::new(Project::aggregate_type(), project_id, ROLE_REMOVED)
                        .payload(&RoleRemovedPayload {
                            key: key.to_string(),
                        })?
                        .editor(&ctx.editor_user)
                        .owner(&owner)
                        .expected_version(project.version()),
                ];

                for grant in project.grants.values() {
                    if grant.role_keys.iter().any(|k| k == key) {
                        let role_keys: Vec<String> = grant
                            .role_keys
                            .iter()
                            .filter(|k| *k != key)
                            .cloned()
                            .collect();
                        commands.push(
                            EventCommand::new(Project::aggregate_type(), project_id, GRANT_CHANGED)
                                .payload(&GrantChangedPayload {
                                    grant_id: grant.id.clone(),
                                    role_keys,
                                })?
                                .editor(&ctx.editor_user)
                                .owner(&owner),
                        );
                    }
                }

                self.push(ctx, commands).await?;
                Ok(())
            })
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Grants
    // -----------------------------------------------------------------------

    pub async fn add_project_grant(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        granted_org_id: &str,
        role_keys: Vec<String>,
    ) -> AppResult<String> {
        self.ensure_deadline(ctx)?;
        self.existing_org(ctx, granted_org_id).await?;

        let grant_id = self.next_id();
        self.retrying(|| {
            let role_keys = role_keys.clone();
            let grant_id = grant_id.clone();
            Box::pin(async move {
                let project = self.existing_project(ctx, project_id).await?;
                if !project.roles_exist(&role_keys) {
                    return Err(Error::invalid_argument(
                        "PROJECT-GRANT-002",
                        "grant role keys must be project roles",
                    ));
                }
                if project
                    .grants
                    .values()
                    .any(|g| g.granted_org_id == granted_org_id)
                {
                    return Err(Error::already_exists(
                        "PROJECT-GRANT-003",
                        format!("project already granted to org: {granted_org_id}"),
                    ));
                }
                let command = EventCommand::new(Project::aggregate_type(), project_id, GRANT_ADDED)
                    .payload(&GrantAddedPayload {
                        grant_id,
                        granted_org_id: granted_org_id.to_string(),
                        role_keys,
                    })?
                    .editor(&ctx.editor_user)
                    .owner(&project.stream().resource_owner)
                    .expected_version(project.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await?;
        Ok(grant_id)
    }

    pub async fn change_project_grant(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        grant_id: &str,
        role_keys: Vec<String>,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            let role_keys = role_keys.clone();
            Box::pin(async move {
                let project = self.existing_project(ctx, project_id).await?;
                let grant = project.grants.get(grant_id).ok_or_else(|| {
                    Error::not_found("PROJECT-GRANT-001", format!("grant not found: {grant_id}"))
                })?;
                if !project.roles_exist(&role_keys) {
                    return Err(Error::invalid_argument(
                        "PROJECT-GRANT-002",
                        "grant role keys must be project roles",
                    ));
                }
                let current: BTreeSet<&String> = grant.role_keys.iter().collect();
                let wanted: BTreeSet<&String> = role_keys.iter().collect();
                if current == wanted {
                    return Ok(());
                }
                let command =
                    EventCommand::new(Project::aggregate_type(), project_id, GRANT_CHANGED)
                        .payload(&GrantChangedPayload {
                            grant_id: grant_id.to_string(),
                            role_keys,
                        })?
                        .editor(&ctx.editor_user)
                        .owner(&project.stream().resource_owner)
                        .expected_version(project.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    pub async fn deactivate_project_grant(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        grant_id: &str,
    ) -> AppResult<()> {
        self.grant_state_change(ctx, project_id, grant_id, GRANT_DEACTIVATED, GrantState::Active, "active")
            .await
    }

    pub async fn reactivate_project_grant(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        grant_id: &str,
    ) -> AppResult<()> {
        self.grant_state_change(
            ctx,
            project_id,
            grant_id,
            GRANT_REACTIVATED,
            GrantState::Inactive,
            "inactive",
        )
        .await
    }

    pub async fn remove_project_grant(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        grant_id: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let project = self.existing_project(ctx, project_id).await?;
                if !project.grants.contains_key(grant_id) {
                    return Err(Error::not_found(
                        "PROJECT-GRANT-001",
                        format!("grant not found: {grant_id}"),
                    ));
                }
                let command =
                    EventCommand::new(Project::aggregate_type(), project_id, GRANT_REMOVED)
                        .payload(&GrantRefPayload {
                            grant_id: grant_id.to_string(),
                        })?
                        .editor(&ctx.editor_user)
                        .owner(&project.stream().resource_owner)
                        .expected_version(project.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Members
    // -----------------------------------------------------------------------

    pub async fn add_project_member(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        user_id: &str,
        roles: Vec<String>,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        if roles.is_empty() {
            return Err(Error::invalid_argument(
                "PROJECT-MEMBER-001",
                "member roles must not be empty",
            ));
        }
        let user: User = self.load(&ctx.instance_id, user_id).await?;
        if !user.exists() {
            return Err(Error::not_found(
                "USER-002",
                format!("user not found: {user_id}"),
            ));
        }

        self.retrying(|| {
            let roles = roles.clone();
            Box::pin(async move {
                let project = self.existing_project(ctx, project_id).await?;
                if project.members.contains_key(user_id) {
                    return Err(Error::already_exists(
                        "PROJECT-MEMBER-003",
                        "project member already exists",
                    ));
                }
                let command =
                    EventCommand::new(Project::aggregate_type(), project_id, MEMBER_ADDED)
                        .payload(&MemberPayload {
                            user_id: user_id.to_string(),
                            roles,
                        })?
                        .editor(&ctx.editor_user)
                        .owner(&project.stream().resource_owner)
                        .expected_version(project.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    pub async fn change_project_member(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        user_id: &str,
        roles: Vec<String>,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        if roles.is_empty() {
            return Err(Error::invalid_argument(
                "PROJECT-MEMBER-001",
                "member roles must not be empty",
            ));
        }

        self.retrying(|| {
            let roles = roles.clone();
            Box::pin(async move {
                let project = self.existing_project(ctx, project_id).await?;
                let current = project.members.get(user_id).ok_or_else(|| {
                    Error::not_found("PROJECT-MEMBER-002", "project member not found")
                })?;
                if *current == roles {
                    return Ok(());
                }
                let command =
                    EventCommand::new(Project::aggregate_type(), project_id, MEMBER_CHANGED)
                        .payload(&MemberPayload {
                            user_id: user_id.to_string(),
                            roles,
                        })?
                        .editor(&ctx.editor_user)
                        .owner(&project.stream().resource_owner)
                        .expected_version(project.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    pub async fn remove_project_member(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        user_id: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let project = self.existing_project(ctx, project_id).await?;
                if !project.members.contains_key(user_id) {
                    return Err(Error::not_found(
                        "PROJECT-MEMBER-002",
                        "project member not found",
                    ));
                }
                let command =
                    EventCommand::new(Project::aggregate_type(), project_id, MEMBER_REMOVED)
                        .payload(&MemberRemovedPayload {
                            user_id: user_id.to_string(),
                        })?
                        .editor(&ctx.editor_user)
                        .owner(&project.stream().resource_owner)
                        .expected_version(project.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Grant members
    // -----------------------------------------------------------------------

    pub async fn add_project_grant_member(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        grant_id: &str,
        user_id: &str,
        roles: Vec<String>,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        if roles.is_empty() {
            return Err(Error::invalid_argument(
                "PROJECT-GRANT-MEMBER-001",
                "member roles must not be empty",
            ));
        }
        let user: User = self.load(&ctx.instance_id, user_id).await?;
        if !user.exists() {
            return Err(Error::not_found(
                "USER-002",
                format!("user not found: {user_id}"),
            ));
        }

        self.retrying(|| {
            let roles = roles.clone();
            Box::pin(async move {
                let project = self.existing_project(ctx, project_id).await?;
                let grant = project.grants.get(grant_id).ok_or_else(|| {
                    Error::not_found("PROJECT-GRANT-001", format!("grant not found: {grant_id}"))
                })?;
                if !roles.iter().all(|r| grant.role_keys.contains(r)) {
                    return Err(Error::invalid_argument(
                        "PROJECT-GRANT-MEMBER-002",
                        "member roles must be granted roles",
                    ));
                }
                let member_key = (grant_id.to_string(), user_id.to_string());
                if project.grant_members.contains_key(&member_key) {
                    return Err(Error::already_exists(
                        "PROJECT-GRANT-MEMBER-003",
                        "grant member already exists",
                    ));
                }
                let command =
                    EventCommand::new(Project::aggregate_type(), project_id, GRANT_MEMBER_ADDED)
                        .payload(&GrantMemberPayload {
                            grant_id: grant_id.to_string(),
                            user_id: user_id.to_string(),
                            roles,
                        })?
                        .editor(&ctx.editor_user)
                        .owner(&project.stream().resource_owner)
                        .expected_version(project.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    /// Change a grant member's roles; an identical role set emits nothing.
    pub async fn change_project_grant_member(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        grant_id: &str,
        user_id: &str,
        roles: Vec<String>,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        if roles.is_empty() {
            return Err(Error::invalid_argument(
                "PROJECT-GRANT-MEMBER-001",
                "member roles must not be empty",
            ));
        }

        self.retrying(|| {
            let roles = roles.clone();
            Box::pin(async move {
                let project = self.existing_project(ctx, project_id).await?;
                let grant = project.grants.get(grant_id).ok_or_else(|| {
                    Error::not_found("PROJECT-GRANT-001", format!("grant not found: {grant_id}"))
                })?;
                if !roles.iter().all(|r| grant.role_keys.contains(r)) {
                    return Err(Error::invalid_argument(
                        "PROJECT-GRANT-MEMBER-002",
                        "member roles must be granted roles",
                    ));
                }
                let member_key = (grant_id.to_string(), user_id.to_string());
                let current = project.grant_members.get(&member_key).ok_or_else(|| {
                    Error::not_found("PROJECT-GRANT-MEMBER-004", "grant member not found")
                })?;
                let current_set: BTreeSet<&String> = current.iter().collect();
                let wanted_set: BTreeSet<&String> = roles.iter().collect();
                if current_set == wanted_set {
                    return Ok(());
                }
                let command =
                    EventCommand::new(Project::aggregate_type(), project_id, GRANT_MEMBER_CHANGED)
                        .payload(&GrantMemberPayload {
                            grant_id: grant_id.to_string(),
                            user_id: user_id.to_string(),
                            roles,
                        })?
                        .editor(&ctx.editor_user)
                        .owner(&project.stream().resource_owner)
                        .expected_version(project.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    pub async fn remove_project_grant_member(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        grant_id: &str,
        user_id: &str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let project = self.existing_project(ctx, project_id).await?;
                let member_key = (grant_id.to_string(), user_id.to_string());
                if !project.grant_members.contains_key(&member_key) {
                    return Err(Error::not_found(
                        "PROJECT-GRANT-MEMBER-004",
                        "grant member not found",
                    ));
                }
                let command =
                    EventCommand::new(Project::aggregate_type(), project_id, GRANT_MEMBER_REMOVED)
                        .payload(&GrantMemberRemovedPayload {
                            grant_id: grant_id.to_string(),
                            user_id: user_id.to_string(),
                        })?
                        .editor(&ctx.editor_user)
                        .owner(&project.stream().resource_owner)
                        .expected_version(project.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    async fn grant_state_change(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        grant_id: &str,
        event_type: &'static str,
        required: GrantState,
        required_name: &'static str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let project = self.existing_project(ctx, project_id).await?;
                let grant = project.grants.get(grant_id).ok_or_else(|| {
                    Error::not_found("PROJECT-GRANT-001", format!("grant not found: {grant_id}"))
                })?;
                if grant.state != required {
                    return Err(Error::failed_precondition(
                        "PROJECT-GRANT-004",
                        format!("grant is not {required_name}"),
                    ));
                }
                let command = EventCommand::new(Project::aggregate_type(), project_id, event_type)
                    .payload(&GrantRefPayload {
                        grant_id: grant_id.to_string(),
                    })?
                    .editor(&ctx.editor_user)
                    .owner(&project.stream().resource_owner)
                    .expected_version(project.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    async fn project_state_change(
        &self,
        ctx: &CommandContext,
        project_id: &str,
        event_type: &'static str,
        required: ProjectState,
        required_name: &'static str,
    ) -> AppResult<()> {
        self.ensure_deadline(ctx)?;
        self.retrying(|| {
            Box::pin(async move {
                let project = self.existing_project(ctx, project_id).await?;
                if project.state != required {
                    return Err(Error::failed_precondition(
                        "PROJECT-003",
                        format!("project is not {required_name}"),
                    ));
                }
                let command = EventCommand::new(Project::aggregate_type(), project_id, event_type)
                    .editor(&ctx.editor_user)
                    .owner(&project.stream().resource_owner)
                    .expected_version(project.version());
                self.push(ctx, vec![command]).await?;
                Ok(())
            })
        })
        .await
    }

    /// Load a project that must exist and not be removed.
    pub(crate) async fn existing_project(
        &self,
        ctx: &CommandContext,
        project_id: &str,
    ) -> AppResult<Project> {
        let project: Project = self.load(&ctx.instance_id, project_id).await?;
        if !project.exists() || project.state == ProjectState::Removed {
            return Err(Error::not_found(
                "PROJECT-002",
                format!("project not found: {project_id}"),
            ));
        }
        Ok(project)
    }
}
