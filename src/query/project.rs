//! Project, role, grant and member reads

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::AppResult;

use super::Queries;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProjectRow {
    pub id: String,
    pub instance_id: String,
    pub resource_owner: String,
    pub name: String,
    pub state: String,
    pub project_role_assertion: bool,
    pub project_role_check: bool,
    pub creation_date: Option<DateTime<Utc>>,
    pub change_date: Option<DateTime<Utc>>,
    pub position: Decimal,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProjectRoleRow {
    pub project_id: String,
    pub role_key: String,
    pub display_name: Option<String>,
    pub role_group: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProjectGrantRow {
    pub id: String,
    pub project_id: String,
    pub granted_org_id: String,
    pub role_keys: Vec<String>,
    pub state: String,
    pub resource_owner: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MemberRow {
    pub member_type: String,
    pub aggregate_id: String,
    pub object_id: String,
    pub user_id: String,
    pub roles: Vec<String>,
    pub resource_owner: String,
}

impl Queries {
    pub async fn project_by_id(
        &self,
        instance_id: &str,
        project_id: &str,
    ) -> AppResult<Option<ProjectRow>> {
        let project = sqlx::query_as(
            r#"
            SELECT id, instance_id, resource_owner, name, state,
                   project_role_assertion, project_role_check,
                   creation_date, change_date, position
            FROM projects_projection
            WHERE instance_id = $1 AND id = $2
            "#,
        )
        .bind(instance_id)
        .bind(project_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(project)
    }

    pub async fn roles_by_project(
        &self,
        instance_id: &str,
        project_id: &str,
    ) -> AppResult<Vec<ProjectRoleRow>> {
        let roles = sqlx::query_as(
            r#"
            SELECT project_id, role_key, display_name, role_group
            FROM project_roles_projection
            WHERE instance_id = $1 AND project_id = $2
            ORDER BY role_key
            "#,
        )
        .bind(instance_id)
        .bind(project_id)
        .fetch_all(self.pool())
        .await?;
        Ok(roles)
    }

    pub async fn grant_by_id(
        &self,
        instance_id: &str,
        grant_id: &str,
    ) -> AppResult<Option<ProjectGrantRow>> {
        let grant = sqlx::query_as(
            r#"
            SELECT id, project_id, granted_org_id, role_keys, state, resource_owner
            FROM project_grants_projection
            WHERE instance_id = $1 AND id = $2
            "#,
        )
        .bind(instance_id)
        .bind(grant_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(grant)
    }

    pub async fn org_member(
        &self,
        instance_id: &str,
        org_id: &str,
        user_id: &str,
    ) -> AppResult<Option<MemberRow>> {
        self.member(instance_id, "org", org_id, "", user_id).await
    }

    pub async fn project_member(
        &self,
        instance_id: &str,
        project_id: &str,
        user_id: &str,
    ) -> AppResult<Option<MemberRow>> {
        self.member(instance_id, "project", project_id, "", user_id)
            .await
    }

    pub async fn project_grant_member(
        &self,
        instance_id: &str,
        project_id: &str,
        grant_id: &str,
        user_id: &str,
    ) -> AppResult<Option<MemberRow>> {
        self.member(instance_id, "project_grant", project_id, grant_id, user_id)
            .await
    }

    /// Every membership of a resource owner (org).
    pub async fn members_by_owner(
        &self,
        instance_id: &str,
        resource_owner: &str,
    ) -> AppResult<Vec<MemberRow>> {
        let members = sqlx::query_as(
            r#"
            SELECT member_type, aggregate_id, object_id, user_id, roles, resource_owner
            FROM members_projection
            WHERE instance_id = $1 AND resource_owner = $2
            ORDER BY member_type, aggregate_id, user_id
            "#,
        )
        .bind(instance_id)
        .bind(resource_owner)
        .fetch_all(self.pool())
        .await?;
        Ok(members)
    }

    async fn member(
        &self,
        instance_id: &str,
        member_type: &str,
        aggregate_id: &str,
        object_id: &str,
        user_id: &str,
    ) -> AppResult<Option<MemberRow>> {
        let member = sqlx::query_as(
            r#"
            SELECT member_type, aggregate_id, object_id, user_id, roles, resource_owner
            FROM members_projection
            WHERE instance_id = $1 AND member_type = $2 AND aggregate_id = $3
              AND object_id = $4 AND user_id = $5
            "#,
        )
        .bind(instance_id)
        .bind(member_type)
        .bind(aggregate_id)
        .bind(object_id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(member)
    }
}
