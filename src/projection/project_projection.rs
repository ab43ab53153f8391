//! Project read model
//!
//! Maintains `projects_projection`, `project_roles_projection` and
//! `project_grants_projection`.

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};

use crate::aggregate::project::{
    GrantAddedPayload, GrantChangedPayload, GrantRefPayload, ProjectAddedPayload,
    ProjectChangedPayload, RolePayload, RoleRemovedPayload, GRANT_ADDED, GRANT_CHANGED,
    GRANT_DEACTIVATED, GRANT_REACTIVATED, GRANT_REMOVED, PROJECT_ADDED, PROJECT_CHANGED,
    PROJECT_DEACTIVATED, PROJECT_REACTIVATED, PROJECT_REMOVED, ROLE_ADDED, ROLE_CHANGED,
    ROLE_REMOVED,
};
use crate::error::AppResult;
use crate::event_store::Event;

use super::Projection;

pub struct ProjectProjection;

impl ProjectProjection {
    async fn set_project_state(
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
        state: &str,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE projects_projection
            SET state = $3, change_date = $4, position = $5
            WHERE instance_id = $1 AND id = $2
            "#,
        )
        .bind(&event.instance_id)
        .bind(&event.aggregate_id)
        .bind(state)
        .bind(event.creation_date)
        .bind(event.position)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn set_grant_state(
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
        grant_id: &str,
        state: &str,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE project_grants_projection
            SET state = $3, change_date = $4, position = $5
            WHERE instance_id = $1 AND id = $2
            "#,
        )
        .bind(&event.instance_id)
        .bind(grant_id)
        .bind(state)
        .bind(event.creation_date)
        .bind(event.position)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Projection for ProjectProjection {
    fn name(&self) -> &'static str {
        "projects"
    }

    fn interests(&self) -> &'static [&'static str] {
        &[
            PROJECT_ADDED,
            PROJECT_CHANGED,
            PROJECT_DEACTIVATED,
            PROJECT_REACTIVATED,
            PROJECT_REMOVED,
            ROLE_ADDED,
            ROLE_CHANGED,
            ROLE_REMOVED,
            GRANT_ADDED,
            GRANT_CHANGED,
            GRANT_DEACTIVATED,
            GRANT_REACTIVATED,
            GRANT_REMOVED,
        ]
    }

    async fn apply(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
    ) -> AppResult<()> {
        match event.event_type.as_str() {
            PROJECT_ADDED => {
                let payload: ProjectAddedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    INSERT INTO projects_projection
                        (id, instance_id, resource_owner, name, state,
                         project_role_assertion, project_role_check,
                         creation_date, change_date, position)
                    VALUES ($1, $2, $3, $4, 'active', $5, $6, $7, $7, $8)
                    ON CONFLICT (instance_id, id) DO UPDATE
                    SET name = EXCLUDED.name,
                        state = EXCLUDED.state,
                        change_date = EXCLUDED.change_date,
                        position = EXCLUDED.position
                    "#,
                )
                .bind(&event.aggregate_id)
                .bind(&event.instance_id)
                .bind(&event.resource_owner)
                .bind(&payload.name)
                .bind(payload.role_assertion)
                .bind(payload.role_check)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            PROJECT_CHANGED => {
                let payload: ProjectChangedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    UPDATE projects_projection
                    SET name = COALESCE($3, name),
                        project_role_assertion = COALESCE($4, project_role_assertion),
                        project_role_check = COALESCE($5, project_role_check),
                        change_date = $6,
                        position = $7
                    WHERE instance_id = $1 AND id = $2
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(&payload.name)
                .bind(payload.role_assertion)
                .bind(payload.role_check)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            PROJECT_DEACTIVATED => Self::set_project_state(tx, event, "inactive").await?,
            PROJECT_REACTIVATED => Self::set_project_state(tx, event, "active").await?,
            PROJECT_REMOVED => {
                sqlx::query("DELETE FROM projects_projection WHERE instance_id = $1 AND id = $2")
                    .bind(&event.instance_id)
                    .bind(&event.aggregate_id)
                    .execute(&mut **tx)
                    .await?;
                sqlx::query(
                    "DELETE FROM project_roles_projection WHERE instance_id = $1 AND project_id = $2",
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .execute(&mut **tx)
                .await?;
                sqlx::query(
                    "DELETE FROM project_grants_projection WHERE instance_id = $1 AND project_id = $2",
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .execute(&mut **tx)
                .await?;
            }
            ROLE_ADDED | ROLE_CHANGED => {
                let payload: RolePayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    INSERT INTO project_roles_projection
                        (instance_id, project_id, role_key, display_name, role_group, change_date, position)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    ON CONFLICT (instance_id, project_id, role_key) DO UPDATE
                    SET display_name = EXCLUDED.display_name,
                        role_group = EXCLUDED.role_group,
                        change_date = EXCLUDED.change_date,
                        position = EXCLUDED.position
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(&payload.key)
                .bind(&payload.display_name)
                .bind(&payload.group)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            ROLE_REMOVED => {
                let payload: RoleRemovedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    DELETE FROM project_roles_projection
                    WHERE instance_id = $1 AND project_id = $2 AND role_key = $3
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(&payload.key)
                .execute(&mut **tx)
                .await?;
            }
            GRANT_ADDED => {
                let payload: GrantAddedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    INSERT INTO project_grants_projection
                        (id, instance_id, project_id, granted_org_id, role_keys, state,
                         resource_owner, change_date, position)
                    VALUES ($1, $2, $3, $4, $5, 'active', $6, $7, $8)
                    ON CONFLICT (instance_id, id) DO UPDATE
                    SET role_keys = EXCLUDED.role_keys,
                        state = EXCLUDED.state,
                        change_date = EXCLUDED.change_date,
                        position = EXCLUDED.position
                    "#,
                )
                .bind(&payload.grant_id)
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(&payload.granted_org_id)
                .bind(&payload.role_keys)
                .bind(&event.resource_owner)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            GRANT_CHANGED => {
                let payload: GrantChangedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    UPDATE project_grants_projection
                    SET role_keys = $3, change_date = $4, position = $5
                    WHERE instance_id = $1 AND id = $2
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&payload.grant_id)
                .bind(&payload.role_keys)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            GRANT_DEACTIVATED => {
                let payload: GrantRefPayload = event.payload_as()?;
                Self::set_grant_state(tx, event, &payload.grant_id, "inactive").await?;
            }
            GRANT_REACTIVATED => {
                let payload: GrantRefPayload = event.payload_as()?;
                Self::set_grant_state(tx, event, &payload.grant_id, "active").await?;
            }
            GRANT_REMOVED => {
                let payload: GrantRefPayload = event.payload_as()?;
                sqlx::query(
                    "DELETE FROM project_grants_projection WHERE instance_id = $1 AND id = $2",
                )
                .bind(&event.instance_id)
                .bind(&payload.grant_id)
                .execute(&mut **tx)
                .await?;
            }
            _ => {}
        }
        Ok(())
    }
}
