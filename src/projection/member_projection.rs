//! Membership read model
//!
//! One table for org members, project members and project-grant members,
//! keyed by member type. Removal of the owning aggregate (or the user)
//! drops the rows.

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};

use crate::aggregate::org::{
    OrgMemberPayload, OrgMemberRemovedPayload, ORG_MEMBER_ADDED, ORG_MEMBER_CHANGED,
    ORG_MEMBER_REMOVED, ORG_REMOVED,
};
use crate::aggregate::project::{
    GrantMemberPayload, GrantMemberRemovedPayload, GrantRefPayload, MemberPayload,
    MemberRemovedPayload, GRANT_MEMBER_ADDED, GRANT_MEMBER_CHANGED, GRANT_MEMBER_REMOVED,
    GRANT_REMOVED, MEMBER_ADDED, MEMBER_CHANGED, MEMBER_REMOVED, PROJECT_REMOVED,
};
use crate::aggregate::user::USER_REMOVED;
use crate::error::AppResult;
use crate::event_store::Event;

use super::Projection;

pub struct MemberProjection;

impl MemberProjection {
    #[allow(clippy::too_many_arguments)]
    async fn upsert(
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
        member_type: &str,
        aggregate_id: &str,
        object_id: &str,
        user_id: &str,
        roles: &[String],
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO members_projection
                (instance_id, member_type, aggregate_id, object_id, user_id, roles,
                 resource_owner, change_date, position)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (instance_id, member_type, aggregate_id, object_id, user_id) DO UPDATE
            SET roles = EXCLUDED.roles,
                change_date = EXCLUDED.change_date,
                position = EXCLUDED.position
            "#,
        )
        .bind(&event.instance_id)
        .bind(member_type)
        .bind(aggregate_id)
        .bind(object_id)
        .bind(user_id)
        .bind(roles)
        .bind(&event.resource_owner)
        .bind(event.creation_date)
        .bind(event.position)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn delete(
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
        member_type: &str,
        object_id: &str,
        user_id: &str,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            DELETE FROM members_projection
            WHERE instance_id = $1 AND member_type = $2 AND aggregate_id = $3
              AND object_id = $4 AND user_id = $5
            "#,
        )
        .bind(&event.instance_id)
        .bind(member_type)
        .bind(&event.aggregate_id)
        .bind(object_id)
        .bind(user_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Projection for MemberProjection {
    fn name(&self) -> &'static str {
        "members"
    }

    fn interests(&self) -> &'static [&'static str] {
        &[
            ORG_MEMBER_ADDED,
            ORG_MEMBER_CHANGED,
            ORG_MEMBER_REMOVED,
            MEMBER_ADDED,
            MEMBER_CHANGED,
            MEMBER_REMOVED,
            GRANT_MEMBER_ADDED,
            GRANT_MEMBER_CHANGED,
            GRANT_MEMBER_REMOVED,
            GRANT_REMOVED,
            ORG_REMOVED,
            PROJECT_REMOVED,
            USER_REMOVED,
        ]
    }

    async fn apply(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
    ) -> AppResult<()> {
        match event.event_type.as_str() {
            ORG_MEMBER_ADDED | ORG_MEMBER_CHANGED => {
                let payload: OrgMemberPayload = event.payload_as()?;
                Self::upsert(
                    tx,
                    event,
                    "org",
                    &event.aggregate_id,
                    "",
                    &payload.user_id,
                    &payload.roles,
                )
                .await?;
            }
            ORG_MEMBER_REMOVED => {
                let payload: OrgMemberRemovedPayload = event.payload_as()?;
                Self::delete(tx, event, "org", "", &payload.user_id).await?;
            }
            MEMBER_ADDED | MEMBER_CHANGED => {
                let payload: MemberPayload = event.payload_as()?;
                Self::upsert(
                    tx,
                    event,
                    "project",
                    &event.aggregate_id,
                    "",
                    &payload.user_id,
                    &payload.roles,
                )
                .await?;
            }
            MEMBER_REMOVED => {
                let payload: MemberRemovedPayload = event.payload_as()?;
                Self::delete(tx, event, "project", "", &payload.user_id).await?;
            }
            GRANT_MEMBER_ADDED | GRANT_MEMBER_CHANGED => {
                let payload: GrantMemberPayload = event.payload_as()?;
                Self::upsert(
                    tx,
                    event,
                    "project_grant",
                    &event.aggregate_id,
                    &payload.grant_id,
                    &payload.user_id,
                    &payload.roles,
                )
                .await?;
            }
            GRANT_MEMBER_REMOVED => {
                let payload: GrantMemberRemovedPayload = event.payload_as()?;
                Self::delete(tx, event, "project_grant", &payload.grant_id, &payload.user_id)
                    .await?;
            }
            GRANT_REMOVED => {
                let payload: GrantRefPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    DELETE FROM members_projection
                    WHERE instance_id = $1 AND member_type = 'project_grant'
                      AND aggregate_id = $2 AND object_id = $3
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(&payload.grant_id)
                .execute(&mut **tx)
                .await?;
            }
            ORG_REMOVED => {
                sqlx::query(
                    r#"
                    DELETE FROM members_projection
                    WHERE instance_id = $1 AND member_type = 'org' AND aggregate_id = $2
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .execute(&mut **tx)
                .await?;
            }
            PROJECT_REMOVED => {
                sqlx::query(
                    r#"
                    DELETE FROM members_projection
                    WHERE instance_id = $1
                      AND member_type IN ('project', 'project_grant')
                      AND aggregate_id = $2
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .execute(&mut **tx)
                .await?;
            }
            USER_REMOVED => {
                sqlx::query(
                    "DELETE FROM members_projection WHERE instance_id = $1 AND user_id = $2",
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .execute(&mut **tx)
                .await?;
            }
            _ => {}
        }
        Ok(())
    }
}
