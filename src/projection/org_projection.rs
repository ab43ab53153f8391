//! Organization read model
//!
//! Maintains `orgs_projection` and `org_domains_projection` (one
//! projection owns both, so domain lookups may join them).

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};

use crate::aggregate::org::{
    OrgAddedPayload, OrgChangedPayload, OrgDomainAddedPayload, OrgDomainPrimarySetPayload,
    OrgDomainRemovedPayload, OrgDomainVerificationAddedPayload, OrgDomainVerifiedPayload,
    ORG_ADDED, ORG_CHANGED, ORG_DEACTIVATED, ORG_DOMAIN_ADDED, ORG_DOMAIN_PRIMARY_SET,
    ORG_DOMAIN_REMOVED, ORG_DOMAIN_VERIFICATION_ADDED, ORG_DOMAIN_VERIFIED, ORG_REACTIVATED,
    ORG_REMOVED,
};
use crate::error::AppResult;
use crate::event_store::Event;

use super::Projection;

pub struct OrgProjection;

#[async_trait]
impl Projection for OrgProjection {
    fn name(&self) -> &'static str {
        "orgs"
    }

    fn interests(&self) -> &'static [&'static str] {
        &[
            ORG_ADDED,
            ORG_CHANGED,
            ORG_DEACTIVATED,
            ORG_REACTIVATED,
            ORG_REMOVED,
            ORG_DOMAIN_ADDED,
            ORG_DOMAIN_VERIFICATION_ADDED,
            ORG_DOMAIN_VERIFIED,
            ORG_DOMAIN_PRIMARY_SET,
            ORG_DOMAIN_REMOVED,
        ]
    }

    async fn apply(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
    ) -> AppResult<()> {
        match event.event_type.as_str() {
            ORG_ADDED => {
                let payload: OrgAddedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    INSERT INTO orgs_projection
                        (id, instance_id, name, state, resource_owner, creation_date, change_date, position)
                    VALUES ($1, $2, $3, 'active', $4, $5, $5, $6)
                    ON CONFLICT (instance_id, id) DO UPDATE
                    SET name = EXCLUDED.name,
                        state = EXCLUDED.state,
                        change_date = EXCLUDED.change_date,
                        position = EXCLUDED.position
                    "#,
                )
                .bind(&event.aggregate_id)
                .bind(&event.instance_id)
                .bind(&payload.name)
                .bind(&event.resource_owner)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            ORG_CHANGED => {
                let payload: OrgChangedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    UPDATE orgs_projection
                    SET name = $3, change_date = $4, position = $5
                    WHERE instance_id = $1 AND id = $2
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(&payload.name)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            ORG_DEACTIVATED | ORG_REACTIVATED => {
                let state = if event.event_type == ORG_DEACTIVATED {
                    "inactive"
                } else {
                    "active"
                };
                sqlx::query(
                    r#"
                    UPDATE orgs_projection
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
            }
            ORG_REMOVED => {
                sqlx::query("DELETE FROM orgs_projection WHERE instance_id = $1 AND id = $2")
                    .bind(&event.instance_id)
                    .bind(&event.aggregate_id)
                    .execute(&mut **tx)
                    .await?;
                sqlx::query(
                    "DELETE FROM org_domains_projection WHERE instance_id = $1 AND org_id = $2",
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .execute(&mut **tx)
                .await?;
            }
            ORG_DOMAIN_ADDED => {
                let payload: OrgDomainAddedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    INSERT INTO org_domains_projection
                        (instance_id, org_id, domain, is_verified, is_primary, validation_type, change_date, position)
                    VALUES ($1, $2, $3, FALSE, FALSE, $4, $5, $6)
                    ON CONFLICT (instance_id, org_id, domain) DO UPDATE
                    SET change_date = EXCLUDED.change_date, position = EXCLUDED.position
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(&payload.domain)
                .bind(&payload.validation_type)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            ORG_DOMAIN_VERIFICATION_ADDED => {
                let payload: OrgDomainVerificationAddedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    UPDATE org_domains_projection
                    SET validation_type = $4, change_date = $5, position = $6
                    WHERE instance_id = $1 AND org_id = $2 AND domain = $3
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(&payload.domain)
                .bind(&payload.validation_type)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            ORG_DOMAIN_VERIFIED => {
                let payload: OrgDomainVerifiedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    UPDATE org_domains_projection
                    SET is_verified = TRUE, change_date = $4, position = $5
                    WHERE instance_id = $1 AND org_id = $2 AND domain = $3
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(&payload.domain)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            ORG_DOMAIN_PRIMARY_SET => {
                let payload: OrgDomainPrimarySetPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    UPDATE org_domains_projection
                    SET is_primary = (domain = $3), change_date = $4, position = $5
                    WHERE instance_id = $1 AND org_id = $2
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(&payload.domain)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
                sqlx::query(
                    r#"
                    UPDATE orgs_projection
                    SET primary_domain = $3, change_date = $4, position = $5
                    WHERE instance_id = $1 AND id = $2
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(&payload.domain)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            ORG_DOMAIN_REMOVED => {
                let payload: OrgDomainRemovedPayload = event.payload_as()?;
                sqlx::query(
                    r#"
                    DELETE FROM org_domains_projection
                    WHERE instance_id = $1 AND org_id = $2 AND domain = $3
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(&payload.domain)
                .execute(&mut **tx)
                .await?;
                sqlx::query(
                    r#"
                    UPDATE orgs_projection
                    SET primary_domain = NULL, change_date = $4, position = $5
                    WHERE instance_id = $1 AND id = $2 AND primary_domain = $3
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(&payload.domain)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            _ => {}
        }
        Ok(())
    }
}
