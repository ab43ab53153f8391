//! Organization reads

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::AppResult;

use super::Queries;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrgRow {
    pub id: String,
    pub instance_id: String,
    pub name: String,
    pub state: String,
    pub primary_domain: Option<String>,
    pub resource_owner: String,
    pub creation_date: Option<DateTime<Utc>>,
    pub change_date: Option<DateTime<Utc>>,
    pub position: Decimal,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrgDomainRow {
    pub org_id: String,
    pub domain: String,
    pub is_verified: bool,
    pub is_primary: bool,
    pub validation_type: Option<String>,
}

impl Queries {
    pub async fn org_by_id(&self, instance_id: &str, org_id: &str) -> AppResult<Option<OrgRow>> {
        let org = sqlx::query_as(
            r#"
            SELECT id, instance_id, name, state, primary_domain, resource_owner,
                   creation_date, change_date, position
            FROM orgs_projection
            WHERE instance_id = $1 AND id = $2
            "#,
        )
        .bind(instance_id)
        .bind(org_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(org)
    }

    /// Active orgs whose name contains the given fragment.
    pub async fn active_orgs_by_name(
        &self,
        instance_id: &str,
        name: &str,
    ) -> AppResult<Vec<OrgRow>> {
        let orgs = sqlx::query_as(
            r#"
            SELECT id, instance_id, name, state, primary_domain, resource_owner,
                   creation_date, change_date, position
            FROM orgs_projection
            WHERE instance_id = $1 AND state = 'active' AND name ILIKE '%' || $2 || '%'
            ORDER BY name
            "#,
        )
        .bind(instance_id)
        .bind(name)
        .fetch_all(self.pool())
        .await?;
        Ok(orgs)
    }

    pub async fn domains_by_org(
        &self,
        instance_id: &str,
        org_id: &str,
    ) -> AppResult<Vec<OrgDomainRow>> {
        let domains = sqlx::query_as(
            r#"
            SELECT org_id, domain, is_verified, is_primary, validation_type
            FROM org_domains_projection
            WHERE instance_id = $1 AND org_id = $2
            ORDER BY domain
            "#,
        )
        .bind(instance_id)
        .bind(org_id)
        .fetch_all(self.pool())
        .await?;
        Ok(domains)
    }
}
