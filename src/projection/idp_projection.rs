//! IDP read model
//!
//! One row per provider; the typed provider config lands in the payload
//! column as stored in the event.

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};

use crate::error::AppResult;
use crate::event_store::Event;

use super::Projection;

const INTERESTS: &[&str] = &[
    "org.idp.oidc.added",
    "org.idp.oidc.changed",
    "org.idp.jwt.added",
    "org.idp.jwt.changed",
    "org.idp.saml.added",
    "org.idp.saml.changed",
    "org.idp.removed",
    "instance.idp.oidc.added",
    "instance.idp.oidc.changed",
    "instance.idp.jwt.added",
    "instance.idp.jwt.changed",
    "instance.idp.saml.added",
    "instance.idp.saml.changed",
    "instance.idp.removed",
];

pub struct IdpProjection;

/// `{scope}.idp.{type}.{op}` → (type, op); removed has no type segment.
fn parse_idp_event(event_type: &str) -> Option<(Option<&str>, &str)> {
    let rest = event_type
        .strip_prefix("org.idp.")
        .or_else(|| event_type.strip_prefix("instance.idp."))?;
    match rest {
        "removed" => Some((None, "removed")),
        _ => rest.split_once('.').map(|(t, op)| (Some(t), op)),
    }
}

#[async_trait]
impl Projection for IdpProjection {
    fn name(&self) -> &'static str {
        "idps"
    }

    fn interests(&self) -> &'static [&'static str] {
        INTERESTS
    }

    async fn apply(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
    ) -> AppResult<()> {
        let Some((idp_type, op)) = parse_idp_event(&event.event_type) else {
            return Ok(());
        };

        match op {
            "added" => {
                let name = event
                    .payload
                    .get("name")
                    .and_then(|n| n.as_str())
                    .unwrap_or_default()
                    .to_string();
                sqlx::query(
                    r#"
                    INSERT INTO idps_projection
                        (id, instance_id, resource_owner, name, idp_type, state, config,
                         change_date, position)
                    VALUES ($1, $2, $3, $4, $5, 'active', $6, $7, $8)
                    ON CONFLICT (instance_id, id) DO UPDATE
                    SET name = EXCLUDED.name,
                        config = EXCLUDED.config,
                        state = EXCLUDED.state,
                        change_date = EXCLUDED.change_date,
                        position = EXCLUDED.position
                    "#,
                )
                .bind(&event.aggregate_id)
                .bind(&event.instance_id)
                .bind(&event.resource_owner)
                .bind(&name)
                .bind(idp_type.unwrap_or_default())
                .bind(&event.payload)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            "changed" => {
                sqlx::query(
                    r#"
                    UPDATE idps_projection
                    SET name = COALESCE($3, name),
                        config = config || $4,
                        change_date = $5,
                        position = $6
                    WHERE instance_id = $1 AND id = $2
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(event.payload.get("name").and_then(|n| n.as_str()))
                .bind(&event.payload)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            "removed" => {
                sqlx::query("DELETE FROM idps_projection WHERE instance_id = $1 AND id = $2")
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_idp_event() {
        assert_eq!(
            parse_idp_event("org.idp.oidc.added"),
            Some((Some("oidc"), "added"))
        );
        assert_eq!(
            parse_idp_event("instance.idp.saml.changed"),
            Some((Some("saml"), "changed"))
        );
        assert_eq!(parse_idp_event("org.idp.removed"), Some((None, "removed")));
        assert_eq!(parse_idp_event("org.added"), None);
    }
}
