//! Policy read model
//!
//! One generic table for every policy kind at both scopes; the payload
//! column carries the typed policy document.

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};

use crate::aggregate::policy::{parse_policy_event_type, PolicyOp};
use crate::aggregate::Scope;
use crate::error::AppResult;
use crate::event_store::Event;

use super::Projection;

const INTERESTS: &[&str] = &[
    "instance.policy.password.complexity.added",
    "instance.policy.password.complexity.changed",
    "instance.policy.password.complexity.removed",
    "instance.policy.password.age.added",
    "instance.policy.password.age.changed",
    "instance.policy.password.age.removed",
    "instance.policy.password.lockout.added",
    "instance.policy.password.lockout.changed",
    "instance.policy.password.lockout.removed",
    "instance.policy.login.added",
    "instance.policy.login.changed",
    "instance.policy.login.removed",
    "instance.policy.label.added",
    "instance.policy.label.changed",
    "instance.policy.label.removed",
    "instance.policy.privacy.added",
    "instance.policy.privacy.changed",
    "instance.policy.privacy.removed",
    "instance.policy.notification.added",
    "instance.policy.notification.changed",
    "instance.policy.notification.removed",
    "instance.policy.domain.added",
    "instance.policy.domain.changed",
    "instance.policy.domain.removed",
    "instance.policy.mfa.added",
    "instance.policy.mfa.changed",
    "instance.policy.mfa.removed",
    "org.policy.password.complexity.added",
    "org.policy.password.complexity.changed",
    "org.policy.password.complexity.removed",
    "org.policy.password.age.added",
    "org.policy.password.age.changed",
    "org.policy.password.age.removed",
    "org.policy.password.lockout.added",
    "org.policy.password.lockout.changed",
    "org.policy.password.lockout.removed",
    "org.policy.login.added",
    "org.policy.login.changed",
    "org.policy.login.removed",
    "org.policy.label.added",
    "org.policy.label.changed",
    "org.policy.label.removed",
    "org.policy.privacy.added",
    "org.policy.privacy.changed",
    "org.policy.privacy.removed",
    "org.policy.notification.added",
    "org.policy.notification.changed",
    "org.policy.notification.removed",
    "org.policy.domain.added",
    "org.policy.domain.changed",
    "org.policy.domain.removed",
    "org.policy.mfa.added",
    "org.policy.mfa.changed",
    "org.policy.mfa.removed",
];

pub struct PolicyProjection;

#[async_trait]
impl Projection for PolicyProjection {
    fn name(&self) -> &'static str {
        "policies"
    }

    fn interests(&self) -> &'static [&'static str] {
        INTERESTS
    }

    async fn apply(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
    ) -> AppResult<()> {
        let Some((scope, kind, op)) = parse_policy_event_type(&event.event_type) else {
            return Ok(());
        };

        match op {
            PolicyOp::Added | PolicyOp::Changed => {
                sqlx::query(
                    r#"
                    INSERT INTO policies_projection
                        (instance_id, resource_owner, policy_kind, is_default, payload,
                         change_date, position)
                    VALUES ($1, $2, $3, $4, $5, $6, $7)
                    ON CONFLICT (instance_id, resource_owner, policy_kind) DO UPDATE
                    SET payload = EXCLUDED.payload,
                        change_date = EXCLUDED.change_date,
                        position = EXCLUDED.position
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(kind.as_str())
                .bind(scope == Scope::Instance)
                .bind(&event.payload)
                .bind(event.creation_date)
                .bind(event.position)
                .execute(&mut **tx)
                .await?;
            }
            PolicyOp::Removed => {
                sqlx::query(
                    r#"
                    DELETE FROM policies_projection
                    WHERE instance_id = $1 AND resource_owner = $2 AND policy_kind = $3
                    "#,
                )
                .bind(&event.instance_id)
                .bind(&event.aggregate_id)
                .bind(kind.as_str())
                .execute(&mut **tx)
                .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::policy::{policy_event_type, PolicyKind};

    #[test]
    fn test_interest_list_is_complete() {
        for scope in [Scope::Instance, Scope::Org] {
            for kind in PolicyKind::ALL {
                for op in [PolicyOp::Added, PolicyOp::Changed, PolicyOp::Removed] {
                    let event_type = policy_event_type(scope, kind, op);
                    assert!(
                        INTERESTS.contains(&event_type.as_str()),
                        "missing interest: {event_type}"
                    );
                }
            }
        }
        assert_eq!(INTERESTS.len(), 2 * PolicyKind::ALL.len() * 3);
    }
}
