//! Projection engine
//!
//! The read side of CQRS: each projection advances its own cursor
//! through the event stream and updates its tables idempotently.
//! Projections never coordinate with each other.

mod engine;
mod state;

mod action_projection;
mod app_projection;
mod idp_projection;
mod member_projection;
mod notify_projection;
mod org_projection;
mod policy_projection;
mod project_projection;
mod session_projection;
mod user_projection;
mod web_key_projection;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};

use crate::error::AppResult;
use crate::event_store::Event;

pub use action_projection::ActionProjection;
pub use app_projection::AppProjection;
pub use engine::Supervisor;
pub use idp_projection::IdpProjection;
pub use member_projection::MemberProjection;
pub use notify_projection::{SmsConfigProjection, SmtpConfigProjection};
pub use org_projection::OrgProjection;
pub use policy_projection::PolicyProjection;
pub use project_projection::ProjectProjection;
pub use session_projection::SessionProjection;
pub use state::ProjectionCursor;
pub use user_projection::UserProjection;
pub use web_key_projection::WebKeyProjection;

/// One read model: a name, the event types it consumes, and the SQL
/// effect per event. `apply` runs inside the worker's transaction and
/// must be idempotent under at-least-once redelivery.
#[async_trait]
pub trait Projection: Send + Sync {
    fn name(&self) -> &'static str;

    /// Exact event types this projection consumes.
    fn interests(&self) -> &'static [&'static str];

    async fn apply(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &Event,
    ) -> AppResult<()>;
}

/// Every projection of the system, for supervisor registration.
pub fn all_projections() -> Vec<Arc<dyn Projection>> {
    vec![
        Arc::new(OrgProjection),
        Arc::new(UserProjection),
        Arc::new(ProjectProjection),
        Arc::new(MemberProjection),
        Arc::new(AppProjection),
        Arc::new(SessionProjection),
        Arc::new(PolicyProjection),
        Arc::new(IdpProjection),
        Arc::new(SmtpConfigProjection),
        Arc::new(SmsConfigProjection),
        Arc::new(ActionProjection),
        Arc::new(WebKeyProjection),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_projection_names_are_unique() {
        let projections = all_projections();
        let names: HashSet<&str> = projections.iter().map(|p| p.name()).collect();
        assert_eq!(names.len(), projections.len());
    }

    #[test]
    fn test_every_projection_declares_interests() {
        for projection in all_projections() {
            assert!(
                !projection.interests().is_empty(),
                "{} has no interests",
                projection.name()
            );
        }
    }
}
