//! Query layer
//!
//! Stateless point and list reads over the projection tables. Every read
//! is scoped by instance; no query joins across projection boundaries.

mod app;
mod org;
mod project;
mod session;
mod settings;
mod user;

pub use app::{ApiConfigRow, AppRow, OidcConfigRow, SamlConfigRow};
pub use org::{OrgDomainRow, OrgRow};
pub use project::{MemberRow, ProjectGrantRow, ProjectRoleRow, ProjectRow};
pub use session::SessionRow;
pub use settings::{ActionRow, ExecutionRow, IdpRow, PolicyRow, SmsConfigRow, SmtpConfigRow, WebKeyRow};
pub use user::{AuthMethodRow, UserRow};

use sqlx::PgPool;

/// Read-side entry point.
#[derive(Debug, Clone)]
pub struct Queries {
    pool: PgPool,
}

impl Queries {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}
