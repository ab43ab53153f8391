//! Projection cursors
//!
//! One row per (projection, instance) in `projection_states`; advancement
//! is monotonic and committed in the same transaction as the handler
//! updates.

use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::AppResult;

/// Last applied `(position, in_position_order)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionCursor {
    pub position: Decimal,
    pub in_position_order: i32,
}

impl Default for ProjectionCursor {
    fn default() -> Self {
        Self {
            position: Decimal::ZERO,
            in_position_order: 0,
        }
    }
}

pub(super) async fn load_cursor(
    pool: &PgPool,
    name: &str,
    instance_id: &str,
) -> AppResult<ProjectionCursor> {
    let row: Option<(Decimal, i32)> = sqlx::query_as(
        r#"
        SELECT position, in_position_order FROM projection_states
        WHERE name = $1 AND instance_id = $2
        "#,
    )
    .bind(name)
    .bind(instance_id)
    .fetch_optional(pool)
    .await?;

    Ok(row
        .map(|(position, in_position_order)| ProjectionCursor {
            position,
            in_position_order,
        })
        .unwrap_or_default())
}

pub(super) async fn save_cursor(
    tx: &mut Transaction<'_, Postgres>,
    name: &str,
    instance_id: &str,
    cursor: ProjectionCursor,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO projection_states (name, instance_id, position, in_position_order, updated_at)
        VALUES ($1, $2, $3, $4, NOW())
        ON CONFLICT (name, instance_id) DO UPDATE
        SET position = EXCLUDED.position,
            in_position_order = EXCLUDED.in_position_order,
            updated_at = NOW()
        WHERE (projection_states.position, projection_states.in_position_order)
            < (EXCLUDED.position, EXCLUDED.in_position_order)
        "#,
    )
    .bind(name)
    .bind(instance_id)
    .bind(cursor.position)
    .bind(cursor.in_position_order)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
