//! Event stream filters
//!
//! Builder for `EventStore::query`. Filters compose into one SQL statement
//! against the `events` table.

use rust_decimal::Decimal;
use sqlx::{Postgres, QueryBuilder};

/// Filter for querying the event stream of one instance.
#[derive(Debug, Clone)]
pub struct EventFilter {
    pub(super) instance_id: String,
    pub(super) aggregate_types: Vec<String>,
    pub(super) aggregate_id: Option<String>,
    pub(super) event_types: Vec<String>,
    pub(super) event_type_prefix: Option<String>,
    pub(super) resource_owner: Option<String>,
    /// Exclusive lower bound on `(position, in_position_order)`.
    pub(super) after: Option<(Decimal, i32)>,
    pub(super) limit: Option<i64>,
    pub(super) descending: bool,
}

impl EventFilter {
    pub fn instance(instance_id: &str) -> Self {
        Self {
            instance_id: instance_id.to_string(),
            aggregate_types: Vec::new(),
            aggregate_id: None,
            event_types: Vec::new(),
            event_type_prefix: None,
            resource_owner: None,
            after: None,
            limit: None,
            descending: false,
        }
    }

    /// Convenience filter for one aggregate's full stream.
    pub fn aggregate(instance_id: &str, aggregate_type: &str, aggregate_id: &str) -> Self {
        Self::instance(instance_id)
            .aggregate_type(aggregate_type)
            .aggregate_id(aggregate_id)
    }

    pub fn aggregate_type(mut self, aggregate_type: &str) -> Self {
        self.aggregate_types.push(aggregate_type.to_string());
        self
    }

    pub fn aggregate_id(mut self, aggregate_id: &str) -> Self {
        self.aggregate_id = Some(aggregate_id.to_string());
        self
    }

    pub fn event_types(mut self, event_types: &[&str]) -> Self {
        self.event_types
            .extend(event_types.iter().map(|t| t.to_string()));
        self
    }

    /// Match every event type starting with the given dotted prefix
    /// (e.g. `org.domain.`).
    pub fn event_type_prefix(mut self, prefix: &str) -> Self {
        self.event_type_prefix = Some(prefix.to_string());
        self
    }

    pub fn resource_owner(mut self, resource_owner: &str) -> Self {
        self.resource_owner = Some(resource_owner.to_string());
        self
    }

    pub fn after(mut self, position: Decimal, in_position_order: i32) -> Self {
        self.after = Some((position, in_position_order));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    /// Build the SELECT for this filter.
    pub(super) fn build_query(&self) -> QueryBuilder<'_, Postgres> {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "SELECT instance_id, aggregate_type, aggregate_id, aggregate_version, \
             event_type, revision, payload, editor_user, resource_owner, \
             position, in_position_order, creation_date \
             FROM events WHERE instance_id = ",
        );
        qb.push_bind(&self.instance_id);

        if !self.aggregate_types.is_empty() {
            qb.push(" AND aggregate_type = ANY(");
            qb.push_bind(&self.aggregate_types);
            qb.push(")");
        }
        if let Some(aggregate_id) = &self.aggregate_id {
            qb.push(" AND aggregate_id = ");
            qb.push_bind(aggregate_id);
        }
        if !self.event_types.is_empty() {
            qb.push(" AND event_type = ANY(");
            qb.push_bind(&self.event_types);
            qb.push(")");
        }
        if let Some(prefix) = &self.event_type_prefix {
            qb.push(" AND event_type LIKE ");
            qb.push_bind(format!("{}%", like_escape(prefix)));
        }
        if let Some(resource_owner) = &self.resource_owner {
            qb.push(" AND resource_owner = ");
            qb.push_bind(resource_owner);
        }
        if let Some((position, in_position_order)) = &self.after {
            qb.push(" AND (position, in_position_order) > (");
            qb.push_bind(position);
            qb.push(", ");
            qb.push_bind(in_position_order);
            qb.push(")");
        }

        if self.descending {
            qb.push(" ORDER BY position DESC, in_position_order DESC");
        } else {
            qb.push(" ORDER BY position ASC, in_position_order ASC");
        }
        if let Some(limit) = self.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit);
        }
        qb
    }
}

/// Escape LIKE wildcards so a dotted prefix matches literally.
fn like_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_filter_builder_fields() {
        let filter = EventFilter::aggregate("i1", "org", "o1")
            .event_types(&["org.added", "org.changed"])
            .after(dec!(42), 1)
            .limit(100);

        assert_eq!(filter.instance_id, "i1");
        assert_eq!(filter.aggregate_types, vec!["org"]);
        assert_eq!(filter.aggregate_id.as_deref(), Some("o1"));
        assert_eq!(filter.event_types.len(), 2);
        assert_eq!(filter.after, Some((dec!(42), 1)));
        assert_eq!(filter.limit, Some(100));
        assert!(!filter.descending);
    }

    #[test]
    fn test_build_query_sql_shape() {
        let filter = EventFilter::instance("i1")
            .event_type_prefix("org.domain.")
            .descending()
            .limit(1);
        let sql = filter.build_query().into_sql();
        assert!(sql.contains("event_type LIKE"));
        assert!(sql.contains("ORDER BY position DESC"));
        assert!(sql.contains("LIMIT"));
    }

    #[test]
    fn test_like_escape() {
        assert_eq!(like_escape("org.domain."), "org.domain.");
        assert_eq!(like_escape("a_b%c"), "a\\_b\\%c");
    }
}
