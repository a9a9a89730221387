//! Shared filtering, paging and query-construction helpers.
//!
//! Query text is assembled fresh at each call site; nothing here holds
//! module-level statement templates or other hidden state.

/// Page selection for listing queries.
///
/// `per_page: None` returns every matching row. Soft-deleted rows are
/// excluded unless `include_deleted` is set.
#[derive(Debug, Clone, Default)]
pub struct Paging {
    pub page: u64,
    pub per_page: Option<u64>,
    pub include_deleted: bool,
}

impl Paging {
    /// All live rows, unpaged.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn page(page: u64, per_page: u64) -> Self {
        Self {
            page,
            per_page: Some(per_page),
            include_deleted: false,
        }
    }

    pub fn include_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }
}

/// `?, ?, ...` — one placeholder per element of an IN list.
pub(crate) fn in_clause(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// The unlocked-pending-work SELECT for one envelope table: live rows whose
/// state is in the supplied set and whose lock is free, oldest first. The id
/// tiebreak keeps the order deterministic when two rows share a timestamp.
pub(crate) fn pending_work_sql(
    table: &str,
    columns: &str,
    order_column: &str,
    state_count: usize,
) -> String {
    format!(
        "SELECT {columns} FROM {table} \
         WHERE delete_at = 0 AND lock_acquired_at = 0 AND state IN ({}) \
         ORDER BY {order_column} ASC, id ASC",
        in_clause(state_count)
    )
}

/// Append the tombstone filter, ordering and LIMIT/OFFSET for a listing
/// query, pushing any paging parameters onto `params`.
pub(crate) fn apply_paging(
    sql: &mut String,
    params: &mut Vec<Box<dyn rusqlite::ToSql>>,
    paging: &Paging,
    order_column: &str,
) {
    if !paging.include_deleted {
        sql.push_str(" AND delete_at = 0");
    }
    sql.push_str(&format!(" ORDER BY {order_column} ASC, id ASC"));
    if let Some(per_page) = paging.per_page {
        sql.push_str(" LIMIT ? OFFSET ?");
        params.push(Box::new(per_page as i64));
        params.push(Box::new((paging.page * per_page) as i64));
    }
}

/// Lift a domain decode/parse result into a rusqlite row-mapping error so it
/// surfaces through the normal query error path with the column position.
pub(crate) fn from_column<T>(column: usize, value: crate::error::Result<T>) -> rusqlite::Result<T> {
    value.map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_work_sql_filters_lock_and_tombstone() {
        let sql = pending_work_sql("clusters", "id, state", "create_at", 2);
        assert!(sql.contains("lock_acquired_at = 0"));
        assert!(sql.contains("delete_at = 0"));
        assert!(sql.contains("state IN (?, ?)"));
        assert!(sql.contains("ORDER BY create_at ASC"));
    }

    #[test]
    fn paging_appends_limit_and_offset() {
        let mut sql = String::from("SELECT id FROM t WHERE 1 = 1");
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        apply_paging(&mut sql, &mut params, &Paging::page(2, 10), "create_at");
        assert!(sql.ends_with("LIMIT ? OFFSET ?"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn include_deleted_skips_tombstone_filter() {
        let mut sql = String::from("SELECT id FROM t WHERE 1 = 1");
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        apply_paging(&mut sql, &mut params, &Paging::all().include_deleted(), "create_at");
        assert!(!sql.contains("delete_at"));
        assert!(params.is_empty());
    }
}
