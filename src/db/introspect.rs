//! Runtime inspection of the on-disk schema.

use rusqlite::{params, Connection, OptionalExtension};

use super::DatabaseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub decl_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    pub primary_key: bool,
}

/// Shape of a table as SQLite currently stores it. Only used for comparison.
#[derive(Debug, Clone)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    /// The `CREATE TABLE` statement as stored in `sqlite_master`.
    pub sql: String,
}

impl TableDescriptor {
    /// Load a table's descriptor, or `None` when the table does not exist.
    pub fn load(conn: &Connection, table: &str) -> Result<Option<Self>, DatabaseError> {
        let sql: Option<String> = conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get(0),
            )
            .optional()?;
        let Some(sql) = sql else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
        )?;
        let columns = stmt
            .query_map(params![table], |row| {
                Ok(ColumnInfo {
                    name: row.get(0)?,
                    decl_type: row.get(1)?,
                    not_null: row.get::<_, i64>(2)? != 0,
                    default_value: row.get(3)?,
                    primary_key: row.get::<_, i64>(4)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Self {
            name: table.to_string(),
            columns,
            sql,
        }))
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.name.eq_ignore_ascii_case(column))
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Case- and whitespace-insensitive search in the stored definition.
    pub fn definition_contains(&self, marker: &str) -> bool {
        normalize_sql(&self.sql).contains(&normalize_sql(marker))
    }
}

/// Collapse runs of whitespace and lowercase, so that constraint text can be
/// compared regardless of how the original DDL was formatted.
pub fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2 COLLATE NOCASE",
        params![table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// `(type, name, sql)` for every user object, sorted. Used to compare schemas.
pub fn schema_snapshot(conn: &Connection) -> Result<Vec<(String, String, String)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT type, name, COALESCE(sql, '') FROM sqlite_master
         WHERE name NOT LIKE 'sqlite_%'
         ORDER BY type, name",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Count user tables (for verification).
pub fn count_tables(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE widgets (
                id TEXT PRIMARY KEY NOT NULL,
                status   TEXT NOT NULL DEFAULT 'new'
                    CHECK (status IN ('new',  'old')),
                size INTEGER
            );",
        )
        .unwrap();
        conn
    }

    #[test]
    fn descriptor_lists_columns_in_order() {
        let conn = test_db();
        let desc = TableDescriptor::load(&conn, "widgets").unwrap().unwrap();
        assert_eq!(desc.column_names(), vec!["id", "status", "size"]);
        assert!(desc.columns[0].primary_key);
        assert!(desc.columns[1].not_null);
        assert_eq!(desc.columns[1].default_value.as_deref(), Some("'new'"));
        assert!(desc.has_column("SIZE"));
        assert!(!desc.has_column("weight"));
    }

    #[test]
    fn missing_table_has_no_descriptor() {
        let conn = test_db();
        assert!(TableDescriptor::load(&conn, "gadgets").unwrap().is_none());
        assert!(!table_exists(&conn, "gadgets").unwrap());
        assert!(table_exists(&conn, "widgets").unwrap());
    }

    #[test]
    fn definition_search_ignores_formatting() {
        let conn = test_db();
        let desc = TableDescriptor::load(&conn, "widgets").unwrap().unwrap();
        assert!(desc.definition_contains("check (status in ('new', 'old'))"));
        assert!(!desc.definition_contains("'retired'"));
    }

    #[test]
    fn column_exists_checks_named_table() {
        let conn = test_db();
        assert!(column_exists(&conn, "widgets", "status").unwrap());
        assert!(!column_exists(&conn, "widgets", "weight").unwrap());
        assert!(!column_exists(&conn, "gadgets", "status").unwrap());
    }
}
