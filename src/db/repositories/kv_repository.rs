use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::AppResult;

/// The key-value tables sharing the `(key, value, updated_at)` layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvTable {
    /// Namespaced application data, e.g. the saved assessment collection.
    LocalStore,
    /// Plain user preferences.
    AppSettings,
    /// Encrypted credentials.
    SecureSettings,
}

impl KvTable {
    fn table_name(self) -> &'static str {
        match self {
            KvTable::LocalStore => "local_store",
            KvTable::AppSettings => "app_settings",
            KvTable::SecureSettings => "secure_settings",
        }
    }
}

#[derive(Debug, Clone)]
pub struct KvRow {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}

impl TryFrom<&Row<'_>> for KvRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            key: row.get("key")?,
            value: row.get("value")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub struct KvRepository;

impl KvRepository {
    pub fn get(conn: &Connection, table: KvTable, key: &str) -> AppResult<Option<KvRow>> {
        let sql = format!(
            "SELECT key, value, updated_at FROM {} WHERE key = ?1",
            table.table_name()
        );
        let mut stmt = conn.prepare(&sql)?;

        let row = stmt
            .query_row([key], |row| KvRow::try_from(row))
            .optional()?;

        Ok(row)
    }

    pub fn list(conn: &Connection, table: KvTable) -> AppResult<Vec<KvRow>> {
        let sql = format!(
            "SELECT key, value, updated_at FROM {} ORDER BY key ASC",
            table.table_name()
        );
        let mut stmt = conn.prepare(&sql)?;

        let rows = stmt
            .query_map([], |row| KvRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    pub fn upsert(conn: &Connection, table: KvTable, key: &str, value: &str) -> AppResult<()> {
        let sql = format!(
            r#"
                INSERT INTO {} (key, value)
                VALUES (:key, :value)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = CURRENT_TIMESTAMP
            "#,
            table.table_name()
        );
        conn.execute(&sql, named_params! {":key": key, ":value": value})?;

        Ok(())
    }

    pub fn delete(conn: &Connection, table: KvTable, key: &str) -> AppResult<()> {
        let sql = format!("DELETE FROM {} WHERE key = ?1", table.table_name());
        conn.execute(&sql, [key])?;
        Ok(())
    }
}
