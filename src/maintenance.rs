//! Housekeeping: planner statistics, compaction and size reporting.

use crate::error::Result;
use crate::models::{DatabaseStats, IndexInfo};
use crate::schema::Table;
use crate::sqlite::Database;
use std::collections::BTreeMap;
use tracing::info;

impl Database {
    /// Refresh planner statistics and compact the file.
    pub fn optimize(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch("ANALYZE; VACUUM;")?;
            Ok(())
        })?;
        info!("database optimized");
        Ok(())
    }

    pub fn stats(&self) -> Result<DatabaseStats> {
        let stats = self.with_conn(|conn| {
            let database_size: i64 = conn.query_row(
                "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
                [],
                |row| row.get(0),
            )?;

            let mut table_counts = BTreeMap::new();
            for table in Table::ALL {
                let count: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
                table_counts.insert(table.as_str().to_string(), count);
            }

            let mut stmt = conn.prepare(
                "SELECT name, tbl_name, sql FROM sqlite_master
                 WHERE type = 'index' AND name NOT LIKE 'sqlite_%'
                 ORDER BY tbl_name, name",
            )?;
            let indexes = stmt
                .query_map([], |row| {
                    Ok(IndexInfo {
                        name: row.get(0)?,
                        table: row.get(1)?,
                        sql: row.get(2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(DatabaseStats {
                database_size,
                table_counts,
                indexes,
            })
        })?;
        info!(size = stats.database_size, indexes = stats.indexes.len(), "database stats collected");
        Ok(stats)
    }
}
