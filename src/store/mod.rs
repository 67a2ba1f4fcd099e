//! Tabular persistence.
//!
//! A store holds named tables of string cells under a header row. Backends
//! only load and save whole grids; the row operations are provided on top
//! and every one of them verifies (or creates) the expected header first.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub type Row = Vec<String>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Table '{table}' is corrupt: {message}")]
    Corrupt { table: String, message: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Header plus data rows of one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    pub header: Vec<String>,
    pub rows: Vec<Row>,
}

pub trait TableStore: Send + Sync {
    /// Load a table, `None` if it has never been written.
    fn load_grid(&self, table: &str) -> StoreResult<Option<Grid>>;

    /// Replace a table wholesale.
    fn store_grid(&self, table: &str, grid: &Grid) -> StoreResult<()>;

    /// Cheap reachability probe.
    fn ping(&self) -> StoreResult<()>;

    /// Make sure the table exists and its header matches `header`,
    /// rewriting the header row in place when it does not.
    fn ensure_header(&self, table: &str, header: &[&str]) -> StoreResult<Grid> {
        let expected: Vec<String> = header.iter().map(|h| h.to_string()).collect();
        match self.load_grid(table)? {
            None => {
                let grid = Grid {
                    header: expected,
                    rows: Vec::new(),
                };
                self.store_grid(table, &grid)?;
                debug!(table, "Created table");
                Ok(grid)
            }
            Some(mut grid) if grid.header != expected => {
                warn!(table, found = ?grid.header, "Header mismatch, rewriting header row");
                grid.header = expected;
                self.store_grid(table, &grid)?;
                Ok(grid)
            }
            Some(grid) => Ok(grid),
        }
    }

    fn read_all(&self, table: &str, header: &[&str]) -> StoreResult<Vec<Row>> {
        Ok(self.ensure_header(table, header)?.rows)
    }

    fn append_rows(&self, table: &str, header: &[&str], rows: &[Row]) -> StoreResult<()> {
        let mut grid = self.ensure_header(table, header)?;
        if rows.is_empty() {
            return Ok(());
        }
        check_widths(table, header, rows)?;
        grid.rows.extend(rows.iter().cloned());
        self.store_grid(table, &grid)
    }

    fn overwrite(&self, table: &str, header: &[&str], rows: &[Row]) -> StoreResult<()> {
        let mut grid = self.ensure_header(table, header)?;
        check_widths(table, header, rows)?;
        grid.rows = rows.to_vec();
        self.store_grid(table, &grid)
    }

    /// Replace the row whose `key_column` matches, or append it.
    /// Returns `true` when the row was inserted.
    fn upsert_by_key(
        &self,
        table: &str,
        header: &[&str],
        key_column: &str,
        row: Row,
    ) -> StoreResult<bool> {
        let mut grid = self.ensure_header(table, header)?;
        check_widths(table, header, std::slice::from_ref(&row))?;
        let key_idx = column_index(table, header, key_column)?;

        let inserted = match grid
            .rows
            .iter_mut()
            .find(|existing| existing.get(key_idx) == row.get(key_idx))
        {
            Some(existing) => {
                *existing = row;
                false
            }
            None => {
                grid.rows.push(row);
                true
            }
        };
        self.store_grid(table, &grid)?;
        Ok(inserted)
    }

    /// Remove all rows matching `predicate`, returning how many went.
    fn delete_where(
        &self,
        table: &str,
        header: &[&str],
        predicate: &dyn Fn(&Row) -> bool,
    ) -> StoreResult<usize> {
        let mut grid = self.ensure_header(table, header)?;
        let before = grid.rows.len();
        grid.rows.retain(|row| !predicate(row));
        let removed = before - grid.rows.len();
        if removed > 0 {
            self.store_grid(table, &grid)?;
        }
        Ok(removed)
    }
}

pub fn column_index(table: &str, header: &[&str], column: &str) -> StoreResult<usize> {
    header
        .iter()
        .position(|h| *h == column)
        .ok_or_else(|| StoreError::Corrupt {
            table: table.to_string(),
            message: format!("no column named '{column}'"),
        })
}

fn check_widths(table: &str, header: &[&str], rows: &[Row]) -> StoreResult<()> {
    if let Some(bad) = rows.iter().find(|row| row.len() != header.len()) {
        return Err(StoreError::Corrupt {
            table: table.to_string(),
            message: format!(
                "row has {} cells, header has {} columns",
                bad.len(),
                header.len()
            ),
        });
    }
    Ok(())
}
