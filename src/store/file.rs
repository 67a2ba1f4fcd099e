use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use super::{Grid, StoreError, StoreResult, TableStore};

/// One pretty-printed JSON file per table under a data directory.
/// Writes go to a uniquely named temp file which is then renamed over the
/// target.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "Opened JSON file store");
        Ok(Self { dir })
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.json"))
    }
}

impl TableStore for JsonFileStore {
    fn load_grid(&self, table: &str) -> StoreResult<Option<Grid>> {
        let path = self.table_path(table);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        let grid = serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
            table: table.to_string(),
            message: e.to_string(),
        })?;
        Ok(Some(grid))
    }

    fn store_grid(&self, table: &str, grid: &Grid) -> StoreResult<()> {
        let path = self.table_path(table);

        // Each writer gets its own temp file; overlapping writers race only
        // on the final rename.
        let body = serde_json::to_vec_pretty(grid)?;
        let mut temp = NamedTempFile::new_in(&self.dir)?;
        temp.write_all(&body)?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| e.error)?;

        debug!(table, rows = grid.rows.len(), "Table written");
        Ok(())
    }

    fn ping(&self) -> StoreResult<()> {
        if self.dir.is_dir() {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!(
                "data directory {} is missing",
                self.dir.display()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use tempfile::TempDir;

    use super::*;
    use crate::store::Row;

    #[test]
    fn test_round_trip_through_disk() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        store
            .append_rows("Sessions", &["id", "fee"], &[vec!["s1".into(), "900".into()]])
            .unwrap();

        let reopened = JsonFileStore::open(dir.path()).unwrap();
        let rows = reopened.read_all("Sessions", &["id", "fee"]).unwrap();
        assert_eq!(rows, vec![vec!["s1".to_string(), "900".to_string()]]);
        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_overlapping_writers_never_tear_the_table() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonFileStore::open(dir.path()).unwrap());
        let header = ["id", "fee"];

        let writers: Vec<_> = (0..8)
            .map(|n| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for round in 0..20 {
                        let rows: Vec<Row> = (0..50)
                            .map(|i| vec![format!("w{n}-r{round}-{i}"), "450".into()])
                            .collect();
                        store.overwrite("Sessions", &header, &rows).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let rows = store.read_all("Sessions", &header).unwrap();
        assert_eq!(rows.len(), 50);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Classes.json"), "not json").unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.load_grid("Classes"),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_ping_missing_dir() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path().join("data")).unwrap();
        assert!(store.ping().is_ok());
        fs::remove_dir_all(dir.path().join("data")).unwrap();
        assert!(matches!(store.ping(), Err(StoreError::Unavailable(_))));
    }
}
