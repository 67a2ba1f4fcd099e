use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{Grid, StoreError, StoreResult, TableStore};

/// In-process store, used for tests and throwaway runs.
#[derive(Debug)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Grid>>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the backend going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store is offline".into()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TableStore for MemoryStore {
    fn load_grid(&self, table: &str) -> StoreResult<Option<Grid>> {
        self.check_available()?;
        let tables = self
            .tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        Ok(tables.get(table).cloned())
    }

    fn store_grid(&self, table: &str, grid: &Grid) -> StoreResult<()> {
        self.check_available()?;
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        tables.insert(table.to_string(), grid.clone());
        Ok(())
    }

    fn ping(&self) -> StoreResult<()> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_store_fails() {
        let store = MemoryStore::new();
        store.set_available(false);
        assert!(matches!(store.ping(), Err(StoreError::Unavailable(_))));
        assert!(matches!(
            store.read_all("T", &["a"]),
            Err(StoreError::Unavailable(_))
        ));

        store.set_available(true);
        assert!(store.ping().is_ok());
    }
}
