use std::cell::RefCell;
use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::SyncError;
use crate::record::{TerritoryPatch, TerritoryRecord};
use crate::territory::Territory;

/// Table-like remote store: select all, insert, update by id, delete by id.
#[allow(async_fn_in_trait)]
pub trait RemoteStore {
    async fn select_all(&self) -> Result<Vec<TerritoryRecord>, SyncError>;
    async fn exists(&self, id: &str) -> Result<bool, SyncError>;
    async fn insert(&self, record: &TerritoryRecord) -> Result<(), SyncError>;
    async fn update(&self, id: &str, patch: &TerritoryPatch) -> Result<(), SyncError>;
    async fn delete(&self, id: &str) -> Result<(), SyncError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Bridges the in-memory store and a [`RemoteStore`].
///
/// Local state is never rolled back on failure. At most one save per
/// territory id is in flight; a second one fails fast with
/// [`SyncError::SaveInProgress`].
pub struct SyncAdapter<R> {
    remote: R,
    in_flight: RefCell<HashSet<String>>,
}

struct InFlight<'a> {
    set: &'a RefCell<HashSet<String>>,
    id: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.borrow_mut().remove(&self.id);
    }
}

impl<R: RemoteStore> SyncAdapter<R> {
    pub fn new(remote: R) -> Self {
        Self {
            remote,
            in_flight: RefCell::new(HashSet::new()),
        }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn is_saving(&self, id: &str) -> bool {
        self.in_flight.borrow().contains(id)
    }

    /// Fetch every row. Rows that do not decode are skipped with a warning
    /// rather than failing the whole load.
    pub async fn load_all(&self) -> Result<Vec<Territory>, SyncError> {
        let records = self.remote.select_all().await?;
        let total = records.len();
        let mut territories = Vec::with_capacity(total);
        for record in records {
            let id = record.id.clone();
            match Territory::from_record(record) {
                Ok(mut territory) => {
                    territory.persisted = true;
                    territories.push(territory);
                }
                Err(e) => warn!(territory = %id, error = %e, "skipping malformed territory row"),
            }
        }
        debug!(loaded = territories.len(), total, "territories loaded");
        Ok(territories)
    }

    /// Insert when the id is unknown remotely, otherwise update by id with
    /// every mutable column.
    pub async fn upsert(&self, territory: &Territory) -> Result<UpsertOutcome, SyncError> {
        let record = territory.to_record();
        record.validate()?;
        let _guard = self.begin(&record.id)?;

        if self.remote.exists(&record.id).await? {
            self.remote
                .update(&record.id, &TerritoryPatch::full(&record))
                .await?;
            Ok(UpsertOutcome::Updated)
        } else {
            self.remote.insert(&record).await?;
            Ok(UpsertOutcome::Inserted)
        }
    }

    /// Delete by id. A row that is already gone counts as deleted.
    pub async fn delete(&self, id: &str) -> Result<(), SyncError> {
        let _guard = self.begin(id)?;
        match self.remote.delete(id).await {
            Ok(()) | Err(SyncError::Missing(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn begin(&self, id: &str) -> Result<InFlight<'_>, SyncError> {
        if !self.in_flight.borrow_mut().insert(id.to_string()) {
            return Err(SyncError::SaveInProgress(id.to_string()));
        }
        Ok(InFlight {
            set: &self.in_flight,
            id: id.to_string(),
        })
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeMap;

    use super::RemoteStore;
    use crate::error::SyncError;
    use crate::record::{TerritoryPatch, TerritoryRecord};

    /// In-process table with an optional gate that parks `exists` calls.
    #[derive(Default)]
    pub struct MemoryRemote {
        pub rows: RefCell<BTreeMap<String, TerritoryRecord>>,
        pub calls: RefCell<Vec<String>>,
        pub gate_closed: Cell<bool>,
        pub fail_writes: Cell<bool>,
    }

    impl MemoryRemote {
        pub fn with_rows(rows: impl IntoIterator<Item = TerritoryRecord>) -> Self {
            let remote = Self::default();
            for row in rows {
                remote.rows.borrow_mut().insert(row.id.clone(), row);
            }
            remote
        }

        fn log(&self, call: String) {
            self.calls.borrow_mut().push(call);
        }

        fn check_writable(&self) -> Result<(), SyncError> {
            if self.fail_writes.get() {
                Err(SyncError::Status(500))
            } else {
                Ok(())
            }
        }
    }

    impl RemoteStore for MemoryRemote {
        async fn select_all(&self) -> Result<Vec<TerritoryRecord>, SyncError> {
            self.log("select".into());
            Ok(self.rows.borrow().values().cloned().collect())
        }

        async fn exists(&self, id: &str) -> Result<bool, SyncError> {
            self.log(format!("exists {id}"));
            futures::future::poll_fn(|_| {
                if self.gate_closed.get() {
                    std::task::Poll::Pending
                } else {
                    std::task::Poll::Ready(())
                }
            })
            .await;
            Ok(self.rows.borrow().contains_key(id))
        }

        async fn insert(&self, record: &TerritoryRecord) -> Result<(), SyncError> {
            self.log(format!("insert {}", record.id));
            self.check_writable()?;
            let mut rows = self.rows.borrow_mut();
            if rows.contains_key(&record.id) {
                return Err(SyncError::Conflict(record.id.clone()));
            }
            rows.insert(record.id.clone(), record.clone());
            Ok(())
        }

        async fn update(&self, id: &str, patch: &TerritoryPatch) -> Result<(), SyncError> {
            self.log(format!("update {id}"));
            self.check_writable()?;
            let mut rows = self.rows.borrow_mut();
            let row = rows
                .get_mut(id)
                .ok_or_else(|| SyncError::Missing(id.to_string()))?;
            patch.clone().apply_to(row);
            Ok(())
        }

        async fn delete(&self, id: &str) -> Result<(), SyncError> {
            self.log(format!("delete {id}"));
            self.check_writable()?;
            self.rows
                .borrow_mut()
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| SyncError::Missing(id.to_string()))
        }
    }
}
