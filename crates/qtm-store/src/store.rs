//! Store — redb-backed persistence for qtm.
//!
//! Holds the session log (list, headers, apps, endpoints, config
//! changes) plus suite and catalog data. The session-list update and
//! the session header write happen in a single write transaction, so
//! an ID can never appear in the list without its header.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use qtm_core::catalog::CatalogItem;
use qtm_core::session::{AppData, ConfigChange, SessionData, SessionError, SessionManager};
use qtm_core::suite::SuiteItem;

use crate::error::StoreResult;
use crate::tables::*;

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

/// Every table the store serves. Opening one in a write transaction
/// creates it, so walking this list makes a fresh database usable.
const ALL_TABLES: &[Table] = &[
    SESSION_LIST,
    SESSIONS,
    SESSION_APPS,
    SESSION_ENDPOINTS,
    SESSION_CONFIG,
    SUITES,
    CATALOG,
];

/// Thread-safe store backed by redb.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    /// Open or create the store file at `path`.
    pub fn open(path: &Path) -> StoreResult<Self> {
        debug!(?path, "opening store");
        Self::from_db(Database::create(path)?)
    }

    /// Ephemeral store for tests and `--local` runs.
    pub fn open_in_memory() -> StoreResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::from_db(db)
    }

    fn from_db(db: Database) -> StoreResult<Self> {
        let store = Self { db: Arc::new(db) };
        let txn = store.db.begin_write()?;
        for table in ALL_TABLES {
            txn.open_table(*table)?;
        }
        txn.commit()?;
        Ok(store)
    }

    // ── Generic row helpers ────────────────────────────────────────

    fn put_raw(&self, table: Table, key: &str, value: &[u8]) -> StoreResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut t = txn.open_table(table)?;
            t.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    fn get_raw(&self, table: Table, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read()?;
        let t = txn.open_table(table)?;
        Ok(t.get(key)?.map(|guard| guard.value().to_vec()))
    }

    /// Delete a key. Returns true if it existed.
    fn delete_raw(&self, table: Table, key: &str) -> StoreResult<bool> {
        let txn = self.db.begin_write()?;
        let existed;
        {
            let mut t = txn.open_table(table)?;
            existed = t.remove(key)?.is_some();
        }
        txn.commit()?;
        Ok(existed)
    }

    /// True iff any key in `table` starts with `prefix`.
    fn prefix_nonempty(&self, table: Table, prefix: &str) -> StoreResult<bool> {
        let txn = self.db.begin_read()?;
        let t = txn.open_table(table)?;
        for entry in t.iter()? {
            let (key, _) = entry?;
            if key.value().starts_with(prefix) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // ── Sessions ───────────────────────────────────────────────────

    /// List persisted session IDs.
    pub fn list_sessions(&self) -> StoreResult<Vec<String>> {
        let list = match self.get_raw(SESSION_LIST, SESSION_LIST_KEY)? {
            Some(raw) => serde_json::from_slice::<BTreeSet<String>>(&raw)?,
            None => BTreeSet::new(),
        };
        Ok(list.into_iter().collect())
    }

    /// Persist an empty session header and add the ID to the session
    /// list, in one transaction.
    pub fn register_session(&self, session_id: &str, username: &str) -> StoreResult<()> {
        let header = SessionData {
            session_id: session_id.to_string(),
            username: username.to_string(),
            ..SessionData::default()
        };
        let value = serde_json::to_vec(&header)?;

        let txn = self.db.begin_write()?;
        {
            let mut sessions = txn.open_table(SESSIONS)?;
            sessions.insert(session_id, value.as_slice())?;

            let mut list_table = txn.open_table(SESSION_LIST)?;
            let mut list: BTreeSet<String> = match list_table.get(SESSION_LIST_KEY)? {
                Some(guard) => serde_json::from_slice(guard.value())?,
                None => BTreeSet::new(),
            };
            list.insert(session_id.to_string());
            let encoded = serde_json::to_vec(&list)?;
            list_table.insert(SESSION_LIST_KEY, encoded.as_slice())?;
        }
        txn.commit()?;
        debug!(session = session_id, "session registered");
        Ok(())
    }

    /// Delete the session header, every child row, and the list
    /// entry, in one transaction.
    pub fn remove_session(&self, session_id: &str) -> StoreResult<()> {
        let prefix = format!("{session_id}/");
        let txn = self.db.begin_write()?;
        {
            let mut list_table = txn.open_table(SESSION_LIST)?;
            let mut list: BTreeSet<String> = match list_table.get(SESSION_LIST_KEY)? {
                Some(guard) => serde_json::from_slice(guard.value())?,
                None => BTreeSet::new(),
            };
            list.remove(session_id);
            let encoded = serde_json::to_vec(&list)?;
            list_table.insert(SESSION_LIST_KEY, encoded.as_slice())?;

            let mut sessions = txn.open_table(SESSIONS)?;
            sessions.remove(session_id)?;

            for table in [SESSION_APPS, SESSION_ENDPOINTS, SESSION_CONFIG] {
                let mut t = txn.open_table(table)?;
                let keys: Vec<String> = t
                    .iter()?
                    .filter_map(|entry| {
                        let (key, _) = entry.ok()?;
                        let k = key.value().to_string();
                        k.starts_with(&prefix).then_some(k)
                    })
                    .collect();
                for key in &keys {
                    t.remove(key.as_str())?;
                }
            }
        }
        txn.commit()?;
        debug!(session = session_id, "session removed");
        Ok(())
    }

    /// Whether a session header exists.
    pub fn session_exists(&self, session_id: &str) -> StoreResult<bool> {
        Ok(self.get_raw(SESSIONS, session_id)?.is_some())
    }

    /// Insert or update an app record for a session.
    pub fn put_app(&self, session_id: &str, item: &SuiteItem, version: &str) -> StoreResult<()> {
        let app = AppData {
            version: version.to_string(),
            rollout_phase: item.rollout_phase,
            is_deployed: true,
        };
        let value = serde_json::to_vec(&app)?;
        self.put_raw(
            SESSION_APPS,
            &format!("{session_id}/{}", item.name),
            &value,
        )
    }

    /// Remove an app record. Returns true if it existed.
    pub fn delete_app(&self, session_id: &str, name: &str) -> StoreResult<bool> {
        self.delete_raw(SESSION_APPS, &format!("{session_id}/{name}"))
    }

    /// Get an app record, if present.
    pub fn get_app(&self, session_id: &str, name: &str) -> StoreResult<Option<AppData>> {
        match self.get_raw(SESSION_APPS, &format!("{session_id}/{name}"))? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// True iff the session records at least one app.
    pub fn session_has_apps(&self, session_id: &str) -> StoreResult<bool> {
        self.prefix_nonempty(SESSION_APPS, &format!("{session_id}/"))
    }

    pub fn put_endpoint(&self, session_id: &str, name: &str, address: &str) -> StoreResult<()> {
        self.put_raw(
            SESSION_ENDPOINTS,
            &format!("{session_id}/{name}"),
            address.as_bytes(),
        )
    }

    pub fn put_config_change(&self, session_id: &str, change: &ConfigChange) -> StoreResult<()> {
        let value = serde_json::to_vec(change)?;
        self.put_raw(
            SESSION_CONFIG,
            &format!("{session_id}/{}", change.timestamp),
            &value,
        )
    }

    // ── Suites ─────────────────────────────────────────────────────

    /// Store a suite's items under its name.
    pub fn put_suite(&self, name: &str, items: &[SuiteItem]) -> StoreResult<()> {
        let value = serde_json::to_vec(items)?;
        self.put_raw(SUITES, name, &value)
    }

    pub fn get_suite(&self, name: &str) -> StoreResult<Option<Vec<SuiteItem>>> {
        match self.get_raw(SUITES, name)? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    // ── Catalog ────────────────────────────────────────────────────

    /// Store a catalog item under `{group}/{name}`.
    pub fn put_catalog_item(&self, group: &str, item: &CatalogItem) -> StoreResult<()> {
        let value = serde_json::to_vec(item)?;
        self.put_raw(CATALOG, &format!("{group}/{}", item.name), &value)
    }

    pub fn get_catalog_item(&self, group: &str, name: &str) -> StoreResult<Option<CatalogItem>> {
        match self.get_raw(CATALOG, &format!("{group}/{name}"))? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }
}

fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

// ── Session manager over the store ─────────────────────────────────

/// Persistent [`SessionManager`] backed by a [`Store`].
pub struct StoreSessionManager {
    store: Store,
    username: String,
    session_id: RwLock<String>,
}

impl StoreSessionManager {
    pub fn new(store: Store, username: &str) -> Self {
        Self {
            store,
            username: username.to_string(),
            session_id: RwLock::new(String::new()),
        }
    }

    fn active(&self) -> Result<String, SessionError> {
        let id = self.session_id.read().unwrap().clone();
        if id.is_empty() {
            return Err(SessionError::NoActiveSession);
        }
        Ok(id)
    }
}

impl SessionManager for StoreSessionManager {
    fn get_sessions(&self) -> Result<Vec<String>, SessionError> {
        self.store
            .list_sessions()
            .map_err(|e| SessionError::Store(e.to_string()))
    }

    fn create_session_id(&self) -> Result<String, SessionError> {
        Ok(uuid::Uuid::new_v4().to_string())
    }

    fn set_session_id(&self, session_id: &str) {
        debug!(session = session_id, "selecting session");
        *self.session_id.write().unwrap() = session_id.to_string();
    }

    fn register_new_session(&self, session_id: &str) -> Result<(), SessionError> {
        self.set_session_id(session_id);
        self.store
            .register_session(session_id, &self.username)
            .map_err(|e| SessionError::Store(e.to_string()))
    }

    fn remove_session(&self) -> Result<(), SessionError> {
        let id = self.active()?;
        self.store
            .remove_session(&id)
            .map_err(|e| SessionError::Store(e.to_string()))
    }

    fn validate_session(&self) -> Result<bool, SessionError> {
        let id = self.active()?;
        self.store
            .session_exists(&id)
            .map_err(|e| SessionError::Store(e.to_string()))
    }

    fn add_app(&self, item: &SuiteItem, version: &str) -> Result<(), SessionError> {
        let id = self.active()?;
        self.store
            .put_app(&id, item, version)
            .map_err(|e| SessionError::Store(e.to_string()))
    }

    fn remove_app(&self, name: &str) -> Result<(), SessionError> {
        let id = self.active()?;
        self.store
            .delete_app(&id, name)
            .map(|_| ())
            .map_err(|e| SessionError::Store(e.to_string()))
    }

    fn add_endpoint(&self, name: &str, address: &str) -> Result<(), SessionError> {
        let id = self.active()?;
        self.store
            .put_endpoint(&id, name, address)
            .map_err(|e| SessionError::Store(e.to_string()))
    }

    fn add_config_adjustment(
        &self,
        app: &str,
        filename: &str,
        data: &str,
    ) -> Result<(), SessionError> {
        let id = self.active()?;
        let change = ConfigChange {
            app: app.to_string(),
            filename: filename.to_string(),
            data: data.to_string(),
            timestamp: epoch_millis().to_string(),
        };
        self.store
            .put_config_change(&id, &change)
            .map_err(|e| SessionError::Store(e.to_string()))
    }

    fn is_empty(&self) -> Result<bool, SessionError> {
        let id = self.active()?;
        self.store
            .session_has_apps(&id)
            .map(|has| !has)
            .map_err(|e| SessionError::Store(e.to_string()))
    }

    fn get_app_version(&self, name: &str) -> Result<String, SessionError> {
        let id = self.active()?;
        match self
            .store
            .get_app(&id, name)
            .map_err(|e| SessionError::Store(e.to_string()))?
        {
            Some(app) => Ok(app.version),
            None => Err(SessionError::AppNotFound(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, phase: i64) -> SuiteItem {
        SuiteItem {
            name: name.to_string(),
            group: "test".to_string(),
            rollout_phase: phase,
        }
    }

    fn test_store() -> Store {
        Store::open_in_memory().unwrap()
    }

    // ── Session list and headers ───────────────────────────────────

    #[test]
    fn empty_store_lists_no_sessions() {
        let store = test_store();
        assert!(store.list_sessions().unwrap().is_empty());
        assert!(!store.session_exists("nope").unwrap());
    }

    #[test]
    fn register_writes_header_and_list_together() {
        let store = test_store();
        store.register_session("s-1", "tester").unwrap();

        assert_eq!(store.list_sessions().unwrap(), vec!["s-1"]);
        assert!(store.session_exists("s-1").unwrap());
    }

    #[test]
    fn remove_clears_header_list_and_children() {
        let store = test_store();
        store.register_session("s-1", "tester").unwrap();
        store.put_app("s-1", &item("web", 1), "1.0.0").unwrap();
        store.put_endpoint("s-1", "db", "10.0.0.1:5432").unwrap();

        store.remove_session("s-1").unwrap();

        assert!(store.list_sessions().unwrap().is_empty());
        assert!(!store.session_exists("s-1").unwrap());
        assert!(!store.session_has_apps("s-1").unwrap());
    }

    #[test]
    fn remove_leaves_other_sessions_alone() {
        let store = test_store();
        store.register_session("s-1", "tester").unwrap();
        store.register_session("s-2", "tester").unwrap();
        store.put_app("s-1", &item("web", 1), "1.0.0").unwrap();
        store.put_app("s-2", &item("web", 1), "2.0.0").unwrap();

        store.remove_session("s-1").unwrap();

        assert_eq!(store.list_sessions().unwrap(), vec!["s-2"]);
        assert!(store.session_has_apps("s-2").unwrap());
        assert_eq!(store.get_app("s-2", "web").unwrap().unwrap().version, "2.0.0");
    }

    // ── Apps ───────────────────────────────────────────────────────

    #[test]
    fn app_put_get_delete() {
        let store = test_store();
        store.register_session("s-1", "tester").unwrap();

        store.put_app("s-1", &item("web", 2), "1.2.3").unwrap();
        let app = store.get_app("s-1", "web").unwrap().unwrap();
        assert_eq!(app.version, "1.2.3");
        assert_eq!(app.rollout_phase, 2);
        assert!(app.is_deployed);

        assert!(store.delete_app("s-1", "web").unwrap());
        assert!(!store.delete_app("s-1", "web").unwrap());
        assert!(store.get_app("s-1", "web").unwrap().is_none());
    }

    #[test]
    fn app_prefix_does_not_leak_across_sessions() {
        let store = test_store();
        store.put_app("s-1", &item("web", 1), "1.0.0").unwrap();

        assert!(store.session_has_apps("s-1").unwrap());
        assert!(!store.session_has_apps("s-11").unwrap());
        assert!(!store.session_has_apps("s").unwrap());
    }

    // ── Suites and catalog ─────────────────────────────────────────

    #[test]
    fn suite_roundtrip() {
        let store = test_store();
        let items = vec![item("web", 0), item("api", 1)];
        store.put_suite("prod", &items).unwrap();

        assert_eq!(store.get_suite("prod").unwrap().unwrap(), items);
        assert!(store.get_suite("staging").unwrap().is_none());
    }

    #[test]
    fn catalog_roundtrip() {
        let store = test_store();
        let entry = CatalogItem {
            name: "web".to_string(),
            version: "1.0.0".to_string(),
            helm_chart: "web-1.0.0.tgz".to_string(),
        };
        store.put_catalog_item("frontend", &entry).unwrap();

        assert_eq!(
            store.get_catalog_item("frontend", "web").unwrap().unwrap(),
            entry
        );
        // Group is part of the key.
        assert!(store.get_catalog_item("backend", "web").unwrap().is_none());
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("qtm.redb");

        {
            let store = Store::open(&db_path).unwrap();
            store.register_session("s-1", "tester").unwrap();
            store.put_app("s-1", &item("web", 1), "1.0.0").unwrap();
        }

        let store = Store::open(&db_path).unwrap();
        assert_eq!(store.list_sessions().unwrap(), vec!["s-1"]);
        assert_eq!(store.get_app("s-1", "web").unwrap().unwrap().version, "1.0.0");
    }

    // ── StoreSessionManager ────────────────────────────────────────

    #[test]
    fn manager_full_lifecycle() {
        let sm = StoreSessionManager::new(test_store(), "tester");
        let id = sm.create_session_id().unwrap();
        sm.register_new_session(&id).unwrap();

        assert!(sm.validate_session().unwrap());
        assert!(sm.is_empty().unwrap());

        sm.add_app(&item("web", 1), "1.0.0").unwrap();
        sm.add_app(&item("api", 1), "2.0.0").unwrap();
        assert!(!sm.is_empty().unwrap());
        assert_eq!(sm.get_app_version("api").unwrap(), "2.0.0");

        sm.remove_app("web").unwrap();
        sm.remove_app("api").unwrap();
        assert!(sm.is_empty().unwrap());

        sm.remove_session().unwrap();
        assert!(!sm.validate_session().unwrap());
        assert!(sm.get_sessions().unwrap().is_empty());
    }

    #[test]
    fn manager_requires_active_session() {
        let sm = StoreSessionManager::new(test_store(), "tester");
        assert!(matches!(
            sm.add_app(&item("web", 1), "1.0.0"),
            Err(SessionError::NoActiveSession)
        ));
        assert!(matches!(sm.is_empty(), Err(SessionError::NoActiveSession)));
    }

    #[test]
    fn manager_endpoints_and_config() {
        let sm = StoreSessionManager::new(test_store(), "tester");
        sm.register_new_session("s-1").unwrap();
        sm.add_endpoint("db", "10.0.0.1:5432").unwrap();
        sm.add_config_adjustment("web", "app.yaml", "replicas: 3")
            .unwrap();
        // Remove sweeps child rows without error.
        sm.remove_session().unwrap();
    }

    #[test]
    fn manager_missing_app_version() {
        let sm = StoreSessionManager::new(test_store(), "tester");
        sm.register_new_session("s-1").unwrap();
        assert!(matches!(
            sm.get_app_version("ghost"),
            Err(SessionError::AppNotFound(_))
        ));
    }
}
