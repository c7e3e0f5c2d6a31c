//! Table layout of the qtm store.
//!
//! String keys, JSON byte values. Rows belonging to a session carry
//! `{session_id}/{child}` keys, so one prefix scan sweeps everything
//! that session owns; suites and catalog entries sit in their own
//! tables beside the session log.

use redb::TableDefinition;

/// The session list, a single row: `sessionList` → JSON set of IDs.
pub const SESSION_LIST: TableDefinition<&str, &[u8]> = TableDefinition::new("session_list");

/// Session headers keyed by `{session_id}`.
pub const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");

/// Deployed apps keyed by `{session_id}/{app_name}`.
pub const SESSION_APPS: TableDefinition<&str, &[u8]> = TableDefinition::new("session_apps");

/// Endpoints keyed by `{session_id}/{endpoint_name}` (UTF-8 address).
pub const SESSION_ENDPOINTS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("session_endpoints");

/// Config changes keyed by `{session_id}/{timestamp}`.
pub const SESSION_CONFIG: TableDefinition<&str, &[u8]> =
    TableDefinition::new("session_config_changes");

/// Suites keyed by `{suite_name}` (JSON list of suite items).
pub const SUITES: TableDefinition<&str, &[u8]> = TableDefinition::new("suites");

/// Catalog items keyed by `{group}/{app_name}`.
pub const CATALOG: TableDefinition<&str, &[u8]> = TableDefinition::new("catalog");

/// The single key under [`SESSION_LIST`].
pub const SESSION_LIST_KEY: &str = "sessionList";
