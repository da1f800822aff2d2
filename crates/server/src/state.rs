//! Shared server state

use std::sync::Mutex;

use tavern_core::{Database, Result};
use tokio::sync::broadcast;

use crate::config::ServerConfig;

/// Capacity of the chat broadcast channel
const BROADCAST_CAPACITY: usize = 100;

/// Shared application state, one per server process
pub struct AppState {
    /// SQLite handle; queries are short and never held across an await
    pub db: Mutex<Database>,
    /// Fan-out channel carrying serialized chat frames
    pub chat_tx: broadcast::Sender<String>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let db_path = config.resolved_database_path()?;

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path)?;
        Ok(Self::with_database(db, config))
    }

    /// Build state around an existing database (used by tests)
    pub fn with_database(db: Database, config: ServerConfig) -> Self {
        let (chat_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            db: Mutex::new(db),
            chat_tx,
            config,
        }
    }

    /// Number of clients currently subscribed to the chat stream
    pub fn connection_count(&self) -> usize {
        self.chat_tx.receiver_count()
    }
}
