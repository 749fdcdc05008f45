// Table orchestration for spawning and managing authoritative table loops.

use super::authority::AuthoritySettings;
use super::replication::BroadcastReplication;
use super::table::{TableTaskContext, table_task};
use super::types::{PoseBatch, ReliableEvent, TableEvent, TableSnapshot};
use crate::domain::{CollisionQuery, NetworkClock, OwnershipRules};
use axum::extract::ws::Utf8Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock, broadcast, mpsc, watch};
use tracing::info;

pub type SharedCollision = Arc<dyn CollisionQuery + Send + Sync>;

/// Shared configuration for spawning table loops.
#[derive(Debug, Clone)]
pub struct TableSettings {
    /// Capacity for inbound participant events.
    pub input_channel_capacity: usize,
    /// Capacity for pose and reliable broadcasts.
    pub broadcast_capacity: usize,
    /// Fixed tick interval for the authority loop.
    pub tick_interval: Duration,
    /// Defaults applied to tables created without overrides.
    pub authority: AuthoritySettings,
}

/// Errors returned by table registry operations.
#[derive(Debug, PartialEq, Eq)]
pub enum TableError {
    /// Table already exists and cannot be re-created.
    AlreadyExists,
}

/// Per-table channels.
#[derive(Clone)]
pub struct TableHandle {
    /// Identifier clients use to target this table.
    pub table_id: Arc<str>,
    /// Sender for events into the table loop.
    pub input_tx: mpsc::Sender<TableEvent>,
    /// Broadcast sender for raw per-tick pose batches.
    pub pose_tx: broadcast::Sender<PoseBatch>,
    /// Broadcast sender for raw reliable events.
    pub reliable_tx: broadcast::Sender<ReliableEvent>,
    /// Broadcast sender for serialized pose batches.
    pub pose_bytes_tx: broadcast::Sender<Utf8Bytes>,
    /// Broadcast sender for serialized reliable events.
    pub reliable_bytes_tx: broadcast::Sender<Utf8Bytes>,
    /// Watch sender holding the latest full table state.
    pub table_state_tx: watch::Sender<TableSnapshot>,
    /// Ownership rules the table loop runs with.
    pub ownership: OwnershipRules,
    shutdown: Arc<Notify>,
}

/// Thread-safe registry for active tables.
pub struct TableRegistry {
    /// Global settings applied to newly created tables.
    settings: TableSettings,
    /// Time base shared by every table loop.
    clock: Arc<dyn NetworkClock>,
    /// Map of table id to active handle.
    tables: RwLock<HashMap<String, TableHandle>>,
}

impl TableRegistry {
    /// Creates a new registry with the provided settings.
    pub fn new(settings: TableSettings, clock: Arc<dyn NetworkClock>) -> Self {
        Self {
            settings,
            clock,
            tables: RwLock::new(HashMap::new()),
        }
    }

    pub fn clock(&self) -> &Arc<dyn NetworkClock> {
        &self.clock
    }

    pub fn default_ownership(&self) -> OwnershipRules {
        self.settings.authority.ownership
    }

    /// Creates a new table and spawns its authority loop.
    pub async fn create_table(
        &self,
        table_id: String,
        collision: SharedCollision,
        ownership: Option<OwnershipRules>,
    ) -> Result<TableHandle, TableError> {
        let mut tables = self.tables.write().await;
        if tables.contains_key(&table_id) {
            return Err(TableError::AlreadyExists);
        }

        let mut authority = self.settings.authority;
        if let Some(ownership) = ownership {
            authority.ownership = ownership;
        }

        // Channel wiring for the table loop.
        let capacity = self.settings.broadcast_capacity;
        let (input_tx, input_rx) = mpsc::channel::<TableEvent>(self.settings.input_channel_capacity);
        let (pose_tx, _pose_rx) = broadcast::channel::<PoseBatch>(capacity);
        let (reliable_tx, _reliable_rx) = broadcast::channel::<ReliableEvent>(capacity);
        let (pose_bytes_tx, _pose_bytes_rx) = broadcast::channel::<Utf8Bytes>(capacity);
        let (reliable_bytes_tx, _reliable_bytes_rx) = broadcast::channel::<Utf8Bytes>(capacity);
        let (table_state_tx, _table_state_rx) = watch::channel(TableSnapshot::default());
        let shutdown = Arc::new(Notify::new());

        // Spawn the authoritative loop for this table.
        tokio::spawn(table_task(TableTaskContext {
            input_rx,
            replication: BroadcastReplication::new(pose_tx.clone(), reliable_tx.clone()),
            table_state_tx: table_state_tx.clone(),
            collision,
            clock: self.clock.clone(),
            settings: authority,
            tick_interval: self.settings.tick_interval,
            shutdown: shutdown.clone(),
        }));

        let table = TableHandle {
            table_id: Arc::from(table_id.clone()),
            input_tx,
            pose_tx,
            reliable_tx,
            pose_bytes_tx,
            reliable_bytes_tx,
            table_state_tx,
            ownership: authority.ownership,
            shutdown,
        };

        info!(table_id = %table_id, policy = ?authority.ownership.policy, "table created");
        tables.insert(table_id, table.clone());
        Ok(table)
    }

    /// Returns a table handle for the provided id, if it exists.
    pub async fn get_table(&self, table_id: &str) -> Option<TableHandle> {
        let tables = self.tables.read().await;
        tables.get(table_id).cloned()
    }

    /// Stops the table loop and forgets the table.
    pub async fn remove_table(&self, table_id: &str) -> bool {
        let mut tables = self.tables.write().await;
        match tables.remove(table_id) {
            Some(table) => {
                table.shutdown.notify_one();
                info!(table_id = %table_id, "table removed");
                true
            }
            None => false,
        }
    }
}
