use crate::use_cases::{SharedCollision, TableRegistry};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    // Active tables and their loops.
    pub table_registry: Arc<TableRegistry>,
    // Table used when a client connects without a table id.
    pub default_table_id: Arc<str>,
    // Scenery shared by tables created over HTTP.
    pub scene: SharedCollision,
}
