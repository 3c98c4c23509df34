use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::{infrastructure::state::AppState, services::export_jobs};

/// Spawns the export job worker (the single-consumer pull loop).
/// Thin wrapper kept at this module path so process wiring in `main.rs`
/// reads the same way regardless of which worker is running.
pub fn spawn_export_worker(state: Arc<AppState>) -> JoinHandle<()> {
    export_jobs::spawn_worker(state)
}
