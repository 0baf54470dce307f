//! Persistence layer: PostgreSQL write-through store and event log.
//!
//! In-memory state stays authoritative while the process runs; every
//! mutation is written through to PostgreSQL and the whole state is
//! reloaded at startup. Bus events are appended to the `events` table by
//! a background task.

pub mod models;
pub mod postgres;

pub use models::PersistedState;
pub use postgres::PostgresPersistence;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::domain::EventBus;

/// Spawns a task that appends every bus event to the event log.
///
/// Ends when the bus is dropped.
#[must_use]
pub fn spawn_event_log(persistence: PostgresPersistence, event_bus: &EventBus) -> JoinHandle<()> {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let payload = match serde_json::to_value(&event) {
                        Ok(payload) => payload,
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to encode event");
                            continue;
                        }
                    };
                    let root = event.root().to_string();
                    if let Err(e) = persistence
                        .save_event(&root, event.event_type_str(), &payload)
                        .await
                    {
                        tracing::warn!(error = %e, event_type = event.event_type_str(), "failed to log event");
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "event log lagged behind the bus");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
