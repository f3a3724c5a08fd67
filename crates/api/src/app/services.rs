use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};
use tracing::info;

use pansoft_infra::{AppConfig, MemoryStore, PostgresStore, Store, StoreBackend, StoreResult};
use pansoft_inventory::{Movement, StockPolicy};

/// Capacity of the realtime channel; slow subscribers lose the oldest messages.
const REALTIME_CAPACITY: usize = 256;

/// Realtime message broadcasted via SSE.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RealtimeMessage {
    pub topic: String,
    pub payload: serde_json::Value,
}

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppServices {
    store: Arc<dyn Store>,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
}

impl AppServices {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let (realtime_tx, _) = broadcast::channel(REALTIME_CAPACITY);
        Self { store, realtime_tx }
    }

    /// In-memory services for development and tests.
    pub fn in_memory(policy: StockPolicy) -> Self {
        Self::new(Arc::new(MemoryStore::new(policy)))
    }

    /// Open the store selected by `config`.
    pub async fn from_config(config: &AppConfig) -> StoreResult<Self> {
        match &config.store {
            StoreBackend::Memory => {
                info!("using in-memory store");
                Ok(Self::in_memory(config.stock_policy))
            }
            StoreBackend::Postgres {
                database_url,
                max_connections,
            } => {
                let store =
                    PostgresStore::connect(database_url, *max_connections, config.stock_policy)
                        .await?;
                Ok(Self::new(Arc::new(store)))
            }
        }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn realtime_tx(&self) -> broadcast::Sender<RealtimeMessage> {
        self.realtime_tx.clone()
    }

    /// Broadcast to SSE subscribers. Lossy: no subscribers is not an error.
    pub fn publish(&self, topic: &str, payload: serde_json::Value) {
        let _ = self.realtime_tx.send(RealtimeMessage {
            topic: topic.to_string(),
            payload,
        });
    }

    pub fn publish_movements(&self, movements: &[Movement]) {
        for m in movements {
            match serde_json::to_value(m) {
                Ok(payload) => self.publish("inventory.movement_recorded", payload),
                Err(e) => tracing::warn!(error = %e, "failed to encode movement"),
            }
        }
    }
}

pub fn sse_stream(
    services: Arc<AppServices>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(m) => {
            let data = serde_json::to_string(&m.payload).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(m.topic).data(data)))
        }
        // Lagged receivers skip what they missed.
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
