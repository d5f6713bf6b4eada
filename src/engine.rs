//! Engine assembly and lifecycle
//!
//! `PollEngine` wires the validated tag layouts, the conversion catalog, the
//! controller link, and the event sink together; `start` spawns the
//! reconnect loop, the poll cycle, and the dispatch workers, returning a
//! handle that supervising code uses to observe the engine and shut it down
//! cleanly.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::binder::ModelBinder;
use crate::config::{EngineConfig, TagRecord};
use crate::convert::ConversionCatalog;
use crate::error::{PlcPollError, Result};
use crate::events::{ChangeDetector, EventSink};
use crate::layout::{build_layouts, BlockLayout};
use crate::link::{ConnectionManager, ConnectionState, PlcLink, ReconnectPolicy};
use crate::model::ReelState;
use crate::poller::BlockPoller;

/// The register polling and tag-binding engine for one device
pub struct PollEngine {
    config: EngineConfig,
    layouts: Arc<Vec<BlockLayout>>,
    catalog: Arc<ConversionCatalog>,
    manager: ConnectionManager,
    state: Arc<RwLock<ReelState>>,
    sink: Arc<dyn EventSink>,
}

impl PollEngine {
    /// Validate the tag table against the catalog and assemble the engine.
    ///
    /// Fails fast on any configuration problem; nothing is validated again
    /// per cycle.
    pub fn new(
        config: EngineConfig,
        tags: &[TagRecord],
        catalog: ConversionCatalog,
        link: Box<dyn PlcLink>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let layouts = build_layouts(tags, &config.plc.blocks, &catalog)?;
        if layouts.is_empty() {
            return Err(PlcPollError::config(
                "tag table produced no register block layouts",
            ));
        }

        let manager = ConnectionManager::new(
            link,
            config.plc.clone(),
            ReconnectPolicy::from(&config.reconnect),
        );

        Ok(Self {
            config,
            layouts: Arc::new(layouts),
            catalog: Arc::new(catalog),
            manager,
            state: Arc::new(RwLock::new(ReelState::default())),
            sink,
        })
    }

    /// Layouts the engine will poll, in block order
    pub fn layouts(&self) -> &[BlockLayout] {
        &self.layouts
    }

    /// Spawn the reconnect loop, the poll cycle, and the dispatch workers.
    pub fn start(self) -> EngineHandle {
        let token = CancellationToken::new();

        let (detector, workers) =
            ChangeDetector::spawn(Arc::clone(&self.sink), self.config.polling.dispatch_queue);

        let mut tasks = Vec::with_capacity(workers.len() + 2);
        tasks.push(self.manager.spawn_reconnect_loop(token.clone()));

        let poller = BlockPoller {
            manager: self.manager.clone(),
            layouts: Arc::clone(&self.layouts),
            binder: ModelBinder::new(Arc::clone(&self.catalog)),
            state: Arc::clone(&self.state),
            detector,
            interval: Duration::from_millis(self.config.polling.interval_ms),
            stats_every: self.config.polling.stats_every,
        };
        tasks.push(poller.spawn(token.clone()));
        tasks.extend(workers);

        info!(
            address = %self.config.plc.address,
            blocks = self.layouts.len(),
            "engine started"
        );

        EngineHandle {
            token,
            tasks,
            state: self.state,
            manager: self.manager,
        }
    }
}

/// Handle over a running engine
pub struct EngineHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    state: Arc<RwLock<ReelState>>,
    manager: ConnectionManager,
}

impl EngineHandle {
    /// Clone of the current model state
    pub fn snapshot(&self) -> ReelState {
        self.state.read().clone()
    }

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Stop both periodic tasks, let the dispatch workers drain, and close
    /// the controller link.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        for task in self.tasks.drain(..) {
            // A panicked task must not wedge shutdown of the others
            let _ = task.await;
        }
        self.manager.disconnect().await;
        info!("engine stopped");
    }
}
