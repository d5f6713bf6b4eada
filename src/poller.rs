//! Buffer polling
//!
//! One task per device reads every register block on a fixed cadence while
//! the link is online, hands the buffers to the model binder, and runs the
//! change detector afterwards. The loop body is sequential and missed ticks
//! are skipped, so two cycles can never run against the model concurrently.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::binder::{BindReport, ModelBinder};
use crate::events::ChangeDetector;
use crate::layout::BlockLayout;
use crate::link::{ConnectionManager, ConnectionState, LINK_OK};
use crate::model::ReelState;

/// Counters accumulated across poll cycles
#[derive(Debug, Default, Clone, Copy)]
struct PollStats {
    cycles: u64,
    skipped_offline: u64,
    read_failures: u64,
    tags_bound: u64,
    tags_failed: u64,
}

/// The per-device poll cycle task
pub(crate) struct BlockPoller {
    pub manager: ConnectionManager,
    pub layouts: Arc<Vec<BlockLayout>>,
    pub binder: ModelBinder,
    pub state: Arc<RwLock<ReelState>>,
    pub detector: ChangeDetector,
    pub interval: Duration,
    pub stats_every: u64,
}

impl BlockPoller {
    pub fn spawn(mut self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            // One reusable buffer per block, sized once from the layout
            let mut buffers: Vec<Vec<u8>> = self
                .layouts
                .iter()
                .map(|layout| vec![0u8; layout.buffer_len])
                .collect();

            let mut stats = PollStats::default();
            info!(
                blocks = self.layouts.len(),
                interval_ms = self.interval.as_millis() as u64,
                "poll task started"
            );

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {},
                }

                self.run_cycle(&mut buffers, &mut stats).await;

                if self.stats_every > 0 && stats.cycles % self.stats_every == 0 {
                    info!(
                        cycles = stats.cycles,
                        skipped_offline = stats.skipped_offline,
                        read_failures = stats.read_failures,
                        tags_bound = stats.tags_bound,
                        tags_failed = stats.tags_failed,
                        "poll statistics"
                    );
                }
            }
            debug!("poll task stopped");
        })
    }

    async fn run_cycle(&mut self, buffers: &mut [Vec<u8>], stats: &mut PollStats) {
        stats.cycles += 1;

        if self.manager.state() != ConnectionState::Online {
            stats.skipped_offline += 1;
            debug!("link not online, poll cycle skipped");
            return;
        }

        let link = self.manager.link();
        let mut report = BindReport::default();

        for (layout, buf) in self.layouts.iter().zip(buffers.iter_mut()) {
            let code = {
                let mut link = link.lock().await;
                let code = link.read_block(layout.db, 0, buf).await;
                if code != LINK_OK {
                    warn!(
                        db = layout.db,
                        code,
                        "block read failed: {}",
                        link.error_text(code)
                    );
                }
                code
            };

            if code != LINK_OK {
                stats.read_failures += 1;
                self.manager.mark_read_error();
                // Model fields from this block keep their previous values
                continue;
            }

            let mut state = self.state.write();
            report.merge(self.binder.bind_block(&mut state, layout, buf));
        }

        stats.tags_bound += report.bound as u64;
        stats.tags_failed += report.failed as u64;

        let snapshot = self.state.read().clone();
        self.detector.observe(&snapshot);
    }
}
