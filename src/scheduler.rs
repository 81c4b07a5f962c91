use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::adapters::directory::ApplicationDirectory;
use crate::applicant::IpoId;
use crate::config::{ScheduledDraw, SchedulerConfig};
use crate::engine::AllotmentEngine;
use crate::error::{AllotError, AllotResult};

/// Summary of one scheduler tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleReport {
    /// IPOs drawn during this tick
    pub drawn: Vec<IpoId>,
    /// IPOs found already drawn
    pub already_drawn: Vec<IpoId>,
    /// IPOs whose draw will be retried next tick
    pub failed: Vec<IpoId>,
    /// Entries materialized from the approved-application listing
    pub backfilled: usize,
    /// Previously persisted outcomes published during this tick
    pub recovered: usize,
}

/// Deadline-driven draw scheduler
pub struct AllotmentScheduler {
    engine: Arc<AllotmentEngine>,
    directory: Arc<dyn ApplicationDirectory>,
    config: SchedulerConfig,
    completed: Mutex<HashSet<IpoId>>,
}

impl AllotmentScheduler {
    /// Create a new allotment scheduler
    pub fn new(
        engine: Arc<AllotmentEngine>,
        directory: Arc<dyn ApplicationDirectory>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            engine,
            directory,
            config,
            completed: Mutex::new(HashSet::new()),
        }
    }

    /// Start the scheduler (runs in background)
    pub async fn start(self) {
        info!(
            "Starting allotment scheduler (interval: {} seconds, {} draws)",
            self.config.tick_interval_sec,
            self.config.draws.len()
        );

        let mut ticker = interval(self.config.tick_interval());

        loop {
            ticker.tick().await;

            match self.run_once(Utc::now()).await {
                Ok(report) => {
                    if !report.drawn.is_empty() || !report.failed.is_empty() {
                        info!(
                            "Scheduler tick: {} drawn, {} failed, {} backfilled",
                            report.drawn.len(),
                            report.failed.len(),
                            report.backfilled
                        );
                    }
                }
                Err(e) => {
                    error!("Scheduler tick failed: {}", e);
                }
            }
        }
    }

    /// Run one tick as of `now` (for testing or manual execution)
    pub async fn run_once(&self, now: DateTime<Utc>) -> AllotResult<ScheduleReport> {
        let mut report = ScheduleReport {
            recovered: self.engine.recover_unpublished().await?,
            ..ScheduleReport::default()
        };

        for draw in &self.config.draws {
            if draw.draw_at > now || self.completed.lock().contains(&draw.ipo_id) {
                continue;
            }

            debug!("Draw for IPO {} is due", draw.ipo_id);

            if self.config.reconcile_approved {
                match self.reconcile(&draw.ipo_id).await {
                    Ok(count) => report.backfilled += count,
                    Err(e) => {
                        warn!(
                            "Postponing draw for IPO {}, approved listing failed: {}",
                            draw.ipo_id, e
                        );
                        report.failed.push(draw.ipo_id.clone());
                        continue;
                    }
                }
            }

            self.run_draw(draw, &mut report).await;
        }

        Ok(report)
    }

    /// Whether a configured draw has completed
    pub fn is_completed(&self, ipo_id: &IpoId) -> bool {
        self.completed.lock().contains(ipo_id)
    }

    async fn run_draw(&self, draw: &ScheduledDraw, report: &mut ScheduleReport) {
        match self.engine.run_allotment(&draw.ipo_id, draw.total_shares).await {
            Ok(_) => {
                self.completed.lock().insert(draw.ipo_id.clone());
                report.drawn.push(draw.ipo_id.clone());
            }
            Err(AllotError::AlreadyDrawn { ipo_id }) => {
                self.completed.lock().insert(ipo_id.clone());
                report.already_drawn.push(ipo_id);
            }
            Err(e) if e.is_recoverable_partial() => {
                // Persisted; publication is retried by recovery on the next tick
                warn!("Draw for IPO {} persisted but unpublished: {}", draw.ipo_id, e);
                self.completed.lock().insert(draw.ipo_id.clone());
                report.drawn.push(draw.ipo_id.clone());
            }
            Err(e) => {
                error!("Scheduled draw for IPO {} failed: {}", draw.ipo_id, e);
                report.failed.push(draw.ipo_id.clone());
            }
        }
    }

    async fn reconcile(&self, ipo_id: &IpoId) -> AllotResult<usize> {
        let approved = self.directory.list_approved_applications(ipo_id).await?;
        let tracker = self.engine.tracker();
        let mut created = 0;

        for application_id in approved {
            match tracker.backfill(&application_id).await {
                Ok(transition) if transition.is_mutation() => created += 1,
                Ok(_) => {}
                Err(e) => warn!("Could not backfill application {}: {}", application_id, e),
            }
        }

        if created > 0 {
            info!("Backfilled {} approved applications for IPO {}", created, ipo_id);
        }
        Ok(created)
    }
}
