//! Allotment engine orchestrating IPO draws
//!
//! The AllotmentEngine is the main entry point for running a draw. It
//! coordinates the eligibility tracker, the lottery, allotment storage and
//! outcome publication.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::adapters::directory::ApplicationDirectory;
use crate::adapters::publisher::OutcomePublisher;
use crate::adapters::store::AllotmentStore;
use crate::allotment::AllotmentRecord;
use crate::applicant::IpoId;
use crate::config::{AllotmentConfig, DrawConfig};
use crate::eligibility::tracker::{EligibilityTracker, Transition};
use crate::eligibility::validator::DrawValidator;
use crate::error::{AllotError, AllotResult};
use crate::event::EligibilityEvent;
use crate::lottery;

/// Allotment engine configuration
#[derive(Debug, Clone)]
pub struct AllotmentEngineConfig {
    /// Validate the eligible set before drawing
    pub enable_validation: bool,
    /// Seed and lot limits
    pub draw: DrawConfig,
}

impl Default for AllotmentEngineConfig {
    fn default() -> Self {
        Self {
            enable_validation: true,
            draw: DrawConfig::default(),
        }
    }
}

impl From<&AllotmentConfig> for AllotmentEngineConfig {
    fn from(config: &AllotmentConfig) -> Self {
        Self {
            enable_validation: true,
            draw: config.draw.clone(),
        }
    }
}

/// Manually requested draw
///
/// Share counts arrive signed from callers and are checked before the draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualTrigger {
    /// IPO identifier
    pub ipo_id: String,
    /// Shares available to the draw
    pub total_shares: i64,
}

/// Allotment engine
pub struct AllotmentEngine {
    /// Eligibility tracker
    tracker: Arc<EligibilityTracker>,

    /// Allotment storage
    store: Arc<dyn AllotmentStore>,

    /// Outcome publisher
    publisher: Arc<dyn OutcomePublisher>,

    /// Draw validator
    validator: DrawValidator,

    /// Serializes draws per IPO
    ///
    /// An entry lives until the IPO's record is stored and published.
    ipo_locks: DashMap<IpoId, Arc<Mutex<()>>>,

    /// Configuration
    config: AllotmentEngineConfig,
}

impl AllotmentEngine {
    /// Create a new allotment engine with its own tracker
    pub fn new(
        config: AllotmentEngineConfig,
        directory: Arc<dyn ApplicationDirectory>,
        store: Arc<dyn AllotmentStore>,
        publisher: Arc<dyn OutcomePublisher>,
    ) -> Self {
        let validator = DrawValidator::custom(config.draw.max_lots_per_applicant);
        let tracker = EligibilityTracker::new(directory).with_validator(validator.clone());

        Self::with_tracker(config, Arc::new(tracker), store, publisher)
    }

    /// Create an engine around an existing tracker
    pub fn with_tracker(
        config: AllotmentEngineConfig,
        tracker: Arc<EligibilityTracker>,
        store: Arc<dyn AllotmentStore>,
        publisher: Arc<dyn OutcomePublisher>,
    ) -> Self {
        Self {
            tracker,
            store,
            publisher,
            validator: DrawValidator::custom(config.draw.max_lots_per_applicant),
            ipo_locks: DashMap::new(),
            config,
        }
    }

    /// Run the draw for an IPO
    ///
    /// # Returns
    /// * `Ok(record)` - Draw persisted and published
    /// * `Err(AllotError::AlreadyDrawn)` - IPO has a record; nothing changed
    /// * `Err(AllotError::PersistenceFailure)` - Nothing stored or published
    /// * `Err(AllotError::PublicationFailure)` - Record stored, event still owed
    pub async fn run_allotment(
        &self,
        ipo_id: &IpoId,
        total_shares: u64,
    ) -> AllotResult<AllotmentRecord> {
        let lock = self.ipo_lock(ipo_id);
        let _guard = lock.lock().await;

        if self.store.get(ipo_id).await?.is_some() {
            info!("IPO {} already drawn, skipping", ipo_id);
            return Err(AllotError::AlreadyDrawn {
                ipo_id: ipo_id.clone(),
            });
        }

        let entries = self.tracker.list_eligible(ipo_id);

        if self.config.enable_validation {
            debug!("Validating {} eligible entries for IPO {}", entries.len(), ipo_id);
            self.validator.validate_draw(ipo_id, &entries)?;
        }

        if entries.is_empty() {
            warn!("No eligible applicants for IPO {}", ipo_id);
        }

        let seed = self.config.draw.seed_for(ipo_id);
        let winners = lottery::select_winners(&entries, total_shares, &seed);
        let record =
            AllotmentRecord::from_draw(ipo_id.clone(), seed, total_shares, &entries, &winners);

        info!(
            "Drew IPO {}: {} winners, {} non-winners, {} shares",
            ipo_id,
            record.winner_application_ids.len(),
            record.non_winner_application_ids.len(),
            total_shares
        );

        match self.store.create_if_absent(&record).await {
            Ok(()) => {}
            Err(e @ AllotError::AlreadyDrawn { .. }) => {
                info!("IPO {} was drawn by another writer, discarding", ipo_id);
                return Err(e);
            }
            Err(e) => {
                error!("Failed to persist allotment for IPO {}: {}", ipo_id, e);
                return Err(e);
            }
        }

        let changed = self.tracker.mark_drawn(&record);
        debug!("Updated {} tracker entries for IPO {}", changed, ipo_id);

        self.publish(&record).await?;
        self.release_lock(ipo_id);

        Ok(record)
    }

    /// Run a manually requested draw
    pub async fn trigger(&self, request: ManualTrigger) -> AllotResult<AllotmentRecord> {
        if request.ipo_id.trim().is_empty() {
            return Err(AllotError::InvalidInput(
                "IPO ID cannot be empty".to_string(),
            ));
        }

        let total_shares = self.validator.validate_shares(request.total_shares)?;
        info!(
            "Manual draw requested for IPO {} with {} shares",
            request.ipo_id, total_shares
        );

        self.run_allotment(&IpoId::new(request.ipo_id), total_shares)
            .await
    }

    /// Finish every persisted draw whose outcome was never published
    ///
    /// Returns the number of records published. Records that fail again stay
    /// pending for the next call.
    pub async fn recover_unpublished(&self) -> AllotResult<usize> {
        let pending = self.store.list_unpublished().await?;
        if pending.is_empty() {
            return Ok(0);
        }

        info!("Recovering {} unpublished allotments", pending.len());
        let mut recovered = 0;

        for record in pending {
            let lock = self.ipo_lock(&record.ipo_id);
            let _guard = lock.lock().await;

            // A concurrent draw may have published while we waited
            let still_pending = self
                .store
                .list_unpublished()
                .await?
                .iter()
                .any(|r| r.ipo_id == record.ipo_id);
            if !still_pending {
                continue;
            }

            self.tracker.mark_drawn(&record);

            match self.publish(&record).await {
                Ok(()) => {
                    self.release_lock(&record.ipo_id);
                    recovered += 1;
                }
                Err(e) => warn!("Allotment for IPO {} still unpublished: {}", record.ipo_id, e),
            }
        }

        Ok(recovered)
    }

    /// Get the persisted draw for an IPO
    pub async fn get_allotment(&self, ipo_id: &IpoId) -> AllotResult<Option<AllotmentRecord>> {
        self.store.get(ipo_id).await
    }

    /// Recompute a persisted draw and compare it with the stored winners
    pub async fn verify_allotment(&self, ipo_id: &IpoId) -> AllotResult<bool> {
        let record = self
            .store
            .get(ipo_id)
            .await?
            .ok_or_else(|| AllotError::InvalidInput(format!("IPO {} has not been drawn", ipo_id)))?;

        let matches = record.is_consistent() && lottery::replay(&record);
        if !matches {
            error!("Allotment for IPO {} does not replay", ipo_id);
        }
        Ok(matches)
    }

    /// Apply a mandate or application event
    pub async fn handle_event(&self, event: EligibilityEvent) -> AllotResult<Transition> {
        self.tracker.handle_event(event).await
    }

    /// Get eligibility tracker (for advanced usage)
    pub fn tracker(&self) -> &Arc<EligibilityTracker> {
        &self.tracker
    }

    fn ipo_lock(&self, ipo_id: &IpoId) -> Arc<Mutex<()>> {
        self.ipo_locks
            .entry(ipo_id.clone())
            .or_default()
            .value()
            .clone()
    }

    /// Drop the IPO's lock once its record is stored and published
    ///
    /// Callers still holding the old handle find the record in the store and
    /// return without side effects.
    fn release_lock(&self, ipo_id: &IpoId) {
        self.ipo_locks.remove(ipo_id);
    }

    async fn publish(&self, record: &AllotmentRecord) -> AllotResult<()> {
        let ipo_id = &record.ipo_id;

        if let Err(e) = self.publisher.publish(&record.outcome()).await {
            error!("Failed to publish allotment for IPO {}: {}", ipo_id, e);
            return Err(Self::publication_failure(ipo_id, e));
        }

        if let Err(e) = self.store.mark_published(ipo_id).await {
            error!("Published IPO {} but could not record it: {}", ipo_id, e);
            return Err(Self::publication_failure(ipo_id, e));
        }

        info!("Published allotment for IPO {}", ipo_id);
        Ok(())
    }

    fn publication_failure(ipo_id: &IpoId, err: AllotError) -> AllotError {
        if err.is_recoverable_partial() {
            return err;
        }

        AllotError::PublicationFailure {
            ipo_id: ipo_id.clone(),
            message: err.to_string(),
        }
    }
}
