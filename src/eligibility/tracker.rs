//! Eligibility tracking
//!
//! This module turns mandate outcomes into applicant state. Entries are keyed
//! by application, so an applicant appears at most once, and every transition
//! runs under that key's map entry lock. Lookups against the application
//! directory happen before the lock is taken.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::adapters::directory::ApplicationDirectory;
use crate::allotment::AllotmentRecord;
use crate::applicant::{
    ApplicantEntry, ApplicantStatus, ApplicationId, ApplicationSnapshot, IpoId, MandateId,
};
use crate::eligibility::validator::DrawValidator;
use crate::error::{AllotError, AllotResult};
use crate::event::EligibilityEvent;

/// Effect of applying one event to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A new entry was created in this status
    Created(ApplicantStatus),
    /// An existing entry moved between statuses
    Updated {
        /// Previous status
        from: ApplicantStatus,
        /// New status
        to: ApplicantStatus,
    },
    /// Entry already reflected the event
    Unchanged(ApplicantStatus),
    /// Entry is terminal for this event and was left alone
    Ignored(ApplicantStatus),
    /// No entry exists and the event does not create one
    NotTracked,
}

impl Transition {
    /// Whether the event changed tracker state
    pub fn is_mutation(&self) -> bool {
        matches!(self, Transition::Created(_) | Transition::Updated { .. })
    }
}

/// Tracker for applicant eligibility across IPOs
pub struct EligibilityTracker {
    entries: DashMap<ApplicationId, ApplicantEntry>,
    directory: Arc<dyn ApplicationDirectory>,
    validator: DrawValidator,
}

impl EligibilityTracker {
    /// Create a new tracker resolving applications through `directory`
    pub fn new(directory: Arc<dyn ApplicationDirectory>) -> Self {
        Self {
            entries: DashMap::new(),
            directory,
            validator: DrawValidator::new(),
        }
    }

    /// Replace the snapshot validator
    pub fn with_validator(mut self, validator: DrawValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Apply an inbound event
    pub async fn handle_event(&self, event: EligibilityEvent) -> AllotResult<Transition> {
        debug!(
            "Handling {} for application {}",
            event.name(),
            event.application_id()
        );

        match event {
            EligibilityEvent::ApplicationCreated {
                application_id,
                snapshot,
            } => self.register_pending(application_id, snapshot),
            EligibilityEvent::MandateApproved {
                application_id,
                mandate_id,
            } => self.on_mandate_approved(&application_id, &mandate_id).await,
            EligibilityEvent::MandateFailed {
                application_id,
                mandate_id,
                reason,
            } => Ok(self.on_mandate_failed(&application_id, &mandate_id, &reason)),
        }
    }

    /// Register a filed application whose mandate outcome is outstanding
    ///
    /// Never touches an existing entry.
    pub fn register_pending(
        &self,
        application_id: ApplicationId,
        snapshot: ApplicationSnapshot,
    ) -> AllotResult<Transition> {
        self.validator.validate_snapshot(&snapshot)?;

        match self.entries.entry(application_id) {
            Entry::Occupied(occupied) => Ok(Transition::Unchanged(occupied.get().status)),
            Entry::Vacant(vacant) => {
                info!("Registered pending application {}", vacant.key());
                let entry = ApplicantEntry::new(
                    vacant.key().clone(),
                    snapshot,
                    ApplicantStatus::Pending,
                );
                vacant.insert(entry);
                Ok(Transition::Created(ApplicantStatus::Pending))
            }
        }
    }

    /// Mark an application eligible after its mandate was approved
    ///
    /// Returns [`AllotError::LookupMiss`] when the directory does not know the
    /// application and no entry exists yet; the event should be redelivered.
    pub async fn on_mandate_approved(
        &self,
        application_id: &ApplicationId,
        mandate_id: &MandateId,
    ) -> AllotResult<Transition> {
        let existing = self.entries.get(application_id).map(|e| e.value().clone());

        if let Some(entry) = &existing {
            if let Some(skip) = Self::approval_short_circuit(entry, mandate_id) {
                debug!(
                    "Approval of mandate {} for {} skipped: {:?}",
                    mandate_id, application_id, skip
                );
                return Ok(skip);
            }
        }

        let snapshot = match self.directory.get_application(application_id).await? {
            Some(snapshot) => snapshot,
            None => match &existing {
                Some(entry) => {
                    debug!(
                        "Directory miss for tracked application {}, using stored snapshot",
                        application_id
                    );
                    entry.snapshot()
                }
                None => {
                    warn!("Application {} not found in directory", application_id);
                    return Err(AllotError::LookupMiss {
                        application_id: application_id.clone(),
                    });
                }
            },
        };

        self.validator.validate_snapshot(&snapshot)?;

        let transition = match self.entries.entry(application_id.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if let Some(skip) = Self::approval_short_circuit(entry, mandate_id) {
                    return Ok(skip);
                }

                let from = entry.status;
                entry.refresh(snapshot);
                entry.mandate_id = Some(mandate_id.clone());
                entry.failure_reason = None;
                entry.update_status(ApplicantStatus::Eligible);

                if from == ApplicantStatus::Eligible {
                    Transition::Unchanged(from)
                } else {
                    Transition::Updated {
                        from,
                        to: ApplicantStatus::Eligible,
                    }
                }
            }
            Entry::Vacant(vacant) => {
                let mut entry =
                    ApplicantEntry::new(application_id.clone(), snapshot, ApplicantStatus::Eligible);
                entry.mandate_id = Some(mandate_id.clone());
                vacant.insert(entry);
                Transition::Created(ApplicantStatus::Eligible)
            }
        };

        info!(
            "Application {} eligible via mandate {}: {:?}",
            application_id, mandate_id, transition
        );
        Ok(transition)
    }

    /// Mark an application failed after its mandate was rejected
    ///
    /// Unknown applications are a no-op.
    pub fn on_mandate_failed(
        &self,
        application_id: &ApplicationId,
        mandate_id: &MandateId,
        reason: &str,
    ) -> Transition {
        let mut entry = match self.entries.get_mut(application_id) {
            Some(entry) => entry,
            None => {
                debug!(
                    "Mandate {} failed for untracked application {}",
                    mandate_id, application_id
                );
                return Transition::NotTracked;
            }
        };

        let from = entry.status;
        if from.is_drawn() {
            return Transition::Ignored(from);
        }

        if from == ApplicantStatus::Failed {
            return Transition::Unchanged(from);
        }

        entry.mandate_id = Some(mandate_id.clone());
        entry.failure_reason = Some(reason.to_string());
        entry.update_status(ApplicantStatus::Failed);

        warn!(
            "Application {} failed via mandate {}: {}",
            application_id, mandate_id, reason
        );
        Transition::Updated {
            from,
            to: ApplicantStatus::Failed,
        }
    }

    /// Materialize an eligible entry for an approved application whose
    /// approval event never arrived
    ///
    /// Existing entries are left untouched.
    pub async fn backfill(&self, application_id: &ApplicationId) -> AllotResult<Transition> {
        if let Some(entry) = self.entries.get(application_id) {
            return Ok(Transition::Unchanged(entry.status));
        }

        let snapshot = self
            .directory
            .get_application(application_id)
            .await?
            .ok_or_else(|| AllotError::LookupMiss {
                application_id: application_id.clone(),
            })?;

        self.validator.validate_snapshot(&snapshot)?;

        match self.entries.entry(application_id.clone()) {
            Entry::Occupied(occupied) => Ok(Transition::Unchanged(occupied.get().status)),
            Entry::Vacant(vacant) => {
                info!("Backfilled approved application {}", application_id);
                vacant.insert(ApplicantEntry::new(
                    application_id.clone(),
                    snapshot,
                    ApplicantStatus::Eligible,
                ));
                Ok(Transition::Created(ApplicantStatus::Eligible))
            }
        }
    }

    /// Apply a draw's outcome to every participant
    ///
    /// Returns the number of entries whose status changed. Only entries still
    /// `Eligible` move; one that failed after the draw read its snapshot keeps
    /// its status. Re-applying the same record changes nothing.
    pub fn mark_drawn(&self, record: &AllotmentRecord) -> usize {
        let mut changed = 0;

        for application_id in record.participants.keys() {
            let Some(status) = record.status_of(application_id) else {
                continue;
            };

            match self.entries.get_mut(application_id) {
                Some(mut entry) => {
                    if entry.status == status {
                        continue;
                    }
                    if entry.status != ApplicantStatus::Eligible {
                        warn!(
                            "Application {} for IPO {} is {:?}, not marking it {:?}",
                            application_id, record.ipo_id, entry.status, status
                        );
                        continue;
                    }
                    entry.update_status(status);
                    changed += 1;
                }
                None => warn!(
                    "Drawn application {} for IPO {} is not tracked",
                    application_id, record.ipo_id
                ),
            }
        }

        debug!(
            "Marked {} entries drawn for IPO {}",
            changed, record.ipo_id
        );
        changed
    }

    /// Eligible entries for one IPO, ordered by application
    pub fn list_eligible(&self, ipo_id: &IpoId) -> Vec<ApplicantEntry> {
        let mut eligible: Vec<ApplicantEntry> = self
            .entries
            .iter()
            .filter(|e| &e.ipo_id == ipo_id && e.is_eligible())
            .map(|e| e.value().clone())
            .collect();

        eligible.sort_by(|a, b| a.application_id.cmp(&b.application_id));
        eligible
    }

    /// Get an entry by application
    pub fn get(&self, application_id: &ApplicationId) -> AllotResult<ApplicantEntry> {
        self.entries
            .get(application_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| AllotError::ApplicantNotFound(application_id.clone()))
    }

    /// Number of tracked entries
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Number of tracked entries per status
    pub fn count_by_status(&self) -> HashMap<ApplicantStatus, usize> {
        let mut counts = HashMap::new();
        for entry in self.entries.iter() {
            *counts.entry(entry.status).or_insert(0) += 1;
        }
        counts
    }

    fn approval_short_circuit(entry: &ApplicantEntry, mandate_id: &MandateId) -> Option<Transition> {
        let same_mandate = entry.mandate_id.as_ref() == Some(mandate_id);

        match entry.status {
            status if status.is_drawn() => Some(Transition::Ignored(status)),
            ApplicantStatus::Failed if same_mandate => {
                Some(Transition::Ignored(ApplicantStatus::Failed))
            }
            ApplicantStatus::Eligible if same_mandate => {
                Some(Transition::Unchanged(ApplicantStatus::Eligible))
            }
            _ => None,
        }
    }
}
