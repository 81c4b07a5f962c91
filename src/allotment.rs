//! Allotment records and outcome events
//!
//! An [`AllotmentRecord`] is the immutable result of one IPO draw. It carries
//! enough of the draw input (seed, share count, participants) to replay the
//! lottery during an audit.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::applicant::{ApplicantEntry, ApplicantId, ApplicantStatus, ApplicationId, IpoId};

/// Draw participant as recorded for audit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Applicant identifier used for ticket identities
    pub applicant_id: ApplicantId,
    /// Lots held at draw time
    pub lots: u32,
}

/// Persisted outcome of one draw
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllotmentRecord {
    /// IPO identifier
    pub ipo_id: IpoId,

    /// Seed the ticket scores were derived from
    pub seed: String,

    /// Shares available to the draw
    pub total_shares: u64,

    /// Applications that won an allotment
    pub winner_application_ids: BTreeSet<ApplicationId>,

    /// Applications that entered the draw and lost
    pub non_winner_application_ids: BTreeSet<ApplicationId>,

    /// Every entry considered, keyed by application
    pub participants: BTreeMap<ApplicationId, Participant>,

    /// Draw timestamp (metadata only)
    pub drawn_at: DateTime<Utc>,
}

impl AllotmentRecord {
    /// Build a record by partitioning the drawn entries into winners and non-winners
    pub fn from_draw(
        ipo_id: IpoId,
        seed: String,
        total_shares: u64,
        entries: &[ApplicantEntry],
        winners: &BTreeSet<ApplicantId>,
    ) -> Self {
        let mut winner_application_ids = BTreeSet::new();
        let mut non_winner_application_ids = BTreeSet::new();
        let mut participants = BTreeMap::new();

        for entry in entries {
            if winners.contains(&entry.applicant_id) {
                winner_application_ids.insert(entry.application_id.clone());
            } else {
                non_winner_application_ids.insert(entry.application_id.clone());
            }

            participants.insert(
                entry.application_id.clone(),
                Participant {
                    applicant_id: entry.applicant_id,
                    lots: entry.lots,
                },
            );
        }

        Self {
            ipo_id,
            seed,
            total_shares,
            winner_application_ids,
            non_winner_application_ids,
            participants,
            drawn_at: Utc::now(),
        }
    }

    /// Outcome event carrying both sets
    pub fn outcome(&self) -> AllotmentOutcome {
        AllotmentOutcome {
            ipo_id: self.ipo_id.clone(),
            winner_application_ids: self.winner_application_ids.clone(),
            non_winner_application_ids: self.non_winner_application_ids.clone(),
        }
    }

    /// Final applicant status the record assigns to an application
    pub fn status_of(&self, application_id: &ApplicationId) -> Option<ApplicantStatus> {
        if self.winner_application_ids.contains(application_id) {
            Some(ApplicantStatus::Allotted)
        } else if self.non_winner_application_ids.contains(application_id) {
            Some(ApplicantStatus::NotAllotted)
        } else {
            None
        }
    }

    /// Winners and non-winners are disjoint and together cover every participant
    pub fn is_consistent(&self) -> bool {
        if !self
            .winner_application_ids
            .is_disjoint(&self.non_winner_application_ids)
        {
            return false;
        }

        let covered = self.winner_application_ids.len() + self.non_winner_application_ids.len();
        covered == self.participants.len()
            && self
                .participants
                .keys()
                .all(|id| self.status_of(id).is_some())
    }

    /// Number of entries considered by the draw
    pub fn entry_count(&self) -> usize {
        self.participants.len()
    }
}

/// Outcome event published once per draw
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllotmentOutcome {
    /// IPO identifier
    pub ipo_id: IpoId,
    /// Winning applications
    pub winner_application_ids: BTreeSet<ApplicationId>,
    /// Losing applications
    pub non_winner_application_ids: BTreeSet<ApplicationId>,
}
