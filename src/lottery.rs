//! Weighted lottery selection
//!
//! Every applicant holds one ticket per lot. Tickets are ranked by
//! `sha256(seed ":" ticket_id)` rendered as lowercase hex, and winners are
//! taken from the front of that ranking one *applicant* at a time: further
//! tickets of an applicant that already won do not consume share slots.
//!
//! The functions here are pure. The same entries, share count and seed always
//! produce the same winners, whatever order the entries arrive in, which is
//! what lets [`replay`] re-derive a historical draw from its record.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};

use crate::allotment::AllotmentRecord;
use crate::applicant::{ApplicantEntry, ApplicantId};

/// One ranked lottery ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    /// Owner of the ticket
    pub applicant_id: ApplicantId,
    /// Zero-based index among the owner's tickets
    pub index: u32,
    /// Stable ticket identity, `"{applicant_id}:{index}"`
    pub id: String,
    /// Lowercase hex SHA-256 score
    pub score: String,
}

impl Ticket {
    /// Build and score a ticket
    pub fn new(applicant_id: ApplicantId, index: u32, seed: &str) -> Self {
        let id = ticket_id(&applicant_id, index);
        let score = ticket_score(seed, &id);
        Self {
            applicant_id,
            index,
            id,
            score,
        }
    }
}

/// Stable identity of an applicant's `index`-th ticket
pub fn ticket_id(applicant_id: &ApplicantId, index: u32) -> String {
    format!("{}:{}", applicant_id, index)
}

/// Score of a ticket under a seed: lowercase hex of `sha256(seed ":" ticket_id)`
pub fn ticket_score(seed: &str, ticket_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(b":");
    hasher.update(ticket_id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Select the winning applicants for a draw
///
/// Entries with zero lots hold no tickets and can never win. If the total
/// ticket count does not exceed `total_shares`, every applicant holding a
/// ticket wins.
pub fn select_winners(
    entries: &[ApplicantEntry],
    total_shares: u64,
    seed: &str,
) -> BTreeSet<ApplicantId> {
    draw(
        entries.iter().map(|e| (e.applicant_id, e.lots)),
        total_shares,
        seed,
    )
}

/// Recompute a record's winners from its participants and seed
///
/// Returns `true` when the recomputed winners match the recorded ones.
pub fn replay(record: &AllotmentRecord) -> bool {
    let winners = draw(
        record
            .participants
            .values()
            .map(|p| (p.applicant_id, p.lots)),
        record.total_shares,
        &record.seed,
    );

    let recorded: BTreeSet<ApplicantId> = record
        .participants
        .iter()
        .filter(|(application_id, _)| record.winner_application_ids.contains(*application_id))
        .map(|(_, p)| p.applicant_id)
        .collect();

    winners == recorded
}

fn draw(
    weights: impl Iterator<Item = (ApplicantId, u32)>,
    total_shares: u64,
    seed: &str,
) -> BTreeSet<ApplicantId> {
    let weights: Vec<(ApplicantId, u32)> = weights.filter(|(_, lots)| *lots > 0).collect();
    let ticket_count: u64 = weights.iter().map(|(_, lots)| u64::from(*lots)).sum();

    if ticket_count <= total_shares {
        return weights.into_iter().map(|(id, _)| id).collect();
    }

    let mut tickets: Vec<Ticket> = weights
        .iter()
        .flat_map(|(id, lots)| (0..*lots).map(move |index| Ticket::new(*id, index, seed)))
        .collect();

    tickets.sort_by(|a, b| a.score.cmp(&b.score).then_with(|| a.id.cmp(&b.id)));

    let mut winners = BTreeSet::new();
    for ticket in tickets {
        if winners.len() as u64 >= total_shares {
            break;
        }
        winners.insert(ticket.applicant_id);
    }

    winners
}
