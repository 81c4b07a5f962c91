//! Draw input validation
//!
//! This module rejects malformed snapshots and draw inputs before they reach
//! the tracker or the lottery. Nothing is coerced: a bad value fails the
//! operation.

use std::collections::HashSet;

use crate::applicant::{ApplicantEntry, ApplicationSnapshot, IpoId};
use crate::error::{AllotError, AllotResult};

/// Default upper bound on lots held by a single applicant
pub const DEFAULT_MAX_LOTS: u32 = 100_000;

/// Draw input validator
#[derive(Debug, Clone)]
pub struct DrawValidator {
    /// Maximum lots a single applicant may hold
    max_lots: u32,
}

impl DrawValidator {
    /// Create a new validator with default limits
    pub fn new() -> Self {
        Self {
            max_lots: DEFAULT_MAX_LOTS,
        }
    }

    /// Create a custom validator
    pub fn custom(max_lots: u32) -> Self {
        Self { max_lots }
    }

    /// Validate an application snapshot before it becomes an entry
    pub fn validate_snapshot(&self, snapshot: &ApplicationSnapshot) -> AllotResult<()> {
        if snapshot.lots < 1 {
            return Err(AllotError::InvalidInput(format!(
                "Lots must be at least 1, got {}",
                snapshot.lots
            )));
        }

        if snapshot.lots > self.max_lots {
            return Err(AllotError::InvalidInput(format!(
                "Lots {} exceed maximum {}",
                snapshot.lots, self.max_lots
            )));
        }

        if snapshot.ipo_id.as_str().is_empty() {
            return Err(AllotError::InvalidInput(
                "IPO ID cannot be empty".to_string(),
            ));
        }

        if snapshot.investor_id.as_str().is_empty() {
            return Err(AllotError::InvalidInput(
                "Investor ID cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Validate a requested share count
    pub fn validate_shares(&self, total_shares: i64) -> AllotResult<u64> {
        u64::try_from(total_shares).map_err(|_| {
            AllotError::InvalidInput(format!(
                "Total shares cannot be negative, got {}",
                total_shares
            ))
        })
    }

    /// Validate the eligible set gathered for one draw
    pub fn validate_draw(&self, ipo_id: &IpoId, entries: &[ApplicantEntry]) -> AllotResult<()> {
        if ipo_id.as_str().is_empty() {
            return Err(AllotError::InvalidInput(
                "IPO ID cannot be empty".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(entries.len());
        for entry in entries {
            if entry.lots < 1 {
                return Err(AllotError::InvalidInput(format!(
                    "Application {} holds {} lots",
                    entry.application_id, entry.lots
                )));
            }

            if entry.lots > self.max_lots {
                return Err(AllotError::InvalidInput(format!(
                    "Application {} lots {} exceed maximum {}",
                    entry.application_id, entry.lots, self.max_lots
                )));
            }

            if &entry.ipo_id != ipo_id {
                return Err(AllotError::InvalidInput(format!(
                    "Application {} belongs to IPO {}, not {}",
                    entry.application_id, entry.ipo_id, ipo_id
                )));
            }

            if !entry.is_eligible() {
                return Err(AllotError::InvalidInput(format!(
                    "Application {} is {} and cannot be drawn",
                    entry.application_id, entry.status
                )));
            }

            if !seen.insert(entry.applicant_id) {
                return Err(AllotError::InvalidInput(format!(
                    "Applicant {} appears more than once",
                    entry.applicant_id
                )));
            }
        }

        Ok(())
    }
}

impl Default for DrawValidator {
    fn default() -> Self {
        Self::new()
    }
}
