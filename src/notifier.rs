//! Outcome notifications
//!
//! Downstream consumer of published outcomes. Every application named in an
//! outcome gets exactly one notice: congratulations for winners, regret for
//! everyone else. Delivery is a structured log line.

use std::fmt;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::allotment::AllotmentOutcome;
use crate::applicant::{ApplicationId, IpoId};

/// Kind of notice sent to an applicant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Notice {
    /// Application won an allotment
    Congratulations,
    /// Application did not win
    Regret,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Congratulations => write!(f, "CONGRATS"),
            Notice::Regret => write!(f, "SORRY"),
        }
    }
}

/// One notice addressed to one application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// IPO the outcome belongs to
    pub ipo_id: IpoId,
    /// Application being notified
    pub application_id: ApplicationId,
    /// Notice sent to the application
    pub notice: Notice,
}

/// Expand an outcome into per-application notices, winners first
pub fn notifications(outcome: &AllotmentOutcome) -> Vec<Notification> {
    let winners = outcome
        .winner_application_ids
        .iter()
        .map(|id| (id, Notice::Congratulations));
    let non_winners = outcome
        .non_winner_application_ids
        .iter()
        .map(|id| (id, Notice::Regret));

    winners
        .chain(non_winners)
        .map(|(application_id, notice)| Notification {
            ipo_id: outcome.ipo_id.clone(),
            application_id: application_id.clone(),
            notice,
        })
        .collect()
}

/// Totals from a notifier run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifierStats {
    /// Outcome events consumed
    pub outcomes: usize,
    /// Notices sent to winners
    pub congratulations: usize,
    /// Notices sent to non-winners
    pub regrets: usize,
}

/// Consumes outcome events and sends notices
pub struct OutcomeNotifier {
    receiver: UnboundedReceiver<AllotmentOutcome>,
}

impl OutcomeNotifier {
    /// Create a notifier reading from a publisher's channel
    pub fn new(receiver: UnboundedReceiver<AllotmentOutcome>) -> Self {
        Self { receiver }
    }

    /// Consume outcomes until every publisher is dropped
    pub async fn run(mut self) -> NotifierStats {
        let mut stats = NotifierStats::default();

        while let Some(outcome) = self.receiver.recv().await {
            stats.outcomes += 1;
            debug!("Received outcome for IPO {}", outcome.ipo_id);

            for notification in notifications(&outcome) {
                match notification.notice {
                    Notice::Congratulations => stats.congratulations += 1,
                    Notice::Regret => stats.regrets += 1,
                }

                info!(
                    ipo_id = %notification.ipo_id,
                    application_id = %notification.application_id,
                    notice = %notification.notice,
                    "Sending allotment notice"
                );
            }
        }

        info!(
            "Notifier stopped after {} outcomes ({} congratulations, {} regrets)",
            stats.outcomes, stats.congratulations, stats.regrets
        );
        stats
    }

    /// Run on a background task
    pub fn spawn(self) -> JoinHandle<NotifierStats> {
        tokio::spawn(self.run())
    }
}
