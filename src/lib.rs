//! # ipo-allotment: Exactly-Once IPO Allotment Engine
//!
//! This library decides which IPO applicants receive shares when an issue is
//! oversubscribed, using a seeded SHA-256 lottery weighted by lots.
//!
//! ## Core Components
//!
//! - **EligibilityTracker**: Turns mandate outcomes into per-application state
//! - **Lottery**: Deterministic weighted draw with a per-applicant quota
//! - **AllotmentEngine**: Runs each IPO's draw at most once, persists and publishes it
//! - **AllotmentScheduler**: Runs configured draws once their deadline passes
//! - **OutcomeNotifier**: Sends one notice per application from published outcomes
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ipo_allotment::{AllotmentEngine, AllotmentEngineConfig, IpoId};
//! use ipo_allotment::adapters::{ChannelPublisher, InMemoryAllotmentStore, InMemoryApplicationDirectory};
//! use ipo_allotment::notifier::OutcomeNotifier;
//!
//! #[tokio::main]
//! async fn main() {
//!     let directory = Arc::new(InMemoryApplicationDirectory::new());
//!     let (publisher, outcomes) = ChannelPublisher::new();
//!     OutcomeNotifier::new(outcomes).spawn();
//!
//!     let engine = AllotmentEngine::new(
//!         AllotmentEngineConfig::default(),
//!         directory,
//!         Arc::new(InMemoryAllotmentStore::new()),
//!         Arc::new(publisher),
//!     );
//!
//!     match engine.run_allotment(&IpoId::new("ipo-2024-01"), 1000).await {
//!         Ok(record) => println!("Winners: {:?}", record.winner_application_ids),
//!         Err(e) => eprintln!("Draw failed: {}", e),
//!     }
//! }
//! ```

// Public modules
pub mod allotment;
pub mod applicant;
pub mod config;
pub mod error;
pub mod event;
pub mod lottery;
pub mod notifier;
pub mod scheduler;

// Re-export main types
pub use allotment::{AllotmentOutcome, AllotmentRecord, Participant};
pub use applicant::{
    ApplicantEntry, ApplicantId, ApplicantStatus, ApplicationId, ApplicationSnapshot, InvestorId,
    IpoId, MandateId,
};
pub use config::AllotmentConfig;
pub use error::{AllotError, AllotResult};
pub use event::{EligibilityEvent, MandateWebhook};

// Internal modules
mod engine;

// Eligibility modules
pub mod eligibility {
    pub mod tracker;
    pub mod validator;

    pub use tracker::{EligibilityTracker, Transition};
    pub use validator::DrawValidator;
}

// Collaborator ports and implementations
pub mod adapters {
    pub mod breaker;
    pub mod directory;
    pub mod http;
    pub mod publisher;
    pub mod store;

    pub use breaker::CircuitBreaker;
    pub use directory::{ApplicationDirectory, InMemoryApplicationDirectory};
    pub use http::HttpApplicationDirectory;
    pub use publisher::{ChannelPublisher, OutcomePublisher};
    pub use store::{AllotmentStore, InMemoryAllotmentStore};
}

// Re-export engine
pub use engine::{AllotmentEngine, AllotmentEngineConfig, ManualTrigger};
pub use scheduler::{AllotmentScheduler, ScheduleReport};

// Initialize tracing
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        // Verify all main types are exported
        let _: ApplicantId;
        let _: ApplicationId;
        let _: IpoId;
        let _: ApplicantStatus;
        let _: AllotmentRecord;
        let _: EligibilityEvent;
        let _: ManualTrigger;
    }
}
