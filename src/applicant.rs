//! Applicant types and related data structures
//!
//! This module defines the identifiers and the per-IPO applicant entry that the
//! eligibility tracker maintains and the lottery draws from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an applicant entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApplicantId(pub Uuid);

impl ApplicantId {
    /// Generate a new random applicant ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an ApplicantId from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ApplicantId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ApplicantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new identifier
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the identifier string
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// IPO identifier
    IpoId
);

string_id!(
    /// Upstream application identifier (not owned by this crate)
    ApplicationId
);

string_id!(
    /// Investor identifier copied from the application snapshot
    InvestorId
);

string_id!(
    /// Payment mandate identifier
    MandateId
);

/// Applicant participation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicantStatus {
    /// Application known, mandate outcome not yet received
    Pending,
    /// Mandate approved, applicant may enter the draw
    Eligible,
    /// Mandate failed, excluded from every draw
    Failed,
    /// Drawn and allotted shares
    Allotted,
    /// Drawn and not allotted
    NotAllotted,
}

impl ApplicantStatus {
    /// Whether the draw has already decided this applicant
    pub fn is_drawn(&self) -> bool {
        matches!(self, ApplicantStatus::Allotted | ApplicantStatus::NotAllotted)
    }

    /// Whether no further mandate event can make this applicant eligible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApplicantStatus::Failed | ApplicantStatus::Allotted | ApplicantStatus::NotAllotted
        )
    }
}

impl std::fmt::Display for ApplicantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplicantStatus::Pending => write!(f, "PENDING"),
            ApplicantStatus::Eligible => write!(f, "ELIGIBLE"),
            ApplicantStatus::Failed => write!(f, "FAILED"),
            ApplicantStatus::Allotted => write!(f, "ALLOTTED"),
            ApplicantStatus::NotAllotted => write!(f, "NOT_ALLOTTED"),
        }
    }
}

/// Upstream application details returned by the application lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSnapshot {
    /// Investor who filed the application
    pub investor_id: InvestorId,
    /// IPO the application was filed for
    pub ipo_id: IpoId,
    /// Number of lots applied for
    pub lots: u32,
}

impl ApplicationSnapshot {
    /// Create a new snapshot
    pub fn new(investor_id: InvestorId, ipo_id: IpoId, lots: u32) -> Self {
        Self {
            investor_id,
            ipo_id,
            lots,
        }
    }
}

/// One claimant's standing for one IPO
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicantEntry {
    /// Opaque applicant identifier, stable for the life of the entry
    pub applicant_id: ApplicantId,

    /// Upstream application reference
    pub application_id: ApplicationId,

    /// IPO this entry competes in
    pub ipo_id: IpoId,

    /// Investor who filed the application
    pub investor_id: InvestorId,

    /// Draw weight in lots
    pub lots: u32,

    /// Current participation status
    pub status: ApplicantStatus,

    /// Last mandate that touched this entry
    pub mandate_id: Option<MandateId>,

    /// Reason reported with the last mandate failure
    pub failure_reason: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ApplicantEntry {
    /// Create a new entry from an application snapshot
    pub fn new(
        application_id: ApplicationId,
        snapshot: ApplicationSnapshot,
        status: ApplicantStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            applicant_id: ApplicantId::new(),
            application_id,
            ipo_id: snapshot.ipo_id,
            investor_id: snapshot.investor_id,
            lots: snapshot.lots,
            status,
            mandate_id: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Snapshot of the application fields carried by this entry
    pub fn snapshot(&self) -> ApplicationSnapshot {
        ApplicationSnapshot::new(self.investor_id.clone(), self.ipo_id.clone(), self.lots)
    }

    /// Copy application fields from a fresher snapshot
    pub fn refresh(&mut self, snapshot: ApplicationSnapshot) {
        self.ipo_id = snapshot.ipo_id;
        self.investor_id = snapshot.investor_id;
        self.lots = snapshot.lots;
        self.updated_at = Utc::now();
    }

    /// Update entry status
    pub fn update_status(&mut self, status: ApplicantStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Check if entry may enter a draw
    pub fn is_eligible(&self) -> bool {
        self.status == ApplicantStatus::Eligible
    }
}
