//! Inbound eligibility events
//!
//! Mandate outcomes arrive from the payment side as loosely shaped webhook
//! bodies. They are converted into [`EligibilityEvent`] here, and nothing
//! untyped reaches the tracker.

use serde::{Deserialize, Serialize};

use crate::applicant::{ApplicationId, ApplicationSnapshot, MandateId};
use crate::error::{AllotError, AllotResult};

/// Reason recorded when the payment side reports a failure without one
pub const DEFAULT_FAILURE_REASON: &str = "Bank rejected";

/// Event consumed by the eligibility tracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EligibilityEvent {
    /// Application filed; mandate outcome still outstanding
    #[serde(rename_all = "camelCase")]
    ApplicationCreated {
        application_id: ApplicationId,
        snapshot: ApplicationSnapshot,
    },

    /// Payment mandate approved
    #[serde(rename_all = "camelCase")]
    MandateApproved {
        application_id: ApplicationId,
        mandate_id: MandateId,
    },

    /// Payment mandate failed
    #[serde(rename_all = "camelCase")]
    MandateFailed {
        application_id: ApplicationId,
        mandate_id: MandateId,
        reason: String,
    },
}

impl EligibilityEvent {
    /// Application the event refers to
    pub fn application_id(&self) -> &ApplicationId {
        match self {
            EligibilityEvent::ApplicationCreated { application_id, .. }
            | EligibilityEvent::MandateApproved { application_id, .. }
            | EligibilityEvent::MandateFailed { application_id, .. } => application_id,
        }
    }

    /// Short event name for logging
    pub fn name(&self) -> &'static str {
        match self {
            EligibilityEvent::ApplicationCreated { .. } => "ApplicationCreated",
            EligibilityEvent::MandateApproved { .. } => "MandateApproved",
            EligibilityEvent::MandateFailed { .. } => "MandateFailed",
        }
    }

    /// Parse a raw webhook body into a typed event
    pub fn from_webhook_json(body: &str) -> AllotResult<Self> {
        let webhook: MandateWebhook = serde_json::from_str(body)?;
        Self::try_from(webhook)
    }
}

/// Raw mandate webhook body as posted by the payment gateway
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MandateWebhook {
    /// Mandate identifier
    pub mandate_id: String,
    /// Application the mandate pays for
    pub application_id: String,
    /// Reported status, `APPROVED` or `FAILED`
    pub status: String,
    /// Optional failure reason
    #[serde(default)]
    pub reason: Option<String>,
}

impl TryFrom<MandateWebhook> for EligibilityEvent {
    type Error = AllotError;

    fn try_from(webhook: MandateWebhook) -> AllotResult<Self> {
        if webhook.application_id.trim().is_empty() {
            return Err(AllotError::InvalidEvent(
                "applicationId cannot be empty".to_string(),
            ));
        }

        if webhook.mandate_id.trim().is_empty() {
            return Err(AllotError::InvalidEvent(
                "mandateId cannot be empty".to_string(),
            ));
        }

        let application_id = ApplicationId::new(webhook.application_id);
        let mandate_id = MandateId::new(webhook.mandate_id);

        match webhook.status.as_str() {
            "APPROVED" => Ok(EligibilityEvent::MandateApproved {
                application_id,
                mandate_id,
            }),
            "FAILED" => Ok(EligibilityEvent::MandateFailed {
                application_id,
                mandate_id,
                reason: webhook
                    .reason
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_FAILURE_REASON.to_string()),
            }),
            other => Err(AllotError::InvalidEvent(format!(
                "unrecognized mandate status '{}' for mandate {}",
                other, mandate_id
            ))),
        }
    }
}
