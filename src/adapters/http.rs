//! HTTP application directory
//!
//! This module implements the [`ApplicationDirectory`] trait against the
//! application service's REST API:
//!
//! * `GET {base}/applications/{application_id}` returns one application,
//!   `404` when unknown
//! * `GET {base}/api/v1/ipo/{ipo_id}/applications` returns the approved
//!   application IDs of an IPO
//!
//! Both calls go through a [`CircuitBreaker`]; while it is open lookups fail
//! fast with [`AllotError::LookupFailed`].

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::adapters::breaker::CircuitBreaker;
use crate::adapters::directory::ApplicationDirectory;
use crate::applicant::{ApplicationId, ApplicationSnapshot, InvestorId, IpoId};
use crate::config::DirectoryConfig;
use crate::error::{AllotError, AllotResult};

/// Application service client
pub struct HttpApplicationDirectory {
    config: DirectoryConfig,
    client: Client,
    breaker: CircuitBreaker,
}

impl HttpApplicationDirectory {
    /// Create a new HTTP directory
    pub fn new(config: DirectoryConfig) -> AllotResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_sec))
            .build()
            .map_err(|e| AllotError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        let breaker =
            CircuitBreaker::new(config.breaker_failure_threshold, config.breaker_cooldown());

        Ok(Self {
            config,
            client,
            breaker,
        })
    }

    /// Circuit breaker guarding the application service
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn fetch_application(
        &self,
        application_id: &ApplicationId,
    ) -> AllotResult<Option<ApplicationSnapshot>> {
        let url = self.url(&format!("/applications/{}", application_id));
        debug!("Looking up application at {}", url);

        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AllotError::LookupFailed(format!(
                "Application {} lookup returned {}: {}",
                application_id, status, error_text
            )));
        }

        let body: ApplicationResponse = response.json().await?;
        body.into_snapshot().map(Some)
    }

    async fn fetch_approved(&self, ipo_id: &IpoId) -> AllotResult<Vec<ApplicationId>> {
        let url = self.url(&format!("/api/v1/ipo/{}/applications", ipo_id));
        debug!("Listing approved applications at {}", url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AllotError::LookupFailed(format!(
                "Approved applications for IPO {} returned {}: {}",
                ipo_id, status, error_text
            )));
        }

        let ids: Vec<String> = response.json().await?;
        Ok(ids.into_iter().map(ApplicationId::new).collect())
    }
}

#[async_trait]
impl ApplicationDirectory for HttpApplicationDirectory {
    async fn get_application(
        &self,
        application_id: &ApplicationId,
    ) -> AllotResult<Option<ApplicationSnapshot>> {
        self.breaker
            .call(|| self.fetch_application(application_id))
            .await
    }

    async fn list_approved_applications(&self, ipo_id: &IpoId) -> AllotResult<Vec<ApplicationId>> {
        self.breaker.call(|| self.fetch_approved(ipo_id)).await
    }
}

// Application service response types

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplicationResponse {
    investor_id: String,
    ipo_id: String,
    lots: i64,
}

impl ApplicationResponse {
    fn into_snapshot(self) -> AllotResult<ApplicationSnapshot> {
        let lots = u32::try_from(self.lots).map_err(|_| {
            AllotError::InvalidInput(format!("Application reports {} lots", self.lots))
        })?;

        Ok(ApplicationSnapshot::new(
            InvestorId::new(self.investor_id),
            IpoId::new(self.ipo_id),
            lots,
        ))
    }
}
