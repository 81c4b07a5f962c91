//! Service configuration
//!
//! Configuration is loaded from YAML and can be overridden from the
//! environment (a `.env` file is honoured).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::applicant::IpoId;
use crate::eligibility::validator::DEFAULT_MAX_LOTS;
use crate::error::{AllotError, AllotResult};

/// Environment variable overriding the application service URL
pub const ENV_DIRECTORY_URL: &str = "ALLOTMENT_DIRECTORY_URL";

/// Environment variable overriding the seed namespace
pub const ENV_SEED_NAMESPACE: &str = "ALLOTMENT_SEED_NAMESPACE";

/// Allotment service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllotmentConfig {
    /// Application directory configuration
    pub directory: DirectoryConfig,

    /// Draw configuration
    #[serde(default)]
    pub draw: DrawConfig,

    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Application directory connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Base URL of the application service
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: u64,

    /// Consecutive failed calls that open the circuit breaker
    #[serde(default = "default_breaker_failure_threshold")]
    pub breaker_failure_threshold: u32,

    /// How long the breaker stays open before a trial call, in milliseconds
    #[serde(default = "default_breaker_cooldown_ms")]
    pub breaker_cooldown_ms: u64,
}

impl DirectoryConfig {
    /// Breaker cooldown as a Duration
    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_millis(self.breaker_cooldown_ms)
    }
}

/// Draw configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawConfig {
    /// Optional prefix mixed into every draw seed
    #[serde(default)]
    pub seed_namespace: Option<String>,

    /// Maximum lots a single applicant may hold
    #[serde(default = "default_max_lots_per_applicant")]
    pub max_lots_per_applicant: u32,
}

impl DrawConfig {
    /// Seed for an IPO's draw
    ///
    /// Derived from the IPO identifier only, so any audit can recompute it.
    pub fn seed_for(&self, ipo_id: &IpoId) -> String {
        match &self.seed_namespace {
            Some(namespace) if !namespace.is_empty() => format!("{}:{}", namespace, ipo_id),
            _ => ipo_id.to_string(),
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval between scheduler ticks in seconds
    #[serde(default = "default_tick_interval_sec")]
    pub tick_interval_sec: u64,

    /// Backfill missed approvals from the directory before drawing
    #[serde(default = "default_reconcile_approved")]
    pub reconcile_approved: bool,

    /// Draws to run once their deadline passes
    #[serde(default)]
    pub draws: Vec<ScheduledDraw>,
}

impl SchedulerConfig {
    /// Get tick interval as Duration
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_sec)
    }
}

/// One scheduled IPO draw
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledDraw {
    /// IPO identifier
    pub ipo_id: IpoId,

    /// Shares available to the draw
    pub total_shares: u64,

    /// Deadline after which the draw runs
    pub draw_at: DateTime<Utc>,
}

// Default value functions
fn default_timeout_sec() -> u64 {
    30
}

fn default_breaker_failure_threshold() -> u32 {
    5
}

fn default_breaker_cooldown_ms() -> u64 {
    30_000
}

fn default_max_lots_per_applicant() -> u32 {
    DEFAULT_MAX_LOTS
}

fn default_tick_interval_sec() -> u64 {
    60
}

fn default_reconcile_approved() -> bool {
    true
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            timeout_sec: default_timeout_sec(),
            breaker_failure_threshold: default_breaker_failure_threshold(),
            breaker_cooldown_ms: default_breaker_cooldown_ms(),
        }
    }
}

impl Default for DrawConfig {
    fn default() -> Self {
        Self {
            seed_namespace: None,
            max_lots_per_applicant: default_max_lots_per_applicant(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_sec: default_tick_interval_sec(),
            reconcile_approved: default_reconcile_approved(),
            draws: Vec::new(),
        }
    }
}

impl Default for AllotmentConfig {
    fn default() -> Self {
        Self {
            directory: DirectoryConfig::default(),
            draw: DrawConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl AllotmentConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: &str) -> AllotResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AllotError::ConfigError(format!("Failed to read {}: {}", path, e)))?;

        Self::from_yaml(&contents)
    }

    /// Load configuration from YAML string
    pub fn from_yaml(yaml: &str) -> AllotResult<Self> {
        let config: AllotmentConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment and `.env`
    pub fn apply_env_overrides(mut self) -> AllotResult<Self> {
        dotenv::dotenv().ok();

        if let Ok(url) = std::env::var(ENV_DIRECTORY_URL) {
            self.directory.base_url = url;
        }

        if let Ok(namespace) = std::env::var(ENV_SEED_NAMESPACE) {
            self.draw.seed_namespace = Some(namespace);
        }

        self.validate()?;
        Ok(self)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: &str) -> AllotResult<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Check configuration consistency
    pub fn validate(&self) -> AllotResult<()> {
        if self.directory.base_url.is_empty() {
            return Err(AllotError::ConfigError(
                "directory.base_url cannot be empty".to_string(),
            ));
        }

        if self.directory.breaker_failure_threshold == 0 {
            return Err(AllotError::ConfigError(
                "directory.breaker_failure_threshold must be positive".to_string(),
            ));
        }

        if self.directory.breaker_cooldown_ms == 0 {
            return Err(AllotError::ConfigError(
                "directory.breaker_cooldown_ms must be positive".to_string(),
            ));
        }

        if self.draw.max_lots_per_applicant == 0 {
            return Err(AllotError::ConfigError(
                "draw.max_lots_per_applicant must be positive".to_string(),
            ));
        }

        if self.scheduler.tick_interval_sec == 0 {
            return Err(AllotError::ConfigError(
                "scheduler.tick_interval_sec must be positive".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for draw in &self.scheduler.draws {
            if !seen.insert(&draw.ipo_id) {
                return Err(AllotError::ConfigError(format!(
                    "IPO {} is scheduled more than once",
                    draw.ipo_id
                )));
            }
        }

        Ok(())
    }
}
