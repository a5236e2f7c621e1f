//! Two-tier configuration loader (spec.md §5, §4.3, §6 "Blocked domains").
//!
//! DESIGN DECISION: trimmed from the teacher's 4-tier System/Team/Project/User
//! ladder (`ConfigLevel`, priority order System < Team < Project < User, last
//! one wins) to a 2-tier Default < Project ladder.
//! WHY: this crate has no enterprise-policy or per-user-preference surface;
//! the only override path a project needs is a repo-local `.toml` file
//! layered over built-in defaults — the same "last one wins" merge the
//! teacher used, just with two rungs instead of four.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration hierarchy level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLevel {
    Default = 0,
    Project = 1,
}

impl ConfigLevel {
    pub fn name(&self) -> &str {
        match self {
            ConfigLevel::Default => "default",
            ConfigLevel::Project => "project",
        }
    }
}

impl Default for ConfigLevel {
    fn default() -> Self {
        ConfigLevel::Default
    }
}

/// Rate limiter knobs (spec.md §4.1.1, §9 "Single-permit gate").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Always 1 per spec.md §9 — kept as a field (rather than a constant) so
    /// a project config can document the decision, not to make it tunable.
    pub permits: usize,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self { permits: 1 }
    }
}

/// Retry/backoff bounds (spec.md §5 "Timeouts & cancellation").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_ms: u64,
    pub cap_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_ms: 1_000,
            cap_ms: 8_000,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> crate::retry::BackoffPolicy {
        crate::retry::BackoffPolicy {
            max_attempts: self.max_attempts,
            base: std::time::Duration::from_millis(self.base_ms),
            cap: std::time::Duration::from_millis(self.cap_ms),
        }
    }
}

/// Research shard budget knobs (spec.md §4.1 "Adaptive batching", §6
/// "Blocked domains (default)").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub batch_size_min: usize,
    pub batch_size_max: usize,
    pub batch_size_default: usize,
    pub page_fetch_timeout_secs: u64,
    pub blocked_domains: Vec<String>,
    pub allowed_domains: Vec<String>,
    pub html_body_cap_bytes: usize,
    pub raw_body_cap_bytes: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            batch_size_min: 1,
            batch_size_max: 4,
            batch_size_default: 2,
            page_fetch_timeout_secs: 90,
            blocked_domains: vec![
                "facebook.com".into(),
                "twitter.com".into(),
                "instagram.com".into(),
                "linkedin.com".into(),
                "tiktok.com".into(),
            ],
            allowed_domains: Vec::new(),
            html_body_cap_bytes: 1024 * 1024,
            raw_body_cap_bytes: 500 * 1024,
        }
    }
}

/// Tester shard timeouts (spec.md §5: "Per-page fetch default 90s; test
/// execution default 5 min; build default 2 min; coverage same as test.").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TesterConfig {
    pub test_timeout_secs: u64,
    pub build_timeout_secs: u64,
    pub coverage_timeout_secs: u64,
    pub coverage_goal_pct: f64,
    pub max_repair_retries: u32,
}

impl Default for TesterConfig {
    fn default() -> Self {
        Self {
            test_timeout_secs: 300,
            build_timeout_secs: 120,
            coverage_timeout_secs: 300,
            coverage_goal_pct: 80.0,
            max_repair_retries: 3,
        }
    }
}

/// Vision guardian thresholds and triggers (spec.md §4.3 "Scoring rubric",
/// "Triggers").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardianConfig {
    pub warning_threshold: f64,
    pub failure_threshold: f64,
    pub block_threshold: f64,
    pub periodic_interval: u64,
    pub phase_gate_enabled: bool,
    pub periodic_enabled: bool,
    pub high_impact_enabled: bool,
    pub high_impact_globs: Vec<String>,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            warning_threshold: 0.7,
            failure_threshold: 0.5,
            block_threshold: 0.3,
            periodic_interval: 5,
            phase_gate_enabled: true,
            periodic_enabled: true,
            high_impact_enabled: true,
            high_impact_globs: Vec::new(),
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub rate_limiter: RateLimiterConfig,
    pub retry: RetryConfig,
    pub research: ResearchConfig,
    pub tester: TesterConfig,
    pub guardian: GuardianConfig,

    #[serde(skip)]
    pub level: ConfigLevel,
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            rate_limiter: RateLimiterConfig::default(),
            retry: RetryConfig::default(),
            research: ResearchConfig::default(),
            tester: TesterConfig::default(),
            guardian: GuardianConfig::default(),
            level: ConfigLevel::Default,
            source_path: None,
        }
    }
}

impl RuntimeConfig {
    /// Merge a higher-priority layer into this one. Full-section replace,
    /// matching the teacher's simplification for its own multi-field
    /// sub-configs ("full replace for simplicity").
    pub fn merge(&mut self, other: &RuntimeConfig) {
        self.rate_limiter = other.rate_limiter.clone();
        self.retry = other.retry.clone();
        self.research = other.research.clone();
        self.tester = other.tester.clone();
        self.guardian = other.guardian.clone();
        self.level = other.level;
        self.source_path.clone_from(&other.source_path);
    }
}

/// Loads `RuntimeConfig`, layering an optional project `.toml` file over
/// built-in defaults.
pub struct ConfigLoader {
    project_dir: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { project_dir: None }
    }

    pub fn with_project_dir(mut self, project_dir: impl Into<PathBuf>) -> Self {
        self.project_dir = Some(project_dir.into());
        self
    }

    /// Project config path: `<project_dir>/.shard/config.toml`.
    pub fn project_config_path(&self) -> Option<PathBuf> {
        self.project_dir
            .as_ref()
            .map(|dir| dir.join(".shard").join("config.toml"))
    }

    pub fn load(&self) -> Result<RuntimeConfig> {
        let mut config = RuntimeConfig::default();

        if let Some(path) = self.project_config_path() {
            if let Some(layer) = self.load_path(&path)? {
                config.merge(&layer);
            }
        }

        super::validator::ConfigValidator::validate(&config).map_err(Error::Configuration)?;
        Ok(config)
    }

    fn load_path(&self, path: &Path) -> Result<Option<RuntimeConfig>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        let mut config: RuntimeConfig = toml::from_str(&content)?;
        config.level = ConfigLevel::Project;
        config.source_path = Some(path.to_path_buf());
        Ok(Some(config))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
