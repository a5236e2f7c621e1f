//! Vision guardian data model (spec.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A capability the project commits to, with priority and timeline (spec.md
/// §3 "Vision").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    pub priority: u8,
    pub timeline: String,
}

/// A risk the vision names, with likelihood/impact/mitigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    pub description: String,
    pub likelihood: String,
    pub impact: String,
    pub mitigation: String,
}

/// A persona the vision is written for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub needs: Vec<String>,
}

/// Single-instance per-project vision document (spec.md §3 "Single-instance
/// per project").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vision {
    pub mission: String,
    pub problem: String,
    pub vision_statement: String,
    pub personas: Vec<Persona>,
    pub capabilities: Vec<Capability>,
    pub risks: Vec<Risk>,
    pub requirements: Vec<String>,
    pub constraints: Vec<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Vision {
    pub fn new(mission: String, problem: String, vision_statement: String, now: DateTime<Utc>) -> Self {
        Self {
            mission,
            problem,
            vision_statement,
            personas: Vec::new(),
            capabilities: Vec::new(),
            risks: Vec::new(),
            requirements: Vec::new(),
            constraints: Vec::new(),
            created: now,
            updated: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationType {
    TaskCompleted,
    FileChanged,
    DecisionMade,
    PatternDetected,
    DriftWarning,
    AlignmentSuccess,
    RiskTriggered,
}

/// A mirrored event record (spec.md §3 "Observation").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: ObservationType,
    pub subject: String,
    pub content: String,
    pub relevance: f64,
    pub tags: Vec<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Manual,
    PhaseGate,
    Periodic,
    HighImpact,
    TaskComplete,
    SessionStart,
    CampaignStart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckResult {
    Passed,
    Warning,
    Failed,
    Blocked,
    Skipped,
}

/// The outcome of a single alignment check (spec.md §3 "AlignmentCheck").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentCheck {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub trigger: Trigger,
    pub subject: String,
    pub context: Option<String>,
    pub result: CheckResult,
    pub score: f64,
    pub explanation: String,
    pub suggestions: Vec<String>,
    pub duration: std::time::Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftSeverity {
    Minor,
    Moderate,
    Major,
    Critical,
}

impl DriftSeverity {
    /// `≥0.7 minor, ≥0.5 moderate, ≥0.3 major, else critical` (spec.md §4.3).
    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            DriftSeverity::Minor
        } else if score >= 0.5 {
            DriftSeverity::Moderate
        } else if score >= 0.3 {
            DriftSeverity::Major
        } else {
            DriftSeverity::Critical
        }
    }
}

/// A recorded deviation from the vision (spec.md §3 "DriftEvent").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub severity: DriftSeverity,
    pub category: String,
    pub description: String,
    pub evidence: Vec<String>,
    pub related_check_id: Option<Uuid>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<String>,
}

/// The guardian's single-row running state (spec.md §3 "GuardianState").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardianState {
    pub vision_defined: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub tasks_since_check: u32,
    pub active_drift_count: u32,
    pub overall_alignment: f64,
    pub session_observation_count: u32,
}

impl Default for GuardianState {
    fn default() -> Self {
        Self {
            vision_defined: false,
            last_check: None,
            tasks_since_check: 0,
            active_drift_count: 0,
            overall_alignment: 1.0,
            session_observation_count: 0,
        }
    }
}
