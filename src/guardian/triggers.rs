//! Trigger evaluation (spec.md §4.3 "Triggers").

use crate::config::loader::GuardianConfig;
use crate::guardian::vision::Trigger;

/// Wildcard glob matching per SPEC_FULL.md §4.3: exact substring match for
/// patterns with no `*`, prefix match for `foo*`, suffix match for `*foo`,
/// substring match for `*foo*`.
pub fn glob_matches(pattern: &str, path: &str) -> bool {
    if let Some(inner) = pattern.strip_prefix('*').and_then(|p| p.strip_suffix('*')) {
        return !inner.is_empty() && path.contains(inner);
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return path.ends_with(suffix);
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return path.starts_with(prefix);
    }
    path.contains(pattern)
}

pub fn matches_high_impact(globs: &[String], files: &[String]) -> bool {
    files.iter().any(|file| globs.iter().any(|glob| glob_matches(glob, file)))
}

/// Whether `trigger` fires right now (spec.md §4.3 "Triggers"). `vision_set`
/// gates `manual` (`manual` "always fires when a vision exists").
pub fn should_fire(trigger: Trigger, config: &GuardianConfig, vision_set: bool, tasks_since_check: u32, files: &[String]) -> bool {
    match trigger {
        Trigger::Manual => vision_set,
        Trigger::PhaseGate => config.phase_gate_enabled,
        Trigger::Periodic => config.periodic_enabled && tasks_since_check >= config.periodic_interval as u32,
        Trigger::HighImpact => config.high_impact_enabled && matches_high_impact(&config.high_impact_globs, files),
        // Not named as firing by default in spec.md §4.3.
        Trigger::TaskComplete | Trigger::SessionStart | Trigger::CampaignStart => false,
    }
}
