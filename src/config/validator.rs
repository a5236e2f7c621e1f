//! Cross-field configuration validation (teacher's `ConfigValidator`
//! pattern: collect every error rather than failing on the first).

use super::RuntimeConfig;

pub type ValidationResult = std::result::Result<(), String>;

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &RuntimeConfig) -> ValidationResult {
        let mut errors = Vec::new();

        if config.rate_limiter.permits != 1 {
            errors.push(format!(
                "rate_limiter.permits must be 1 (spec.md §9 single-permit gate), got {}",
                config.rate_limiter.permits
            ));
        }

        if config.retry.max_attempts == 0 {
            errors.push("retry.max_attempts must be at least 1".to_string());
        }
        if config.retry.cap_ms < config.retry.base_ms {
            errors.push(format!(
                "retry.cap_ms ({}) must be >= retry.base_ms ({})",
                config.retry.cap_ms, config.retry.base_ms
            ));
        }

        let r = &config.research;
        if r.batch_size_min == 0 {
            errors.push("research.batch_size_min must be at least 1".to_string());
        }
        if r.batch_size_max < r.batch_size_min {
            errors.push(format!(
                "research.batch_size_max ({}) must be >= batch_size_min ({})",
                r.batch_size_max, r.batch_size_min
            ));
        }
        if r.batch_size_default < r.batch_size_min || r.batch_size_default > r.batch_size_max {
            errors.push(format!(
                "research.batch_size_default ({}) must fall within [{}, {}]",
                r.batch_size_default, r.batch_size_min, r.batch_size_max
            ));
        }
        if r.page_fetch_timeout_secs == 0 {
            errors.push("research.page_fetch_timeout_secs must be greater than 0".to_string());
        }

        let t = &config.tester;
        if t.test_timeout_secs == 0 || t.build_timeout_secs == 0 || t.coverage_timeout_secs == 0 {
            errors.push("tester timeouts must all be greater than 0".to_string());
        }

        let g = &config.guardian;
        if !(0.0..=1.0).contains(&g.block_threshold)
            || !(0.0..=1.0).contains(&g.failure_threshold)
            || !(0.0..=1.0).contains(&g.warning_threshold)
        {
            errors.push("guardian thresholds must all lie in [0.0, 1.0]".to_string());
        }
        if !(g.warning_threshold >= g.failure_threshold && g.failure_threshold >= g.block_threshold) {
            errors.push(format!(
                "guardian thresholds must satisfy warning ({}) >= failure ({}) >= block ({})",
                g.warning_threshold, g.failure_threshold, g.block_threshold
            ));
        }
        if g.periodic_interval == 0 {
            errors.push("guardian.periodic_interval must be at least 1".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }
}
