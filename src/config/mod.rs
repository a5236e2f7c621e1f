//! Runtime configuration (spec.md §5 timeouts/budget knobs, §4.3 thresholds).
//!
//! DESIGN DECISION: keep the teacher's `ConfigLevel` ladder (`loader.rs`) but
//! trim it from four tiers (System/Team/Project/User) to the two this crate
//! actually needs.
//! WHY: nothing here is a multi-seat enterprise product with team policy
//! enforcement; the only override this runtime recognizes is a project-local
//! `.toml` file layered over built-in defaults.

pub mod loader;
pub mod validator;

pub use loader::{ConfigLevel, ConfigLoader, RuntimeConfig};
pub use validator::ConfigValidator;
