//! Test framework detection and command construction (spec.md §4.2
//! "Framework detection", "Command construction").

use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framework {
    GoTest,
    Jest,
    Pytest,
    Cargo,
    Junit,
    XUnit,
    RSpec,
    PhpUnit,
}

impl Framework {
    pub fn name(&self) -> &'static str {
        match self {
            Framework::GoTest => "gotest",
            Framework::Jest => "jest",
            Framework::Pytest => "pytest",
            Framework::Cargo => "cargo",
            Framework::Junit => "junit",
            Framework::XUnit => "xunit",
            Framework::RSpec => "rspec",
            Framework::PhpUnit => "phpunit",
        }
    }
}

/// Detect framework from a file extension; unknown extensions default to
/// `gotest` per spec.md §4.2.
pub fn detect_from_path(path: &str) -> Framework {
    let ext = Path::new(path).extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
    match ext.as_str() {
        "go" => Framework::GoTest,
        "ts" | "js" | "tsx" | "jsx" => Framework::Jest,
        "py" => Framework::Pytest,
        "rs" => Framework::Cargo,
        "java" => Framework::Junit,
        "cs" => Framework::XUnit,
        "rb" => Framework::RSpec,
        "php" => Framework::PhpUnit,
        _ => Framework::GoTest,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameworkCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Build the CLI invocation for `framework`, targeting `target` (a file,
/// package, or directory — empty means "everything"), with the
/// framework-appropriate coverage flags enabled when `coverage` is true.
pub fn build_command(framework: Framework, target: Option<&str>, coverage: bool) -> FrameworkCommand {
    let target = target.filter(|t| !t.is_empty());
    match framework {
        Framework::GoTest => {
            let mut args = vec!["test".to_string()];
            if coverage {
                args.push("-cover".to_string());
            }
            args.push(target.unwrap_or("./...").to_string());
            FrameworkCommand { program: "go".to_string(), args }
        }
        Framework::Jest => {
            let mut args = vec!["jest".to_string()];
            if coverage {
                args.push("--coverage".to_string());
            }
            if let Some(t) = target {
                args.push(t.to_string());
            }
            FrameworkCommand { program: "npx".to_string(), args }
        }
        Framework::Pytest => {
            let mut args = Vec::new();
            if coverage {
                args.push("--cov=.".to_string());
                args.push("--cov-report=term".to_string());
            }
            if let Some(t) = target {
                args.push(t.to_string());
            }
            FrameworkCommand { program: "pytest".to_string(), args }
        }
        Framework::Cargo => {
            let mut args = vec!["test".to_string()];
            if let Some(t) = target {
                args.push(t.to_string());
            }
            if coverage {
                // no native cargo-test coverage; delegate to the tarpaulin
                // convention the corpus reaches for elsewhere.
                return FrameworkCommand {
                    program: "cargo".to_string(),
                    args: vec!["tarpaulin".to_string(), "--out".to_string(), "Stdout".to_string()],
                };
            }
            FrameworkCommand { program: "cargo".to_string(), args }
        }
        Framework::Junit => {
            let mut args = vec!["test".to_string()];
            if coverage {
                args.push("jacoco:report".to_string());
            }
            if let Some(t) = target {
                args.push(format!("-Dtest={t}"));
            }
            FrameworkCommand { program: "mvn".to_string(), args }
        }
        Framework::XUnit => {
            let mut args = vec!["test".to_string()];
            if coverage {
                args.push("--collect:XPlat Code Coverage".to_string());
            }
            if let Some(t) = target {
                args.push(t.to_string());
            }
            FrameworkCommand { program: "dotnet".to_string(), args }
        }
        Framework::RSpec => {
            let mut args = vec!["exec".to_string(), "rspec".to_string()];
            if let Some(t) = target {
                args.push(t.to_string());
            }
            FrameworkCommand { program: "bundle".to_string(), args }
        }
        Framework::PhpUnit => {
            let mut args = Vec::new();
            if coverage {
                args.push("--coverage-text".to_string());
            }
            if let Some(t) = target {
                args.push(t.to_string());
            }
            FrameworkCommand { program: "phpunit".to_string(), args }
        }
    }
}
