//! Mock staleness detection and regeneration (spec.md §4.2 "Mock
//! regeneration"). Grounded on the same per-extension language detection
//! `research::codebase` uses, generalized here to interface/mock pairs.

use regex::Regex;

use crate::collaborators::LLMClient;
use crate::error::Result;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockLanguage {
    Go,
    TypeScript,
    Python,
    Unknown,
}

pub fn detect_language(interface_path: &str) -> MockLanguage {
    if interface_path.ends_with(".go") {
        MockLanguage::Go
    } else if interface_path.ends_with(".ts") || interface_path.ends_with(".js") {
        MockLanguage::TypeScript
    } else if interface_path.ends_with(".py") {
        MockLanguage::Python
    } else {
        MockLanguage::Unknown
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InterfaceDescriptor {
    pub package: Option<String>,
    pub interfaces: Vec<(String, Vec<String>)>,
}

/// Extract Go interface names, their method names, and the package name
/// from a `.go` source file's content. Method *signatures* are kept as the
/// raw method line (name plus parens) rather than a fully parsed AST.
pub fn parse_go_interfaces(source: &str) -> InterfaceDescriptor {
    let package_re = Regex::new(r"^package\s+(\w+)").expect("static regex");
    let iface_re = Regex::new(r"type\s+(\w+)\s+interface\s*\{").expect("static regex");
    let method_re = Regex::new(r"^\s*(\w+)\(").expect("static regex");

    let package = source.lines().find_map(|l| package_re.captures(l)).map(|c| c[1].to_string());

    let mut interfaces = Vec::new();
    let mut lines = source.lines().peekable();
    while let Some(line) = lines.next() {
        if let Some(caps) = iface_re.captures(line) {
            let name = caps[1].to_string();
            let mut methods = Vec::new();
            for body_line in lines.by_ref() {
                if body_line.trim_start().starts_with('}') {
                    break;
                }
                if let Some(m) = method_re.captures(body_line) {
                    methods.push(m[1].to_string());
                }
            }
            interfaces.push((name, methods));
        }
    }

    InterfaceDescriptor { package, interfaces }
}

/// Extract TypeScript/JavaScript interface names and method names from an
/// `interface Foo { ... }` block. Method signatures end in `;` rather than a
/// body, so the same brace-close scan the Go parser uses applies unchanged.
pub fn parse_ts_interfaces(source: &str) -> InterfaceDescriptor {
    let iface_re = Regex::new(r"interface\s+(\w+)").expect("static regex");
    let method_re = Regex::new(r"^\s*(\w+)\s*\(").expect("static regex");

    let mut interfaces = Vec::new();
    let mut lines = source.lines().peekable();
    while let Some(line) = lines.next() {
        if let Some(caps) = iface_re.captures(line) {
            let name = caps[1].to_string();
            let mut methods = Vec::new();
            for body_line in lines.by_ref() {
                if body_line.trim_start().starts_with('}') {
                    break;
                }
                if let Some(m) = method_re.captures(body_line) {
                    methods.push(m[1].to_string());
                }
            }
            interfaces.push((name, methods));
        }
    }

    InterfaceDescriptor { package: None, interfaces }
}

/// Extract Python class names and method names from a `class Foo(Protocol):`
/// or `class Foo(ABC):` block. Python has no braces, so the block ends at
/// the first non-blank line indented at or below the `class` line.
pub fn parse_python_interfaces(source: &str) -> InterfaceDescriptor {
    let class_re = Regex::new(r"^(\s*)class\s+(\w+)").expect("static regex");
    let method_re = Regex::new(r"^\s*def\s+(\w+)\(").expect("static regex");

    let lines: Vec<&str> = source.lines().collect();
    let mut interfaces = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let Some(caps) = class_re.captures(lines[i]) else {
            i += 1;
            continue;
        };
        let class_indent = caps[1].len();
        let name = caps[2].to_string();
        let mut methods = Vec::new();
        i += 1;
        while i < lines.len() {
            let line = lines[i];
            if line.trim().is_empty() {
                i += 1;
                continue;
            }
            let indent = line.len() - line.trim_start().len();
            if indent <= class_indent {
                break;
            }
            if let Some(m) = method_re.captures(line) {
                if &m[1] != "__init__" {
                    methods.push(m[1].to_string());
                }
            }
            i += 1;
        }
        interfaces.push((name, methods));
    }

    InterfaceDescriptor { package: None, interfaces }
}

/// A mock is stale when the mock file is missing, or any interface method
/// is absent from the existing mock content.
pub fn is_stale(interfaces: &[(String, Vec<String>)], mock_content: Option<&str>) -> bool {
    let Some(content) = mock_content else {
        return true;
    };
    interfaces
        .iter()
        .flat_map(|(_, methods)| methods.iter())
        .any(|method| !content.contains(method.as_str()))
}

/// Mock file path conventions (spec.md §4.2): Go places mocks alongside the
/// interface as `mock_<name>.go` under the caller's chosen directory; Jest
/// places them in a sibling `__mocks__` directory; pytest prefixes the
/// filename with `mock_`.
pub fn mock_path_for(interface_path: &str, language: MockLanguage) -> String {
    let path = std::path::Path::new(interface_path);
    let dir = path.parent().map(|p| p.to_string_lossy().to_string()).unwrap_or_default();
    let file_name = path.file_name().map(|f| f.to_string_lossy().to_string()).unwrap_or_default();

    match language {
        MockLanguage::Go => {
            if dir.is_empty() {
                format!("mock_{file_name}")
            } else {
                format!("{dir}/mock_{file_name}")
            }
        }
        MockLanguage::TypeScript => {
            if dir.is_empty() {
                format!("__mocks__/{file_name}")
            } else {
                format!("{dir}/__mocks__/{file_name}")
            }
        }
        MockLanguage::Python | MockLanguage::Unknown => {
            if dir.is_empty() {
                format!("mock_{file_name}")
            } else {
                format!("{dir}/mock_{file_name}")
            }
        }
    }
}

/// Synthesize mock source via the model when `mockgen` is unavailable
/// (caller decides PATH availability — this crate has no subprocess probing
/// beyond what `exec.rs` already does for test runs).
pub async fn synthesize_mock_source(
    llm: &dyn LLMClient,
    cancel: &CancellationToken,
    descriptor: &InterfaceDescriptor,
    language: MockLanguage,
) -> Result<String> {
    let interfaces_desc = descriptor
        .interfaces
        .iter()
        .map(|(name, methods)| format!("{name}({})", methods.join(", ")))
        .collect::<Vec<_>>()
        .join("; ");

    let prompt = format!(
        "Generate a {:?} mock implementation for these interfaces: {}. Package: {:?}. Output only code.",
        language, interfaces_desc, descriptor.package
    );
    let raw = llm.complete(cancel, &prompt).await?;
    Ok(crate::collaborators::PiggybackResponse::extract(&raw).surface)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "package storage\n\ntype Reader interface {\n\tRead(p []byte) (int, error)\n\tClose() error\n}\n";

    #[test]
    fn go_interface_parsing_extracts_package_name_and_methods() {
        let descriptor = parse_go_interfaces(SAMPLE);
        assert_eq!(descriptor.package.as_deref(), Some("storage"));
        assert_eq!(descriptor.interfaces.len(), 1);
        assert_eq!(descriptor.interfaces[0].0, "Reader");
        assert_eq!(descriptor.interfaces[0].1, vec!["Read".to_string(), "Close".to_string()]);
    }

    #[test]
    fn missing_mock_is_always_stale() {
        let descriptor = parse_go_interfaces(SAMPLE);
        assert!(is_stale(&descriptor.interfaces, None));
    }

    #[test]
    fn mock_missing_a_method_is_stale() {
        let descriptor = parse_go_interfaces(SAMPLE);
        assert!(is_stale(&descriptor.interfaces, Some("func (m *MockReader) Read(p []byte) (int, error) { return 0, nil }")));
    }

    #[test]
    fn mock_covering_every_method_is_fresh() {
        let descriptor = parse_go_interfaces(SAMPLE);
        let content = "func (m *MockReader) Read(p []byte) (int, error) { return 0, nil }\nfunc (m *MockReader) Close() error { return nil }";
        assert!(!is_stale(&descriptor.interfaces, Some(content)));
    }

    const TS_SAMPLE: &str = "export interface Reader {\n  read(p: Buffer): Promise<number>;\n  close(): Promise<void>;\n}\n";

    #[test]
    fn ts_interface_parsing_extracts_interface_name_and_methods() {
        let descriptor = parse_ts_interfaces(TS_SAMPLE);
        assert_eq!(descriptor.interfaces.len(), 1);
        assert_eq!(descriptor.interfaces[0].0, "Reader");
        assert_eq!(descriptor.interfaces[0].1, vec!["read".to_string(), "close".to_string()]);
    }

    const PY_SAMPLE: &str = "class Reader(Protocol):\n    def __init__(self):\n        pass\n\n    def read(self, p: bytes) -> int: ...\n    def close(self) -> None: ...\n";

    #[test]
    fn python_interface_parsing_extracts_class_name_and_methods_excluding_init() {
        let descriptor = parse_python_interfaces(PY_SAMPLE);
        assert_eq!(descriptor.interfaces.len(), 1);
        assert_eq!(descriptor.interfaces[0].0, "Reader");
        assert_eq!(descriptor.interfaces[0].1, vec!["read".to_string(), "close".to_string()]);
    }

    #[test]
    fn ts_and_python_mocks_go_stale_the_same_way_go_mocks_do() {
        let ts = parse_ts_interfaces(TS_SAMPLE);
        assert!(is_stale(&ts.interfaces, Some("export const mockReader = { read: jest.fn() };")));

        let py = parse_python_interfaces(PY_SAMPLE);
        assert!(!is_stale(&py.interfaces, Some("class MockReader:\n    def read(self, p): ...\n    def close(self): ...\n")));
    }

    #[test]
    fn mock_path_conventions_per_language() {
        assert_eq!(mock_path_for("internal/storage/reader.go", MockLanguage::Go), "internal/storage/mock_reader.go");
        assert_eq!(mock_path_for("src/client.ts", MockLanguage::TypeScript), "src/__mocks__/client.ts");
        assert_eq!(mock_path_for("app/db.py", MockLanguage::Python), "app/mock_db.py");
    }
}
