//! Deterministic classification of changed paths.

use std::path::{Component, Path};

/// What a changed path means for the verification gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    /// Warden's own state (`.warden/`) or VCS internals.
    State,
    /// Test code: changing it does not invalidate a verification.
    Test,
    /// Non-test source: changing it invalidates a verification.
    Source,
    /// Docs, assets, and everything else.
    Other,
}

const SOURCE_EXTENSIONS: [&str; 32] = [
    "rs", "py", "ts", "tsx", "js", "jsx", "mjs", "cjs", "go", "java", "kt", "kts", "swift", "c",
    "h", "cc", "cpp", "hpp", "cs", "rb", "php", "scala", "sh", "bash", "sql", "vue", "svelte",
    "ex", "exs", "lua", "zig", "dart",
];

const TEST_DIRS: [&str; 5] = ["tests", "test", "__tests__", "spec", "testdata"];

/// Classify a path relative to the project root.
pub fn classify_path(path: &Path) -> PathClass {
    let components: Vec<&str> = path
        .components()
        .filter_map(|component| match component {
            Component::Normal(name) => name.to_str(),
            _ => None,
        })
        .collect();

    if components
        .iter()
        .any(|name| *name == ".warden" || *name == ".git")
    {
        return PathClass::State;
    }

    let Some(file_name) = components.last() else {
        return PathClass::Other;
    };
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let Some(extension) = extension else {
        return PathClass::Other;
    };
    if !SOURCE_EXTENSIONS.contains(&extension.as_str()) {
        return PathClass::Other;
    }

    let dirs = &components[..components.len() - 1];
    if dirs.iter().any(|dir| TEST_DIRS.contains(dir)) || is_test_file_name(file_name) {
        return PathClass::Test;
    }
    PathClass::Source
}

fn is_test_file_name(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name);
    stem.starts_with("test_")
        || stem.ends_with("_test")
        || stem.ends_with("_tests")
        || stem.ends_with("_spec")
        || name.contains(".test.")
        || name.contains(".spec.")
}

/// True when the path names a verification gate record, in any work area.
pub fn is_gate_record(path: &Path) -> bool {
    let mut in_warden = false;
    for component in path.components() {
        if let Component::Normal(name) = component {
            if name == ".warden" {
                in_warden = true;
            }
        }
    }
    in_warden
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name == "gate" || name.starts_with("gate-"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_files_are_source() {
        assert_eq!(classify_path(Path::new("src/lib.rs")), PathClass::Source);
        assert_eq!(classify_path(Path::new("./app/main.py")), PathClass::Source);
    }

    #[test]
    fn test_files_are_test() {
        assert_eq!(classify_path(Path::new("tests/cli.rs")), PathClass::Test);
        assert_eq!(classify_path(Path::new("pkg/foo_test.go")), PathClass::Test);
        assert_eq!(classify_path(Path::new("web/button.test.tsx")), PathClass::Test);
        assert_eq!(classify_path(Path::new("py/test_api.py")), PathClass::Test);
    }

    #[test]
    fn state_and_docs_do_not_count_as_source() {
        assert_eq!(classify_path(Path::new(".warden/state/gate")), PathClass::State);
        assert_eq!(classify_path(Path::new("README.md")), PathClass::Other);
        assert_eq!(classify_path(Path::new("Makefile")), PathClass::Other);
    }

    #[test]
    fn similar_prefix_is_not_state() {
        assert_eq!(classify_path(Path::new(".wardenx/x.rs")), PathClass::Source);
    }

    #[test]
    fn gate_records_are_recognized() {
        assert!(is_gate_record(Path::new("/repo/.warden/state/gate-abc123")));
        assert!(is_gate_record(Path::new(".warden/state/gate")));
        assert!(!is_gate_record(Path::new(".warden/state/test-status")));
        assert!(!is_gate_record(Path::new("src/gate.rs")));
    }
}
