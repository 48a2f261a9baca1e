//! Path classification: which files are synced and as what.
//!
//! Eligibility is decided by extension alone. Directory removals bypass this
//! module entirely.

use std::path::{Component, Path};

use crate::types::SemanticType;

/// Extension (lowercase, without the dot) → semantic type.
const EXTENSION_TABLE: &[(&str, SemanticType)] = &[
    ("js", SemanticType::Script),
    ("mjs", SemanticType::Script),
    ("json", SemanticType::Json),
    ("glsl", SemanticType::Shader),
    ("vert", SemanticType::Shader),
    ("frag", SemanticType::Shader),
    ("txt", SemanticType::Text),
    ("html", SemanticType::Html),
    ("htm", SemanticType::Html),
    ("css", SemanticType::Css),
];

/// Result of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Eligible(SemanticType),
    Ineligible,
}

impl Classification {
    pub fn semantic_type(self) -> Option<SemanticType> {
        match self {
            Classification::Eligible(kind) => Some(kind),
            Classification::Ineligible => None,
        }
    }

    pub fn is_eligible(self) -> bool {
        matches!(self, Classification::Eligible(_))
    }
}

/// Decide whether `path` is sync-eligible. Pure and total.
pub fn classify(path: &Path) -> Classification {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(semantic_type_for_extension)
        .map(Classification::Eligible)
        .unwrap_or(Classification::Ineligible)
}

/// Case-insensitive lookup in the extension table.
pub fn semantic_type_for_extension(ext: &str) -> Option<SemanticType> {
    EXTENSION_TABLE
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(ext))
        .map(|(_, kind)| *kind)
}

/// Render a path with `/` separators, dropping any leading `./`.
pub fn to_wire_path(path: &Path) -> String {
    let mut wire = path.to_string_lossy().replace('\\', "/");
    while let Some(rest) = wire.strip_prefix("./") {
        wire = rest.to_string();
    }
    wire
}

/// Split a path into `(directory, filename)` wire strings.
///
/// Root-level files get an empty directory.
pub fn split_path(path: &Path) -> (String, String) {
    let wire = to_wire_path(path);
    match wire.rsplit_once('/') {
        Some((directory, filename)) => (directory.to_string(), filename.to_string()),
        None => (String::new(), wire),
    }
}

/// True when any component of `relative` is a dotfile or dot-directory.
pub fn is_hidden(relative: &Path) -> bool {
    relative.components().any(|component| match component {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_root_level_file_has_empty_directory() {
        assert_eq!(
            split_path(Path::new("a.js")),
            (String::new(), "a.js".to_string())
        );
    }

    #[test]
    fn split_nested_file() {
        assert_eq!(
            split_path(Path::new("src/utils/math.js")),
            ("src/utils".to_string(), "math.js".to_string())
        );
    }

    #[test]
    fn wire_path_normalises_backslashes_and_dot_prefix() {
        assert_eq!(to_wire_path(Path::new("./src\\lib\\a.js")), "src/lib/a.js");
    }

    #[test]
    fn hidden_detects_any_dot_component() {
        assert!(is_hidden(Path::new(".git/config")));
        assert!(is_hidden(Path::new("src/.cache/a.js")));
        assert!(!is_hidden(Path::new("src/a.js")));
        assert!(!is_hidden(Path::new("./src/a.js")));
    }
}
