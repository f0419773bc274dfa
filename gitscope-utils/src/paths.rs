//! Path helpers shared by the extraction and aggregation stages

use std::path::Path;

/// Normalize a repository-relative path to forward slashes.
///
/// Git already emits forward slashes in numstat output; this guards the
/// few places where paths come from the local filesystem instead.
pub fn normalize_path(path: &str) -> String {
    if path.contains('\\') {
        path.replace('\\', "/")
    } else {
        path.to_string()
    }
}

/// Derive the short repository name from its filesystem path.
///
/// The final path component, with a trailing `.git` suffix stripped.
/// Falls back to `"repository"` when the path has no usable component.
pub fn repo_short_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.trim_end_matches(".git"))
        .filter(|n| !n.is_empty())
        .unwrap_or("repository")
        .to_string()
}

/// First path component of a normalized repository-relative path.
///
/// Files at the repository root map to `"(root)"`.
pub fn top_level_module(path: &str) -> &str {
    match path.find('/') {
        Some(idx) => &path[..idx],
        None => "(root)",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("src/main.rs"), "src/main.rs");
        assert_eq!(normalize_path("src\\win\\main.rs"), "src/win/main.rs");
    }

    #[test]
    fn test_repo_short_name() {
        assert_eq!(repo_short_name(&PathBuf::from("/work/my-repo")), "my-repo");
        assert_eq!(repo_short_name(&PathBuf::from("/work/my-repo.git")), "my-repo");
        assert_eq!(repo_short_name(&PathBuf::from("/")), "repository");
    }

    #[test]
    fn test_top_level_module() {
        assert_eq!(top_level_module("src/lib.rs"), "src");
        assert_eq!(top_level_module("README.md"), "(root)");
        assert_eq!(top_level_module("a/b/c.py"), "a");
    }
}
