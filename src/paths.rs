//! Path normalization, absolute↔project-relative conversion and cache-key
//! derivation (C1).
//!
//! All paths stored on [`crate::file_record::FileRecord`] and in the manifest
//! use forward slashes regardless of host platform, the same way the
//! compiler ancestor this crate is descended from rebases paths before
//! persisting them to its own JSON cache.

use std::path::{Component, Path, PathBuf};

use path_slash::PathExt as _;

/// Converts `path` to a string with forward-slash separators, without
/// touching the filesystem. Used for manifest keys and cache-name derivation.
pub fn to_slash(path: &Path) -> String {
    path.to_slash_lossy().into_owned()
}

/// Returns `path` relative to `root`, forward-slash separated.
///
/// Returns `None` if `path` is not inside `root`.
pub fn project_relative(root: &Path, path: &Path) -> Option<PathBuf> {
    path.strip_prefix(root).ok().map(|p| PathBuf::from(to_slash(p)))
}

/// Joins a project-relative (forward-slash) path back onto an absolute root.
pub fn to_absolute(root: &Path, relative: &str) -> PathBuf {
    root.join(relative)
}

/// Lexically normalizes `.`/`..` components without touching the filesystem
/// (no symlink resolution). Mirrors the manual `Component`-based resolution
/// used by reference-detector style import resolvers in the wild, since
/// `std::fs::canonicalize` would require the path to exist.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Derives the deterministic, flat cache-name for a project-relative path:
/// `/` → `-`, and a trailing `.ts`/`.tsx` extension → `.js`.
///
/// This is a pure function of the relative path (invariant 5 / §8): same
/// input bytes always produce the same cache name, and the result never
/// contains a path separator, so every artifact lives directly under
/// `cache/` with no nested directories (§9 open question (c)).
pub fn cache_name(relative: &str) -> String {
    let flat = relative.replace('/', "-");
    if let Some(stripped) = flat.strip_suffix(".tsx") {
        format!("{stripped}.js")
    } else if let Some(stripped) = flat.strip_suffix(".ts") {
        format!("{stripped}.js")
    } else {
        flat
    }
}

/// The ordered list of extensions the import parser (C3) probes when a
/// specifier has no extension of its own.
pub const RESOLVE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs"];

/// `true` if `path` ends in `.d.ts` — such files yield an empty import map
/// and never contribute to the dependency graph (§8 boundary behaviors).
pub fn is_declaration_file(path: &Path) -> bool {
    path.file_name().and_then(|n| n.to_str()).map(|n| n.ends_with(".d.ts")).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_name_replaces_slashes_and_extension() {
        assert_eq!(cache_name("src/app/users/main.ts"), "src-app-users-main.js");
        assert_eq!(cache_name("src/app/users/main.tsx"), "src-app-users-main.js");
        assert_eq!(cache_name("src/app/users/helper.js"), "src-app-users-helper.js");
    }

    #[test]
    fn cache_name_is_deterministic() {
        let rel = "src/app/orders/shared/utils.ts";
        assert_eq!(cache_name(rel), cache_name(rel));
    }

    #[test]
    fn normalize_lexically_resolves_parent_dirs() {
        let p = Path::new("src/app/./users/../shared/utils.ts");
        assert_eq!(normalize_lexically(p), PathBuf::from("src/app/shared/utils.ts"));
    }

    #[test]
    fn declaration_file_detection() {
        assert!(is_declaration_file(Path::new("src/types/global.d.ts")));
        assert!(!is_declaration_file(Path::new("src/types/global.ts")));
    }

    #[test]
    fn project_relative_strips_root() {
        let root = Path::new("/home/user/project");
        let abs = Path::new("/home/user/project/src/main.ts");
        assert_eq!(project_relative(root, abs), Some(PathBuf::from("src/main.ts")));
    }
}
