// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//
//! Finding things on disk and writing files safely

use super::process::{check_output, RunOptions};
use globset::{GlobBuilder, GlobMatcher};
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Errors raised by the filesystem helpers
#[derive(Debug, Error)]
pub enum FilesystemError {
    /// The search must start from a directory
    #[error("Cannot search from ({0}): not an existing directory.")]
    NotADirectory(PathBuf),

    /// The searched path is not a valid pattern
    #[error("Invalid path pattern {pattern}: {reason}")]
    InvalidPattern {
        /// The path that was looked for
        pattern: String,
        /// Why it was rejected
        reason: String,
    },

    /// An application is not on the PATH
    #[error("{0} cannot be located.")]
    ApplicationNotFound(String),

    /// Neither git nor a `.git` folder could tell where the repository starts
    #[error("Cannot find a .git folder in order to locate repo's root.")]
    CannotFindRepoRoot,

    /// Underlying I/O failure
    #[error("{action} {}: {source}", path.display())]
    Io {
        /// What was being done
        action: &'static str,
        /// The path involved
        path: PathBuf,
        /// The I/O error
        #[source]
        source: std::io::Error,
    },
}

fn io_error<'a>(action: &'static str, path: &'a Path) -> impl FnOnce(std::io::Error) -> FilesystemError + 'a {
    move |source| FilesystemError::Io {
        action,
        path: path.to_path_buf(),
        source,
    }
}

// =========================================================================
// Searching
// =========================================================================

/// Where [`find_paths`] looks
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchScope {
    /// Directly in the starting folder
    pub in_root: bool,
    /// In each parent of the starting folder
    pub in_parents: bool,
    /// Anywhere below the starting folder
    pub in_children: bool,
}

impl SearchScope {
    /// Look everywhere
    #[must_use]
    pub const fn everywhere() -> Self {
        Self {
            in_root: true,
            in_parents: true,
            in_children: true,
        }
    }
}

/// Find existing instances of `path_to_find`
///
/// The path may be a simple name (`pyproject.toml`), relative
/// (`../python-folder`) or specific (`python-folder/pyproject.toml`).
/// Results come from the root, then the parents, then the children.
///
/// # Errors
///
/// Fails when `search_from` is not a directory.
pub fn find_paths(
    path_to_find: &Path,
    search_from: &Path,
    scope: SearchScope,
) -> Result<Vec<PathBuf>, FilesystemError> {
    if !search_from.is_dir() {
        return Err(FilesystemError::NotADirectory(search_from.to_path_buf()));
    }

    let mut found = Vec::new();

    if scope.in_root {
        let candidate = search_from.join(path_to_find);
        if candidate.exists() {
            found.push(
                candidate
                    .canonicalize()
                    .map_err(io_error("Cannot resolve", &candidate))?,
            );
        }
    }

    if scope.in_parents {
        let absolute = absolute(search_from)?;
        for parent in absolute.ancestors().skip(1) {
            if parent.parent().is_none() {
                break;
            }
            let candidate = parent.join(path_to_find);
            if candidate.exists() {
                found.push(candidate);
            }
        }
    }

    if scope.in_children {
        let matcher = child_matcher(path_to_find)?;
        found.extend(
            WalkDir::new(search_from)
                .min_depth(1)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|entry| {
                    entry
                        .path()
                        .strip_prefix(search_from)
                        .is_ok_and(|relative| matcher.is_match(relative))
                })
                .map(walkdir::DirEntry::into_path),
        );
    }

    Ok(found)
}

fn child_matcher(path_to_find: &Path) -> Result<GlobMatcher, FilesystemError> {
    let pattern = path_to_find.to_string_lossy().replace('\\', "/");
    GlobBuilder::new(&format!("**/{pattern}"))
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|error| FilesystemError::InvalidPattern {
            pattern,
            reason: error.to_string(),
        })
}

fn absolute(path: &Path) -> Result<PathBuf, FilesystemError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(io_error("Cannot resolve", path))
}

/// Locate an application on the PATH
///
/// `search_path` replaces the `PATH` variable when given.
#[must_use]
pub fn find_application(name: &str, search_path: Option<&str>) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let paths = match search_path {
        Some(paths) => paths.into(),
        None => env::var_os("PATH")?,
    };
    env::split_paths(&paths)
        .flat_map(|folder| executable_names(name).map(move |file| folder.join(file)))
        .find(|path| is_executable(path))
}

/// Like [`find_application`], but a missing application is an error
///
/// # Errors
///
/// Fails when the application is not on the PATH.
pub fn require_application(name: &str) -> Result<PathBuf, FilesystemError> {
    find_application(name, None).ok_or_else(|| FilesystemError::ApplicationNotFound(name.to_string()))
}

#[cfg(windows)]
fn executable_names(name: &str) -> impl Iterator<Item = String> + '_ {
    ["", ".exe", ".cmd", ".bat"].into_iter().map(move |ext| format!("{name}{ext}"))
}

#[cfg(not(windows))]
fn executable_names(name: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(name.to_string())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Find the root of the git repository containing `path`
///
/// Asks git first, then looks for a `.git` folder in `path` and its
/// parents. When both fail, `default` is returned instead, if given.
///
/// # Errors
///
/// Fails when the root cannot be found and there is no default.
pub fn find_repo_root(path: &Path, default: Option<&Path>) -> Result<PathBuf, FilesystemError> {
    let start = absolute(path)?;
    let start = if start.is_file() {
        start.parent().map_or_else(|| start.clone(), Path::to_path_buf)
    } else {
        start
    };

    if let Some(git) = find_application("git", None) {
        let git = git.to_string_lossy().into_owned();
        let options = RunOptions::new().in_directory(&start);
        match check_output([git.as_str(), "rev-parse", "--show-toplevel"], &options) {
            Ok(root) if !root.is_empty() => return Ok(PathBuf::from(root)),
            Ok(_) => {}
            Err(error) => debug!("git cannot locate the repository root: {error}"),
        }
    }

    if start.is_dir() {
        let scope = SearchScope {
            in_root: true,
            in_parents: true,
            in_children: false,
        };
        let evidence = find_paths(Path::new(".git"), &start, scope)?;
        if let Some(root) = evidence.iter().find(|path| path.is_dir()).and_then(|path| path.parent()) {
            return Ok(root.to_path_buf());
        }
    }

    match default {
        Some(default) => absolute(default),
        None => Err(FilesystemError::CannotFindRepoRoot),
    }
}

// =========================================================================
// Writing
// =========================================================================

/// Move `new_file` over `to_overwrite` unless both are identical
///
/// `new_file` is always consumed. Returns whether the target was replaced.
///
/// # Errors
///
/// Fails on I/O errors.
pub fn replace_if_different(new_file: &Path, to_overwrite: &Path) -> Result<bool, FilesystemError> {
    let identical = to_overwrite.exists()
        && fs::read(new_file).map_err(io_error("Cannot read", new_file))?
            == fs::read(to_overwrite).map_err(io_error("Cannot read", to_overwrite))?;

    if identical {
        fs::remove_file(new_file).map_err(io_error("Cannot remove", new_file))?;
    } else {
        fs::rename(new_file, to_overwrite).map_err(io_error("Cannot replace", to_overwrite))?;
    }
    Ok(!identical)
}

/// Write text through a temporary file, then move it over `target`
///
/// With `only_if_changed`, an identical target (ignoring surrounding
/// whitespace under `dry_run`) is left alone. Returns whether the target
/// was, or would be, written.
///
/// # Errors
///
/// Fails on I/O errors.
pub fn safe_text_write(
    target: &Path,
    content: &str,
    only_if_changed: bool,
    dry_run: bool,
) -> Result<bool, FilesystemError> {
    if dry_run {
        if !only_if_changed || !target.exists() {
            return Ok(true);
        }
        let current = fs::read_to_string(target).map_err(io_error("Cannot read", target))?;
        return Ok(current.trim() != content.trim());
    }

    let folder = target
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut staged = tempfile::NamedTempFile::new_in(folder).map_err(io_error("Cannot stage", target))?;
    staged
        .write_all(content.as_bytes())
        .map_err(io_error("Cannot write", staged.path()))?;
    let (_, staged_path) = staged.keep().map_err(|error| FilesystemError::Io {
        action: "Cannot stage",
        path: target.to_path_buf(),
        source: error.error,
    })?;

    if only_if_changed {
        return replace_if_different(&staged_path, target);
    }
    fs::rename(&staged_path, target).map_err(io_error("Cannot replace", target))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_test_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("a/b")).unwrap();
        fs::create_dir_all(temp.path().join("c")).unwrap();
        fs::write(temp.path().join("pyproject.toml"), "").unwrap();
        fs::write(temp.path().join("a/pyproject.toml"), "").unwrap();
        fs::write(temp.path().join("a/b/pyproject.toml"), "").unwrap();
        fs::write(temp.path().join("c/other.toml"), "").unwrap();
        temp
    }

    #[test]
    fn test_find_paths_scopes() {
        let temp = make_test_tree();
        let name = Path::new("pyproject.toml");
        let root_only = SearchScope {
            in_root: true,
            ..SearchScope::default()
        };
        let children_only = SearchScope {
            in_children: true,
            ..SearchScope::default()
        };

        assert_eq!(find_paths(name, temp.path(), root_only).unwrap().len(), 1);
        assert_eq!(find_paths(name, temp.path(), children_only).unwrap().len(), 3);
        assert!(find_paths(name, temp.path(), SearchScope::default()).unwrap().is_empty());

        let nested = temp.path().join("a/b");
        let parents_only = SearchScope {
            in_parents: true,
            ..SearchScope::default()
        };
        let parents = find_paths(name, &nested, parents_only).unwrap();
        assert!(parents.contains(&temp.path().join("a/pyproject.toml")));
        assert!(parents.contains(&temp.path().join("pyproject.toml")));
    }

    #[test]
    fn test_find_specific_path_in_children() {
        let temp = make_test_tree();
        let found = find_paths(
            Path::new("b/pyproject.toml"),
            temp.path(),
            SearchScope {
                in_children: true,
                ..SearchScope::default()
            },
        )
        .unwrap();
        assert_eq!(found, vec![temp.path().join("a/b/pyproject.toml")]);
    }

    #[test]
    fn test_find_paths_requires_directory() {
        let temp = make_test_tree();
        let file = temp.path().join("pyproject.toml");
        assert!(matches!(
            find_paths(Path::new("x"), &file, SearchScope::everywhere()),
            Err(FilesystemError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_cannot_find_application() {
        assert!(find_application("devkit-surely-missing", Some("")).is_none());
        assert!(matches!(
            require_application("devkit-surely-missing"),
            Err(FilesystemError::ApplicationNotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_find_application() {
        assert!(find_application("sh", None).is_some());
    }

    #[test]
    fn test_repo_root_from_git_folder() {
        let temp = make_test_tree();
        fs::create_dir(temp.path().join(".git")).unwrap();
        let root = find_repo_root(&temp.path().join("a/b"), None).unwrap();
        assert_eq!(root.canonicalize().unwrap(), temp.path().canonicalize().unwrap());
    }

    #[test]
    fn test_safe_text_write() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("file.txt");

        assert!(safe_text_write(&target, "content", true, true).unwrap());
        assert!(!target.exists());

        assert!(safe_text_write(&target, "content", true, false).unwrap());
        assert_eq!(fs::read_to_string(&target).unwrap(), "content");

        assert!(!safe_text_write(&target, "content", true, false).unwrap());
        assert!(!safe_text_write(&target, "content\n", true, true).unwrap());
        assert!(safe_text_write(&target, "content", false, false).unwrap());

        // staged files never linger
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_replace_if_different() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("target");
        let staged = temp.path().join("staged");
        fs::write(&target, "same").unwrap();
        fs::write(&staged, "same").unwrap();

        assert!(!replace_if_different(&staged, &target).unwrap());
        assert!(!staged.exists());

        fs::write(&staged, "different").unwrap();
        assert!(replace_if_different(&staged, &target).unwrap());
        assert_eq!(fs::read_to_string(&target).unwrap(), "different");
    }
}
