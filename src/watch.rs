//! File watching shared by the development server supervisor and the live
//! reload coordinator.
//!
//! Manifest globs are split into a static root and an absolute pattern used
//! to filter the events coming out of it. Directory roots are watched
//! recursively, while the parent of a concrete file is watched on its own, so
//! `server.js` does not pull the whole project (and `node_modules`) in. Events
//! are debounced, and a change is only reported when the content hash of the
//! file differs from the last one seen.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use glob::Pattern;
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, Debouncer, RecommendedCache, new_debouncer};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

use crate::core::Hash32;
use crate::error::WatchError;

const DEBOUNCE: Duration = Duration::from_millis(250);

/// A directory handed to the underlying watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WatchRoot {
    pub path: Utf8PathBuf,
    pub mode: RecursiveMode,
}

pub(crate) struct FileWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    rx: UnboundedReceiver<DebounceEventResult>,
    filters: Vec<Pattern>,
    hashes: HashMap<Utf8PathBuf, Hash32>,
}

impl FileWatcher {
    /// Start watching every file matched by `globs`, relative to `root`.
    pub(crate) fn new<'a>(
        root: &Utf8Path,
        globs: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, WatchError> {
        let (tx, rx) = unbounded_channel();
        let mut debouncer = new_debouncer(DEBOUNCE, None, move |result: DebounceEventResult| {
            // The receiver is gone once the watcher is dropped.
            let _ = tx.send(result);
        })?;

        let (roots, filters) = plan_watch(root, globs);
        for WatchRoot { path, mode } in roots {
            tracing::debug!("watching {path} ({mode:?})");
            debouncer.watch(path.as_std_path(), mode)?;
        }

        let hashes = seed_hashes(&filters);

        Ok(Self {
            _debouncer: debouncer,
            rx,
            filters,
            hashes,
        })
    }

    /// Wait for the next batch of changed files. Returns `None` when the
    /// underlying watcher has stopped.
    pub(crate) async fn next(&mut self) -> Option<Vec<Utf8PathBuf>> {
        loop {
            let events = match self.rx.recv().await? {
                Ok(events) => events,
                Err(errors) => {
                    for e in errors {
                        tracing::error!("watch error: {e:?}");
                    }
                    continue;
                }
            };

            let mut changed = Vec::new();
            for event in events {
                if event.event.kind.is_access() {
                    continue;
                }

                for path in &event.event.paths {
                    let Some(path) = Utf8Path::from_path(path) else {
                        continue;
                    };

                    if !self.matches(path) || changed.iter().any(|c| c == path) {
                        continue;
                    }

                    if self.is_modified(path) {
                        changed.push(path.to_path_buf());
                    }
                }
            }

            if !changed.is_empty() {
                tracing::debug!("{} files changed", changed.len());
                return Some(changed);
            }
        }
    }

    fn matches(&self, path: &Utf8Path) -> bool {
        self.filters.iter().any(|filter| filter.matches(path.as_str()))
    }

    /// Compare the file against its last known content hash. Removed or
    /// unreadable files always count as modified.
    fn is_modified(&mut self, path: &Utf8Path) -> bool {
        match Hash32::hash_file(path) {
            Ok(hash) => self.hashes.insert(path.to_path_buf(), hash) != Some(hash),
            Err(_) => {
                self.hashes.remove(path);
                true
            }
        }
    }
}

/// Resolve every glob, returning the directories to watch and the patterns
/// events are filtered with. Globs whose static root is missing are skipped.
fn plan_watch<'a>(
    root: &Utf8Path,
    globs: impl IntoIterator<Item = &'a str>,
) -> (Vec<WatchRoot>, Vec<Pattern>) {
    let mut recursive = HashSet::new();
    let mut shallow = HashSet::new();
    let mut filters = Vec::new();

    for glob in globs {
        match resolve_watch_path(root, glob) {
            Ok((watch, pattern)) => {
                if watch.mode == RecursiveMode::Recursive {
                    recursive.insert(watch.path);
                } else {
                    shallow.insert(watch.path);
                }
                filters.push(pattern);
            }
            Err(e) => tracing::debug!("not watching {glob}: {e}"),
        }
    }

    let recursive = collapse_watch_paths(recursive);
    let mut shallow: Vec<_> = shallow
        .into_iter()
        .filter(|dir| !recursive.iter().any(|root| dir.starts_with(root)))
        .collect();
    shallow.sort();

    let roots = recursive
        .into_iter()
        .map(|path| WatchRoot {
            path,
            mode: RecursiveMode::Recursive,
        })
        .chain(shallow.into_iter().map(|path| WatchRoot {
            path,
            mode: RecursiveMode::NonRecursive,
        }))
        .collect();

    (roots, filters)
}

fn seed_hashes(filters: &[Pattern]) -> HashMap<Utf8PathBuf, Hash32> {
    let files: Vec<_> = filters
        .iter()
        .filter_map(|pattern| glob::glob(pattern.as_str()).ok())
        .flatten()
        .filter_map(Result::ok)
        .filter_map(|path| Utf8PathBuf::try_from(path).ok())
        .filter(|path| path.is_file())
        .collect();

    files
        .into_par_iter()
        .filter_map(|path| Hash32::hash_file(&path).ok().map(|hash| (path, hash)))
        .collect()
}

/// Splits a glob string into a canonicalized static root (for watching) and
/// a compiled absolute Pattern (for matching).
pub(crate) fn resolve_watch_path(
    root: &Utf8Path,
    glob_str: &str,
) -> Result<(WatchRoot, Pattern), WatchError> {
    let path = Utf8Path::new(glob_str);

    // Split path into static root and dynamic suffix (containing wildcards)
    let components: Vec<_> = path.components().collect();
    let split_idx = components
        .iter()
        .position(|c| c.as_str().contains(['*', '?', '[']))
        .unwrap_or(components.len());

    let root_part: Utf8PathBuf = components.iter().take(split_idx).collect();
    let suffix_part: Utf8PathBuf = components.iter().skip(split_idx).collect();

    // The static part must exist on disk
    let absolute_root = root.join(root_part).canonicalize_utf8()?;

    let (path, mode, pattern) = if suffix_part.as_str().is_empty() {
        if absolute_root.is_file() {
            // Concrete file: watch the parent alone so atomic writes are caught
            let parent = absolute_root
                .parent()
                .unwrap_or(&absolute_root)
                .to_path_buf();
            let pattern = Pattern::escape(absolute_root.as_str());
            (parent, RecursiveMode::NonRecursive, pattern)
        } else {
            // Concrete directory: everything below it
            let pattern = format!("{}/**/*", Pattern::escape(absolute_root.as_str()));
            (absolute_root, RecursiveMode::Recursive, pattern)
        }
    } else {
        let pattern = format!("{}/{}", Pattern::escape(absolute_root.as_str()), suffix_part);
        (absolute_root, RecursiveMode::Recursive, pattern)
    };

    Ok((WatchRoot { path, mode }, Pattern::new(&pattern)?))
}

/// Reduces a set of paths to the minimal set of watch roots.
///
/// If we watch `/a` and `/a/b`, we only need to watch `/a` because
/// the watcher is recursive. This function sorts the paths and filters
/// out any path that is a subdirectory of a previously accepted path.
fn collapse_watch_paths(paths: HashSet<Utf8PathBuf>) -> Vec<Utf8PathBuf> {
    let mut paths: Vec<_> = paths.into_iter().collect();
    paths.sort();

    let mut filtered: Vec<Utf8PathBuf> = Vec::new();
    for path in paths {
        if filtered.last().is_some_and(|last| path.starts_with(last)) {
            continue;
        }
        filtered.push(path);
    }

    filtered
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::manifest::{AssetManifest, Group};

    fn project() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path())
            .unwrap()
            .canonicalize_utf8()
            .unwrap();
        fs::create_dir_all(root.join("modules/core/server")).unwrap();
        fs::write(root.join("server.js"), "").unwrap();
        (dir, root)
    }

    #[test]
    fn test_concrete_file() {
        let (_dir, root) = project();
        let (watch, pattern) = resolve_watch_path(&root, "server.js").unwrap();

        assert_eq!(watch.path, root);
        assert_eq!(watch.mode, RecursiveMode::NonRecursive);
        assert_eq!(pattern.as_str(), root.join("server.js"));
    }

    #[test]
    fn test_directory_wildcard() {
        let (_dir, root) = project();
        let (watch, pattern) = resolve_watch_path(&root, "modules/*/server/**/*.js").unwrap();

        assert_eq!(watch.path, root.join("modules"));
        assert_eq!(watch.mode, RecursiveMode::Recursive);
        assert_eq!(pattern.as_str(), root.join("modules/*/server/**/*.js"));
        assert!(pattern.matches(root.join("modules/core/server/routes/core.js").as_str()));
        assert!(!pattern.matches(root.join("modules/core/client/core.js").as_str()));
    }

    #[test]
    fn test_concrete_directory() {
        let (_dir, root) = project();
        let (watch, pattern) = resolve_watch_path(&root, "modules").unwrap();

        assert_eq!(watch.path, root.join("modules"));
        assert_eq!(watch.mode, RecursiveMode::Recursive);
        assert!(pattern.matches(root.join("modules/core/server/a.js").as_str()));
    }

    #[test]
    fn test_missing_static_root() {
        let (_dir, root) = project();
        assert!(resolve_watch_path(&root, "public/lib/**/*.js").is_err());
    }

    #[test]
    fn test_collapse_watch_paths() {
        let mut paths = HashSet::new();
        paths.insert(Utf8PathBuf::from("/a"));
        paths.insert(Utf8PathBuf::from("/a/b"));
        paths.insert(Utf8PathBuf::from("/a/b/c"));
        paths.insert(Utf8PathBuf::from("/b"));
        paths.insert(Utf8PathBuf::from("/c/d"));

        let collapsed = collapse_watch_paths(paths);

        // /a/b and /a/b/c are covered by /a.
        assert_eq!(
            collapsed,
            vec![
                Utf8PathBuf::from("/a"),
                Utf8PathBuf::from("/b"),
                Utf8PathBuf::from("/c/d")
            ]
        );
    }

    #[test]
    fn test_collapse_watch_paths_similar_names() {
        let mut paths = HashSet::new();
        paths.insert(Utf8PathBuf::from("/foo"));
        paths.insert(Utf8PathBuf::from("/foo-bar"));

        // /foo-bar is not a subdirectory of /foo
        assert_eq!(
            collapse_watch_paths(paths),
            vec![Utf8PathBuf::from("/foo"), Utf8PathBuf::from("/foo-bar")]
        );
    }

    #[test]
    fn test_root_file_does_not_watch_project_recursively() {
        let (_dir, root) = project();
        for dir in ["config/env", "node_modules/express/lib"] {
            fs::create_dir_all(root.join(dir)).unwrap();
        }

        let assets = AssetManifest::default();
        let groups = [Group::ServerViews, Group::ServerJs, Group::ServerConfig];
        let (roots, filters) = plan_watch(&root, assets.union(&groups));

        let recursive: Vec<_> = roots
            .iter()
            .filter(|watch| watch.mode == RecursiveMode::Recursive)
            .map(|watch| watch.path.clone())
            .collect();
        assert_eq!(recursive, [root.join("config"), root.join("modules")]);
        assert!(!recursive.iter().any(|dir| root.join("node_modules").starts_with(dir)));

        let shallow = WatchRoot {
            path: root.clone(),
            mode: RecursiveMode::NonRecursive,
        };
        assert!(roots.contains(&shallow));
        assert!(filters.iter().any(|f| f.matches(root.join("server.js").as_str())));
    }

    #[test]
    fn test_shallow_parent_inside_recursive_root_is_dropped() {
        let (_dir, root) = project();
        fs::write(root.join("modules/core/server/app.js"), "").unwrap();

        let globs = ["modules/core/server/app.js", "modules/*/server/**/*.js"];
        let (roots, _) = plan_watch(&root, globs);

        assert_eq!(
            roots,
            [WatchRoot {
                path: root.join("modules"),
                mode: RecursiveMode::Recursive,
            }]
        );
    }

    #[test]
    fn test_seed_hashes_skip_unchanged_saves() {
        let (_dir, root) = project();
        let file = root.join("modules/core/server/core.js");
        fs::write(&file, "module.exports = 1;").unwrap();

        let (_, pattern) = resolve_watch_path(&root, "modules/*/server/*.js").unwrap();
        let hashes = seed_hashes(&[pattern]);

        assert_eq!(hashes.get(&file), Some(&Hash32::hash("module.exports = 1;")));
    }
}
