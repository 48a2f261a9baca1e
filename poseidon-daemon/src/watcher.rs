//! Filesystem watcher feeding the change queue.
//!
//! notify delivers events on its own thread; the callback maps them to
//! [`RawEvent`]s and calls [`ChangeQueue::enqueue`], which never blocks.
//! Dotfiles and dot-directories are never reported.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use notify::event::{CreateKind, MetadataKind, ModifyKind, RemoveKind, RenameMode};
use notify::{
    recommended_watcher, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode,
    Watcher,
};

use poseidon_core::classify::is_hidden;
use poseidon_core::{RawEvent, WatchConfig};
use poseidon_sync::ChangeQueue;

use crate::error::DaemonError;

/// Keeps the notify backend alive. Dropping it stops event emission; actions
/// already enqueued are unaffected.
pub struct WatcherHandle {
    _backend: Backend,
}

enum Backend {
    Native(RecommendedWatcher),
    Poll(PollWatcher),
}

/// Start watching `root` recursively, enqueueing every change on `queue`.
///
/// With `initial_sync` every existing file is enqueued as `Created` first, in
/// sorted path order. The backend is registered before the scan, so a file
/// written in between may be reported twice but is never missed.
pub fn start_watcher(
    root: &Path,
    config: &WatchConfig,
    queue: ChangeQueue,
) -> Result<WatcherHandle, DaemonError> {
    let mapper = Arc::new(Mutex::new(EventMapper::new(root)));
    // Held until the scan is done so live events map against the full tree.
    let shared = Arc::clone(&mapper);
    let mut scanning = lock_mapper(&mapper);

    let events_queue = queue.clone();
    let handler = move |result: notify::Result<Event>| match result {
        Ok(event) => {
            for raw in lock_mapper(&shared).map(&event) {
                if let Err(err) = events_queue.enqueue(raw) {
                    tracing::warn!(error = %err, "dropping watcher event");
                }
            }
        }
        Err(err) => tracing::warn!(error = %err, "watcher event error"),
    };

    let backend = if config.poll {
        let options = notify::Config::default().with_poll_interval(config.poll_interval());
        let mut watcher = PollWatcher::new(handler, options)?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        Backend::Poll(watcher)
    } else {
        let mut watcher = recommended_watcher(handler)?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        Backend::Native(watcher)
    };

    let existing = scanning.scan(Path::new(""));
    let enqueued = if config.initial_sync {
        tracing::debug!(files = existing.len(), "enqueueing initial scan");
        existing
            .into_iter()
            .try_for_each(|event| queue.enqueue(event).map(drop))
    } else {
        Ok(())
    };
    drop(scanning);
    enqueued?;

    tracing::debug!(root = %root.display(), poll = config.poll, "watcher started");
    Ok(WatcherHandle { _backend: backend })
}

fn lock_mapper(mapper: &Mutex<EventMapper>) -> MutexGuard<'_, EventMapper> {
    mapper.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Translates notify events into root-relative [`RawEvent`]s.
///
/// Tracks the directories it has seen so that removals reported without a
/// file/folder hint (polling, some platforms) can still be told apart.
pub(crate) struct EventMapper {
    root: PathBuf,
    known_dirs: HashSet<PathBuf>,
}

impl EventMapper {
    pub(crate) fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            known_dirs: HashSet::new(),
        }
    }

    /// Walk `relative_dir`, record its directories, and return a `Created`
    /// event for each visible file.
    pub(crate) fn scan(&mut self, relative_dir: &Path) -> Vec<RawEvent> {
        let mut dirs = vec![relative_dir.to_path_buf()];
        let mut files = Vec::new();
        let mut cursor = 0;
        while cursor < dirs.len() {
            let current = dirs[cursor].clone();
            cursor += 1;
            let absolute = self.root.join(&current);
            let entries = match fs::read_dir(&absolute) {
                Ok(entries) => entries,
                Err(err) => {
                    if err.kind() != ErrorKind::NotFound {
                        tracing::warn!(path = %absolute.display(), error = %err, "scan failed");
                    }
                    continue;
                }
            };
            for entry in entries.flatten() {
                let relative = current.join(entry.file_name());
                if is_hidden(&relative) {
                    continue;
                }
                match entry.file_type() {
                    Ok(ty) if ty.is_dir() => {
                        self.known_dirs.insert(relative.clone());
                        dirs.push(relative);
                    }
                    Ok(_) => files.push(relative),
                    Err(err) => {
                        tracing::debug!(path = %relative.display(), error = %err, "skipping entry")
                    }
                }
            }
        }
        files.sort();
        files.into_iter().map(RawEvent::created).collect()
    }

    pub(crate) fn map(&mut self, event: &Event) -> Vec<RawEvent> {
        let paths = event.paths.as_slice();
        match &event.kind {
            EventKind::Create(kind) => paths
                .iter()
                .flat_map(|p| self.created(p, matches!(kind, CreateKind::Folder)))
                .collect(),
            EventKind::Modify(ModifyKind::Name(mode)) => self.renamed(*mode, paths),
            EventKind::Modify(
                ModifyKind::Data(_)
                | ModifyKind::Any
                | ModifyKind::Metadata(MetadataKind::WriteTime),
            ) => paths.iter().filter_map(|p| self.modified(p)).collect(),
            EventKind::Remove(kind) => paths
                .iter()
                .filter_map(|p| self.removed(p, matches!(kind, RemoveKind::Folder)))
                .collect(),
            _ => Vec::new(),
        }
    }

    fn renamed(&mut self, mode: RenameMode, paths: &[PathBuf]) -> Vec<RawEvent> {
        match (mode, paths) {
            (RenameMode::From, _) => paths.iter().filter_map(|p| self.removed(p, false)).collect(),
            (RenameMode::To, _) => paths.iter().flat_map(|p| self.created(p, false)).collect(),
            (RenameMode::Both, [from, to]) => {
                let mut events: Vec<RawEvent> = self.removed(from, false).into_iter().collect();
                events.extend(self.created(to, false));
                events
            }
            _ => paths
                .iter()
                .flat_map(|p| {
                    if p.exists() {
                        self.created(p, false)
                    } else {
                        self.removed(p, false).into_iter().collect()
                    }
                })
                .collect(),
        }
    }

    fn created(&mut self, path: &Path, folder_hint: bool) -> Vec<RawEvent> {
        let Some(relative) = self.relativize(path) else {
            return Vec::new();
        };
        if folder_hint || path.is_dir() {
            // A directory moved into the tree arrives with its contents.
            if self.known_dirs.insert(relative.clone()) {
                return self.scan(&relative);
            }
            return Vec::new();
        }
        vec![RawEvent::created(relative)]
    }

    fn modified(&self, path: &Path) -> Option<RawEvent> {
        let relative = self.relativize(path)?;
        if path.is_dir() {
            return None;
        }
        Some(RawEvent::modified(relative))
    }

    fn removed(&mut self, path: &Path, folder_hint: bool) -> Option<RawEvent> {
        let relative = self.relativize(path)?;
        if folder_hint || self.known_dirs.contains(&relative) {
            self.known_dirs.retain(|dir| !dir.starts_with(&relative));
            return Some(RawEvent::removed_dir(relative));
        }
        Some(RawEvent::removed(relative))
    }

    fn relativize(&self, path: &Path) -> Option<PathBuf> {
        let relative = path.strip_prefix(&self.root).ok()?;
        if relative.as_os_str().is_empty() || is_hidden(relative) {
            return None;
        }
        Some(relative.to_path_buf())
    }
}
