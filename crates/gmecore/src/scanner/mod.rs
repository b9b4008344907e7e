//! Catalog scanning and debounced rescan requests.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Result;

use crate::config::state::StateDoc;
use crate::modinfo::ModEntry;
use crate::overlay::Layout;

/// Directories whose name starts with this character are engine-internal
/// (`!BACKUP`, `!INSTLOGS`) and never scanned as mods.
pub const MARKER_CHAR: char = '!';

/// Default quiet window before a change burst collapses into one rescan.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(300);

/// Rebuild the catalog from the top-level subdirectories of the mods root,
/// hydrated from the state document. Read-only: two scans with no
/// filesystem change in between produce identical entries and write
/// nothing.
pub fn scan_mods(layout: &Layout) -> Result<Vec<ModEntry>> {
    let state = StateDoc::load(&layout.state_file())?;
    let mut entries = Vec::new();

    if !layout.mods_root.exists() {
        return Ok(entries);
    }

    for dir_entry in std::fs::read_dir(&layout.mods_root)? {
        let dir_entry = dir_entry?;
        if !dir_entry.file_type()?.is_dir() {
            continue;
        }
        if dir_entry
            .file_name()
            .to_string_lossy()
            .starts_with(MARKER_CHAR)
        {
            continue;
        }
        match ModEntry::from_directory(&dir_entry.path()) {
            Ok(mut entry) => {
                entry.hydrate(&state);
                entries.push(entry);
            }
            Err(e) => {
                tracing::warn!("skipping mod directory {:?}: {}", dir_entry.path(), e);
            }
        }
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Collapses bursts of external "directory changed" signals into a single
/// deferred rescan callback.
///
/// The callback fires on a worker thread once no signal has arrived for the
/// configured quiet window. Dropping the debouncer stops the thread; a
/// burst still pending at drop time fires once before shutdown.
pub struct Debouncer {
    tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(window: Duration, on_rescan: impl Fn() + Send + 'static) -> Self {
        let (tx, rx) = mpsc::channel::<()>();
        let handle = std::thread::spawn(move || {
            while rx.recv().is_ok() {
                // Restart the quiet window on every further signal.
                loop {
                    match rx.recv_timeout(window) {
                        Ok(()) => continue,
                        Err(RecvTimeoutError::Timeout) => {
                            on_rescan();
                            break;
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            on_rescan();
                            return;
                        }
                    }
                }
            }
        });
        Debouncer {
            tx: Some(tx),
            handle: Some(handle),
        }
    }

    /// Report an external change. Cheap; safe from any thread.
    pub fn signal(&self) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(());
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
