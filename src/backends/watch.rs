//! Noticing glyphs that change on disk behind our back
use crate::StoreError;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    time::Duration,
};
use tokio::sync::mpsc;

const DEBOUNCE: Duration = Duration::from_millis(200);

/// A stream of sets of glyph names whose files were touched externally
///
/// The watch lasts as long as this value. Dropping it and asking the
/// backend for a new one restarts watching from the current state.
pub struct ExternalChanges {
    _watcher: notify::RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<Event>,
    roots: Vec<PathBuf>,
    glif_file_names: HashMap<String, String>,
}

impl ExternalChanges {
    /// Watch the given UFOs
    ///
    /// `glif_file_names` maps glif file names to the glyph names they hold.
    /// The directories containing the UFOs are watched rather than the UFOs
    /// themselves, so that a UFO replaced wholesale is still followed.
    pub(crate) fn new(
        ufo_paths: Vec<PathBuf>,
        glif_file_names: HashMap<String, String>,
    ) -> Result<Self, StoreError> {
        // Events carry absolute paths
        let ufo_paths: Vec<PathBuf> = ufo_paths
            .into_iter()
            .map(|p| std::fs::canonicalize(&p).unwrap_or(p))
            .collect();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            if let Ok(event) = result {
                if matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    let _ = tx.send(event);
                }
            }
        })?;
        let mut parents: Vec<PathBuf> = ufo_paths
            .iter()
            .filter_map(|p| p.parent().map(|parent| parent.to_path_buf()))
            .collect();
        parents.sort();
        parents.dedup();
        for parent in &parents {
            watcher.watch(parent, RecursiveMode::Recursive)?;
            log::info!("Watching for external changes: {}", parent.display());
        }
        Ok(ExternalChanges {
            _watcher: watcher,
            rx,
            roots: ufo_paths,
            glif_file_names,
        })
    }

    fn glyph_names(&self, event: &Event) -> Vec<String> {
        event
            .paths
            .iter()
            .filter(|path| self.roots.iter().any(|root| path.starts_with(root)))
            .filter_map(|path| path.file_name()?.to_str())
            .filter_map(|file| self.glif_file_names.get(file).cloned())
            .collect()
    }

    /// Wait for the next batch of changed glyphs
    ///
    /// Events arriving in quick succession are gathered into one batch.
    /// Returns `None` once the watcher has shut down.
    pub async fn next(&mut self) -> Option<HashSet<String>> {
        loop {
            let first = self.rx.recv().await?;
            let mut changed: HashSet<String> = self.glyph_names(&first).into_iter().collect();
            loop {
                match tokio::time::timeout(DEBOUNCE, self.rx.recv()).await {
                    Ok(Some(event)) => changed.extend(self.glyph_names(&event)),
                    Ok(None) => break,
                    Err(_) => break,
                }
            }
            if !changed.is_empty() {
                log::debug!("External changes to {changed:?}");
                return Some(changed);
            }
        }
    }
}
