//! Background loading of documents from a [`Vfs`].
//!
//! Each load runs on its own task. Starting a new load aborts the previous
//! one, and every result carries the generation it was started under so a
//! late arrival can be told apart from the current load.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use kicad_doc::hierarchy::MemorySource;
use kicad_doc::Loaded;
use kiview::LoadTicket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{FetchError, Result};
use crate::vfs::Vfs;

/// Outcome of one background load.
#[derive(Debug)]
pub struct LoadResult {
    pub ticket: LoadTicket,
    pub generation: u64,
    pub name: String,
    pub result: Result<Loaded>,
}

pub struct Session {
    vfs: Arc<Vfs>,
    generation: u64,
    task: Option<JoinHandle<()>>,
    tx: mpsc::UnboundedSender<LoadResult>,
}

impl Session {
    pub fn new(vfs: Arc<Vfs>) -> (Self, mpsc::UnboundedReceiver<LoadResult>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Self {
            vfs,
            generation: 0,
            task: None,
            tx,
        };
        (session, rx)
    }

    pub fn vfs(&self) -> &Arc<Vfs> {
        &self.vfs
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// Fetch and parse `name` in the background, cancelling any load that
    /// is still running. Returns the generation of the new load.
    pub fn load(&mut self, name: impl Into<String>, ticket: LoadTicket) -> u64 {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.generation += 1;
        let generation = self.generation;
        let name = name.into();
        let vfs = Arc::clone(&self.vfs);
        let tx = self.tx.clone();
        tracing::info!("loading {name} (generation {generation})");

        self.task = Some(tokio::spawn(async move {
            let result = fetch_and_parse(&vfs, &name).await;
            if let Err(e) = &result {
                tracing::warn!("loading {name} failed: {e}");
            }
            // The receiver may be gone if the session was dropped.
            let _ = tx.send(LoadResult {
                ticket,
                generation,
                name,
                result,
            });
        }));
        generation
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn fetch_and_parse(vfs: &Vfs, name: &str) -> Result<Loaded> {
    let data = vfs.get(name).await?;
    let loaded = tokio::task::spawn_blocking(move || kicad_doc::load_bytes(&data))
        .await
        .map_err(|e| FetchError::Task(e.to_string()))??;
    Ok(loaded)
}

/// Prefetch every sheet file reachable from `root` into a synchronous
/// source the viewer can resolve against. Missing or unparsable files are
/// left out; the resolver reports them when they are descended into.
pub async fn collect_sheets(vfs: &Vfs, root: &Loaded) -> MemorySource {
    let mut source = MemorySource::new();
    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<String> = sheet_files(root).collect();

    while let Some(file) = queue.pop_front() {
        if !seen.insert(file.clone()) {
            continue;
        }
        let data = match vfs.get(&file).await {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("sheet {file}: {e}");
                continue;
            }
        };
        if let Ok(child) = kicad_doc::load_bytes(&data) {
            queue.extend(sheet_files(&child).filter(|f| !seen.contains(f)));
        }
        source.insert(file, data);
    }
    tracing::debug!("prefetched {} sheet files", seen.len());
    source
}

fn sheet_files(loaded: &Loaded) -> impl Iterator<Item = String> + '_ {
    loaded
        .document
        .sheets()
        .map(|(_, sheet)| sheet.file.clone())
        .filter(|f| !f.is_empty())
}
