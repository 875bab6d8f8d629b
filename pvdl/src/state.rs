use crate::critical;
use anyhow::{Context, Result};
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// author -> illust id -> saved filenames, where `""` marks a pending slot.
pub type Manifest = BTreeMap<String, BTreeMap<String, Vec<String>>>;

pub const MANIFEST_FILE: &str = "profile.json";
const LOCK_FILE: &str = ".lock";

pub fn file_name(url: &str) -> &str {
    &url[url.rfind('/').map_or(0, |p| p + 1)..]
}

fn is_full(slots: &[String]) -> bool {
    !slots.iter().any(String::is_empty)
}

/// An asset that still has to be fetched, with the position of its url in
/// the illustration's full asset list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAsset {
    pub slot: usize,
    pub url: String,
}

/// The result of one asset download. `file` is `None` when it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotFill {
    pub slot: usize,
    pub file: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    works: Manifest,
    in_flight: HashSet<(String, String)>,
    dirty: bool,
}

#[derive(Debug)]
pub struct DownloadState {
    path: PathBuf,
    inner: Mutex<Inner>,
    #[allow(dead_code)]
    lock: fs::File,
}

#[derive(Debug)]
pub enum Claim<'a> {
    Complete,
    Busy,
    Acquired(ClaimGuard<'a>),
}

/// Marks an illustration as being worked on by this run until dropped.
#[derive(Debug)]
pub struct ClaimGuard<'a> {
    state: &'a DownloadState,
    key: (String, String),
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        self.state.inner.lock().in_flight.remove(&self.key);
    }
}

impl DownloadState {
    pub fn load(download_dir: &Path) -> Result<Self> {
        let lock = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(download_dir.join(LOCK_FILE))?;
        lock.try_lock_exclusive()
            .with_context(|| format!("{download_dir:?} is used by another run"))?;

        let path = download_dir.join(MANIFEST_FILE);
        let works = match fs::read_to_string(&path) {
            Ok(s) => {
                let works: Manifest = serde_json::from_str(&s)
                    .with_context(|| format!("bad profile {path:?}"))?;
                info!(
                    "profile {:?} loaded: {} authors, {} illusts",
                    path,
                    works.len(),
                    works.values().map(BTreeMap::len).sum::<usize>()
                );
                works
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("profile {path:?} not exists");
                Manifest::new()
            }
            Err(e) => return Err(e).with_context(|| format!("reading {path:?}")),
        };
        Ok(Self {
            path,
            inner: Mutex::new(Inner {
                works,
                ..Default::default()
            }),
            lock,
        })
    }

    pub fn is_complete(&self, author: &str, id: &str) -> bool {
        let inner = self.inner.lock();
        Self::complete_in(&inner, author, id)
    }

    fn complete_in(inner: &Inner, author: &str, id: &str) -> bool {
        inner
            .works
            .get(author)
            .and_then(|w| w.get(id))
            .is_some_and(|slots| is_full(slots))
    }

    /// Checks completeness and marks the illustration as in progress under
    /// one lock, so two workers never download the same illustration.
    pub fn claim(&self, author: &str, id: &str) -> Claim<'_> {
        let mut inner = self.inner.lock();
        if Self::complete_in(&inner, author, id) {
            return Claim::Complete;
        }
        let key = (author.to_owned(), id.to_owned());
        if !inner.in_flight.insert(key.clone()) {
            return Claim::Busy;
        }
        Claim::Acquired(ClaimGuard { state: self, key })
    }

    /// The candidates whose filename is not saved yet for this illustration.
    pub fn pending_subset(&self, author: &str, id: &str, urls: &[String]) -> Vec<PendingAsset> {
        let inner = self.inner.lock();
        let saved = inner.works.get(author).and_then(|w| w.get(id));
        urls.iter()
            .enumerate()
            .filter(|(_, url)| saved.is_none_or(|s| !s.iter().any(|f| f == file_name(url))))
            .map(|(slot, url)| PendingAsset {
                slot,
                url: url.clone(),
            })
            .collect()
    }

    /// Merges finished assets into the record of an illustration with `total`
    /// assets. Slots are keyed by the position of their url; a record of a
    /// different length (written by an older layout) gets its leftmost
    /// pending slots filled in arrival order instead.
    pub fn record_completed(&self, author: &str, id: &str, total: usize, fills: Vec<SlotFill>) {
        let mut inner = self.inner.lock();
        inner.dirty = true;
        let works = inner.works.entry(author.to_owned()).or_default();
        match works.get_mut(id) {
            None => {
                let mut slots = vec![String::new(); total];
                fill_positional(&mut slots, fills);
                works.insert(id.to_owned(), slots);
            }
            Some(slots) if is_full(slots.as_slice()) => {
                let mut fresh = vec![String::new(); total];
                fill_positional(&mut fresh, fills);
                if slots.len() > total {
                    fresh.extend(slots.drain(total..));
                }
                *slots = fresh;
            }
            Some(slots) if slots.len() == total => fill_positional(slots, fills),
            Some(slots) => {
                let mut files = fills.into_iter().filter_map(|f| f.file);
                for slot in slots.iter_mut().filter(|s| s.is_empty()) {
                    match files.next() {
                        Some(f) => *slot = f,
                        None => break,
                    }
                }
            }
        }
    }

    pub fn snapshot(&self) -> Manifest {
        self.inner.lock().works.clone()
    }

    /// Writes the manifest if anything changed since the last write.
    pub fn persist(&self) -> Result<()> {
        let s = {
            let mut inner = self.inner.lock();
            if !inner.dirty {
                debug!("profile {:?} is clean", self.path);
                return Ok(());
            }
            inner.dirty = false;
            serde_json::to_string_pretty(&inner.works)?
        };
        if let Err(e) = self.write(&s) {
            self.inner.lock().dirty = true;
            return Err(e);
        }
        info!("profile: written {} bytes into {:?}", s.len(), self.path);
        Ok(())
    }

    fn write(&self, s: &str) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, s).with_context(|| format!("writing {tmp:?}"))?;
        fs::rename(&tmp, &self.path).with_context(|| format!("renaming {tmp:?}"))?;
        Ok(())
    }
}

fn fill_positional(slots: &mut [String], fills: Vec<SlotFill>) {
    for f in fills {
        if let (Some(file), Some(slot)) = (f.file, slots.get_mut(f.slot)) {
            *slot = file;
        }
    }
}

impl Drop for DownloadState {
    fn drop(&mut self) {
        if let Err(e) = self.persist() {
            critical!("{:?}: PROFILE LOST: {:?}", self.path, e);
        }
    }
}
