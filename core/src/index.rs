use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::persist::{self, IndexSnapshot, SnapshotFile};
use crate::tokenizer::tokenize;

pub type PageId = u32;

/// Outcome of [`IndexStore::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    /// The index file does not exist; in-memory state is untouched.
    Missing,
    /// The file exists but is not a valid snapshot; the store was reset.
    Corrupt,
}

/// In-memory index over crawled pages, with explicit save/load to one JSON
/// file. Holds two views of the same facts: the forward index
/// (`page -> word -> positions`) and the inverted index
/// (`word -> page -> positions`), always mutated together, plus the
/// bijective `url <-> page_id` registry. Occurrence counts are the lengths
/// of the position lists.
pub struct IndexStore {
    word_index: HashMap<String, HashMap<PageId, Vec<u32>>>,
    page_index: HashMap<PageId, HashMap<String, Vec<u32>>>,
    url_to_id: HashMap<String, PageId>,
    id_to_url: HashMap<PageId, String>,
    next_page_id: PageId,
    index_path: PathBuf,
}

impl IndexStore {
    pub fn new<P: AsRef<Path>>(index_path: P) -> Self {
        Self {
            word_index: HashMap::new(),
            page_index: HashMap::new(),
            url_to_id: HashMap::new(),
            id_to_url: HashMap::new(),
            next_page_id: 0,
            index_path: index_path.as_ref().to_path_buf(),
        }
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Resolve `url` to its page id, assigning the next id on first sighting.
    /// Ids are monotonic and never reused.
    fn page_id_or_assign(&mut self, url: &str) -> PageId {
        if let Some(&id) = self.url_to_id.get(url) {
            return id;
        }
        let id = self.next_page_id;
        self.next_page_id += 1;
        self.url_to_id.insert(url.to_string(), id);
        self.id_to_url.insert(id, url.to_string());
        id
    }

    /// Tokenize `text` and fold every word into both postings views.
    /// Re-indexing the same URL accumulates on top of what is already there;
    /// callers wanting a clean rebuild wipe first. No file I/O happens here.
    pub fn index_page(&mut self, url: &str, text: &str) {
        let page_id = self.page_id_or_assign(url);
        let page_words = self.page_index.entry(page_id).or_default();
        // Positions continue where the previous index_page call for this page
        // left off, so accumulated text cannot alias earlier positions.
        let base = page_words.values().map(Vec::len).sum::<usize>() as u32;
        for (word, pos) in tokenize(text) {
            let position = base + pos as u32;
            page_words.entry(word.clone()).or_default().push(position);
            self.word_index
                .entry(word)
                .or_default()
                .entry(page_id)
                .or_default()
                .push(position);
        }
    }

    /// Pages and occurrence counts for an already-normalized word. Unknown
    /// words yield an empty map.
    pub fn lookup_word(&self, word: &str) -> HashMap<PageId, u32> {
        self.word_index
            .get(word)
            .map(|pages| {
                pages
                    .iter()
                    .map(|(&page_id, positions)| (page_id, positions.len() as u32))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Raw postings (token positions per page) for an already-normalized word.
    pub fn postings(&self, word: &str) -> Option<&HashMap<PageId, Vec<u32>>> {
        self.word_index.get(word)
    }

    /// Forward view of one page: word -> positions.
    pub fn page_words(&self, page_id: PageId) -> Option<&HashMap<String, Vec<u32>>> {
        self.page_index.get(&page_id)
    }

    /// Total number of tokens indexed on a page.
    pub fn page_len(&self, page_id: PageId) -> u32 {
        self.page_index
            .get(&page_id)
            .map(|words| words.values().map(Vec::len).sum::<usize>() as u32)
            .unwrap_or(0)
    }

    pub fn page_count(&self) -> usize {
        self.page_index.len()
    }

    pub fn is_populated(&self) -> bool {
        !self.page_index.is_empty()
    }

    pub fn url(&self, page_id: PageId) -> Option<&str> {
        self.id_to_url.get(&page_id).map(String::as_str)
    }

    pub fn page_id(&self, url: &str) -> Option<PageId> {
        self.url_to_id.get(url).copied()
    }

    pub fn page_ids(&self) -> impl Iterator<Item = PageId> + '_ {
        self.page_index.keys().copied()
    }

    /// Iterate the vocabulary with document frequencies.
    pub fn vocabulary(&self) -> impl Iterator<Item = (&str, usize)> {
        self.word_index
            .iter()
            .map(|(word, pages)| (word.as_str(), pages.len()))
    }

    /// True when the forward and inverted views describe the same facts and
    /// the id registry is a bijection over them.
    pub fn is_consistent(&self) -> bool {
        for (page_id, words) in &self.page_index {
            if !self.id_to_url.contains_key(page_id) {
                return false;
            }
            for (word, positions) in words {
                let mirrored = self.word_index.get(word).and_then(|pages| pages.get(page_id));
                if mirrored != Some(positions) {
                    return false;
                }
            }
        }
        for (word, pages) in &self.word_index {
            for (page_id, positions) in pages {
                let mirrored = self.page_index.get(page_id).and_then(|words| words.get(word));
                if mirrored != Some(positions) {
                    return false;
                }
            }
        }
        self.url_to_id.len() == self.id_to_url.len()
            && self
                .url_to_id
                .iter()
                .all(|(url, id)| self.id_to_url.get(id).map(String::as_str) == Some(url.as_str()))
    }

    /// Serialize the four structures to the index file, overwriting any
    /// existing file.
    pub fn save(&self) -> Result<()> {
        let snapshot = IndexSnapshot {
            word_index: self.word_index.clone(),
            page_index: self.page_index.clone(),
            url_to_id: self.url_to_id.clone(),
            id_to_url: self.id_to_url.clone(),
        };
        persist::save_snapshot(&self.index_path, &snapshot)?;
        tracing::info!(path = %self.index_path.display(), pages = self.page_count(), "index saved");
        Ok(())
    }

    /// Restore the store from the index file. A missing file leaves the
    /// current state unchanged; a malformed file resets the store to empty
    /// rather than half-loading it.
    pub fn load(&mut self) -> Result<LoadOutcome> {
        match persist::load_snapshot(&self.index_path)? {
            SnapshotFile::Missing => {
                tracing::info!(path = %self.index_path.display(), "no index file found");
                Ok(LoadOutcome::Missing)
            }
            SnapshotFile::Corrupt => {
                self.clear();
                tracing::warn!("couldn't load index file correctly: index reset");
                Ok(LoadOutcome::Corrupt)
            }
            SnapshotFile::Snapshot(snapshot) => {
                self.word_index = snapshot.word_index;
                self.page_index = snapshot.page_index;
                self.url_to_id = snapshot.url_to_id;
                self.id_to_url = snapshot.id_to_url;
                self.next_page_id = self.id_to_url.keys().max().map_or(0, |&max| max + 1);
                tracing::info!(pages = self.page_count(), "index loaded");
                Ok(LoadOutcome::Loaded)
            }
        }
    }

    /// Clear all four structures, reset the page-id counter, and delete the
    /// index file if present.
    pub fn wipe(&mut self) -> Result<()> {
        self.clear();
        persist::delete_snapshot(&self.index_path)
    }

    fn clear(&mut self) {
        self.word_index.clear();
        self.page_index.clear();
        self.url_to_id.clear();
        self.id_to_url.clear();
        self.next_page_id = 0;
    }
}
