use anyhow::{bail, Result};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::index::{IndexStore, PageId};
use crate::tokenizer::normalize;

/// How strongly a page matched the query, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// The query words appear adjacent and in query order on the page.
    Phrase,
    /// Every distinct query word appears on the page.
    AllWords,
    /// A strict subset of the query words appears on the page.
    Other,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            MatchType::Phrase => "phrase",
            MatchType::AllWords => "all_words",
            MatchType::Other => "other",
        })
    }
}

/// Scoring strategy behind the one `search` contract. Candidate collection,
/// match classification, and group ordering are shared; the mode only decides
/// the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RankingMode {
    /// Sum of per-word `count_on_page * tf * idf` contributions.
    #[default]
    TfIdf,
    /// Cosine similarity against precomputed page vectors; requires
    /// [`SearchEngine::build_ranking_index`].
    Cosine,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub page_id: PageId,
    pub score: f64,
    pub match_type: MatchType,
    /// The normalized query words this page matched.
    pub matched: HashSet<String>,
}

/// Vector-space model over the whole corpus: one tf·idf vector per page over
/// the sorted vocabulary. The smoothed idf is captured once at build time and
/// reused for the query vector, so page and query weights cannot diverge;
/// rebuild after the corpus changes.
struct RankingIndex {
    vocab: Vec<String>,
    // ln((N + 1) / (df + 1)) per vocab slot; the +1s keep words that are in
    // the query but absent corpus-wide finite.
    idf: Vec<f64>,
    vectors: HashMap<PageId, Vec<f64>>,
}

impl RankingIndex {
    fn query_vector(&self, query_words: &[String]) -> Vec<f64> {
        let mut counts: HashMap<&str, f64> = HashMap::new();
        for word in query_words {
            *counts.entry(word.as_str()).or_insert(0.0) += 1.0;
        }
        let query_len = query_words.len() as f64;
        let mut vector = vec![0.0; self.vocab.len()];
        for (word, count) in counts {
            if let Ok(slot) = self.vocab.binary_search_by(|v| v.as_str().cmp(word)) {
                vector[slot] = count / query_len * self.idf[slot];
            }
        }
        vector
    }

    fn cosine(&self, page_id: PageId, query: &[f64]) -> f64 {
        let Some(page) = self.vectors.get(&page_id) else {
            return 0.0;
        };
        let mut dot = 0.0;
        let mut page_norm = 0.0;
        let mut query_norm = 0.0;
        for (a, b) in page.iter().zip(query) {
            dot += a * b;
            page_norm += a * a;
            query_norm += b * b;
        }
        let denom = page_norm.sqrt() * query_norm.sqrt();
        if denom == 0.0 {
            0.0
        } else {
            dot / denom
        }
    }
}

#[derive(Default)]
struct Candidate {
    matched: HashSet<String>,
    tf_idf: f64,
    // word -> sorted positions on this page, kept only for multi-word queries.
    positions: HashMap<String, Vec<u32>>,
}

/// Ranked free-text search over an [`IndexStore`].
pub struct SearchEngine {
    store: Arc<RwLock<IndexStore>>,
    mode: RankingMode,
    ranking: Option<RankingIndex>,
}

impl SearchEngine {
    pub fn new(store: Arc<RwLock<IndexStore>>, mode: RankingMode) -> Self {
        Self {
            store,
            mode,
            ranking: None,
        }
    }

    pub fn mode(&self) -> RankingMode {
        self.mode
    }

    /// Precompute the cosine-mode page vectors from the current corpus. Call
    /// after every load or rebuild; a query never reads live corpus
    /// statistics, so the only way to pick up corpus changes is to rebuild.
    pub fn build_ranking_index(&mut self) {
        let store = self.store.read();
        let mut vocab: Vec<String> = store.vocabulary().map(|(word, _)| word.to_string()).collect();
        vocab.sort();
        let total_pages = store.page_count() as f64;
        let idf: Vec<f64> = vocab
            .iter()
            .map(|word| {
                let df = store.postings(word).map_or(0, HashMap::len) as f64;
                ((total_pages + 1.0) / (df + 1.0)).ln()
            })
            .collect();

        let mut vectors: HashMap<PageId, Vec<f64>> = HashMap::new();
        for page_id in store.page_ids() {
            let Some(words) = store.page_words(page_id) else {
                continue;
            };
            let page_len = store.page_len(page_id).max(1) as f64;
            let mut vector = vec![0.0; vocab.len()];
            for (word, positions) in words {
                if let Ok(slot) = vocab.binary_search(word) {
                    vector[slot] = positions.len() as f64 / page_len * idf[slot];
                }
            }
            vectors.insert(page_id, vector);
        }
        tracing::debug!(pages = vectors.len(), vocab = vocab.len(), "ranking index built");
        self.ranking = Some(RankingIndex { vocab, idf, vectors });
    }

    /// Run `query` against the index and return hits ordered phrase first,
    /// then all-words, then partial matches; each group score-descending
    /// (partial matches order by distinct words matched, then score). An
    /// empty result set is valid.
    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        // Raw order and duplicates are preserved for phrase comparison;
        // scoring dedupes below.
        let query_words: Vec<String> = query
            .split_whitespace()
            .map(normalize)
            .filter(|word| !word.is_empty())
            .collect();
        if query_words.is_empty() {
            return Ok(Vec::new());
        }
        let mut distinct: Vec<&str> = Vec::new();
        for word in &query_words {
            if !distinct.contains(&word.as_str()) {
                distinct.push(word);
            }
        }

        let store = self.store.read();
        let total_pages = store.page_count() as f64;
        let query_len = query_words.len() as f64;

        let mut candidates: HashMap<PageId, Candidate> = HashMap::new();
        for &word in &distinct {
            // A query word absent from the index contributes nothing.
            let Some(pages) = store.postings(word) else {
                continue;
            };
            let idf = (total_pages / pages.len() as f64).ln();
            let tf = query_words.iter().filter(|w| w.as_str() == word).count() as f64 / query_len;
            for (&page_id, positions) in pages {
                let candidate = candidates.entry(page_id).or_default();
                candidate.tf_idf += positions.len() as f64 * tf * idf;
                candidate.matched.insert(word.to_string());
                if query_words.len() > 1 {
                    candidate.positions.insert(word.to_string(), positions.clone());
                }
            }
        }
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let scores: HashMap<PageId, f64> = match self.mode {
            RankingMode::TfIdf => candidates
                .iter()
                .map(|(&page_id, candidate)| (page_id, candidate.tf_idf))
                .collect(),
            RankingMode::Cosine => {
                let Some(ranking) = &self.ranking else {
                    bail!("ranking index not built; call build_ranking_index after loading the corpus");
                };
                let query_vector = ranking.query_vector(&query_words);
                candidates
                    .keys()
                    .map(|&page_id| (page_id, ranking.cosine(page_id, &query_vector)))
                    .collect()
            }
        };

        let mut phrase = Vec::new();
        let mut all_words = Vec::new();
        let mut other = Vec::new();
        for (page_id, candidate) in candidates {
            let score = scores[&page_id];
            if candidate.matched.len() == distinct.len() {
                // Phrase detection only applies to multi-word queries.
                if query_words.len() > 1 && has_phrase(&query_words, &candidate.positions) {
                    phrase.push(SearchHit {
                        page_id,
                        score,
                        match_type: MatchType::Phrase,
                        matched: candidate.matched,
                    });
                } else {
                    all_words.push(SearchHit {
                        page_id,
                        score,
                        match_type: MatchType::AllWords,
                        matched: candidate.matched,
                    });
                }
            } else {
                other.push(SearchHit {
                    page_id,
                    score,
                    match_type: MatchType::Other,
                    matched: candidate.matched,
                });
            }
        }

        let by_score_desc = |a: &SearchHit, b: &SearchHit| {
            b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal)
        };
        phrase.sort_by(by_score_desc);
        all_words.sort_by(by_score_desc);
        other.sort_by(|a, b| {
            b.matched
                .len()
                .cmp(&a.matched.len())
                .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal))
        });

        let mut results = phrase;
        results.append(&mut all_words);
        results.append(&mut other);
        Ok(results)
    }
}

/// True when some page position `p` carries query word `k` at `p + k` for the
/// whole query sequence, duplicates and order preserved. "brown quick" on a
/// "quick brown" page is not a phrase even though the merged positions are
/// consecutive.
fn has_phrase(query_words: &[String], positions: &HashMap<String, Vec<u32>>) -> bool {
    let Some(starts) = positions.get(&query_words[0]) else {
        return false;
    };
    'starts: for &start in starts {
        for (offset, word) in query_words.iter().enumerate().skip(1) {
            let Some(word_positions) = positions.get(word) else {
                continue 'starts;
            };
            // Position lists are appended in order, so they are sorted.
            if word_positions.binary_search(&(start + offset as u32)).is_err() {
                continue 'starts;
            }
        }
        return true;
    }
    false
}
