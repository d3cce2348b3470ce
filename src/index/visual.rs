//! Lazily rebuilt visual-word index.
//!
//! Mutations go to the [`WordStore`] and only mark the spatial structure
//! dirty. Queries stay exact in the meantime:
//!
//! ```text
//!   query ──┬──► built backend (k = 2 + |removed since build|) ──► drop removed ids ──┐
//!           │                                                                          ├──► merge by (distance, id) ──► best id
//!           └──► linear scan over not-yet-indexed words (k = 2) ─────────────────────┘
//! ```
//!
//! [`VisualWordIndex::update`] replaces the backend with a fresh build over all
//! live words and empties both pending sets.
//!
//! # Ties
//!
//! Equal distances resolve to the lowest word id, inside each source and
//! across the merge.

use super::{build_backend, checked_shape, NearestWord, RebuildPolicy};
use crate::backend::{LinearScan, NnStrategy, SpatialIndex};
use crate::descriptor::{DescriptorShape, Descriptors};
use crate::error::{IndexError, Result};
use crate::store::WordStore;
use crate::word::Word;
use crate::{SignatureId, WordId, NO_MATCH};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::time::Instant;
use tracing::{debug, error};

/// Candidates kept per query row from each source.
const MATCHES_PER_ROW: usize = 2;

/// When [`VisualWordIndex::refresh`] rebuilds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LazyRebuildConfig {
    /// Rebuild once this many words are pending (added plus removed).
    pub max_pending: usize,

    /// If false, `refresh` never rebuilds and only explicit `update` does.
    pub auto_rebuild: bool,
}

impl Default for LazyRebuildConfig {
    fn default() -> Self {
        Self {
            max_pending: 1,
            auto_rebuild: true,
        }
    }
}

/// A candidate word for one query row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WordMatch {
    pub id: WordId,
    pub distance: f32,
}

/// Up to two candidates per row, nearest first.
pub type WordMatches = SmallVec<[WordMatch; MATCHES_PER_ROW]>;

/// Incrementally maintained descriptor -> word index.
#[derive(Debug)]
pub struct VisualWordIndex {
    store: WordStore,
    strategy: NnStrategy,
    backend: Box<dyn SpatialIndex>,
    /// Backend row position -> word id.
    indexed_ids: Vec<WordId>,
    config: LazyRebuildConfig,
    version: u64,
}

impl Default for VisualWordIndex {
    fn default() -> Self {
        Self::new(NnStrategy::default())
    }
}

impl VisualWordIndex {
    pub fn new(strategy: NnStrategy) -> Self {
        Self::with_config(strategy, LazyRebuildConfig::default())
    }

    pub fn with_config(strategy: NnStrategy, config: LazyRebuildConfig) -> Self {
        Self {
            store: WordStore::new(),
            backend: strategy.create(),
            strategy,
            indexed_ids: Vec::new(),
            config,
            version: 0,
        }
    }

    /// Read-only view of the words.
    pub fn store(&self) -> &WordStore {
        &self.store
    }

    pub fn strategy(&self) -> &NnStrategy {
        &self.strategy
    }

    pub fn config(&self) -> &LazyRebuildConfig {
        &self.config
    }

    /// Number of completed rebuilds.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Rows in the built backend (includes words removed since the build).
    pub fn indexed_len(&self) -> usize {
        self.indexed_ids.len()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn add_word(&mut self, word: Word) -> Result<()> {
        self.store.add_word(word)
    }

    /// Insert a batch; on error nothing is inserted.
    pub fn add_words(&mut self, words: Vec<Word>) -> Result<()> {
        self.store.add_words(words)
    }

    pub fn add_word_ref(&mut self, word_id: WordId, signature_id: SignatureId) {
        self.store.add_word_ref(word_id, signature_id);
    }

    pub fn remove_all_word_ref(&mut self, word_id: WordId, signature_id: SignatureId) -> usize {
        self.store.remove_all_word_ref(word_id, signature_id)
    }

    pub fn remove_words(&mut self, ids: &[WordId]) -> usize {
        self.store.remove_words(ids)
    }

    pub fn delete_unused_words(&mut self) -> Vec<WordId> {
        self.store.delete_unused_words()
    }

    /// Drop all words and the built structure.
    pub fn clear(&mut self, warn_if_not_empty: bool) {
        self.store.clear(warn_if_not_empty);
        self.backend.clear();
        self.indexed_ids.clear();
    }

    /// Whether [`refresh`](Self::refresh) would rebuild now.
    pub fn needs_rebuild(&self) -> bool {
        let pending = self.store.pending_add_count() + self.store.pending_remove_count();
        self.store.is_dirty() && pending >= self.config.max_pending.max(1)
    }

    /// Rebuild when enough mutations are pending. Returns whether it rebuilt.
    pub fn refresh(&mut self) -> Result<bool> {
        if self.config.auto_rebuild && self.needs_rebuild() {
            self.update()
        } else {
            Ok(false)
        }
    }

    /// Rebuild the spatial structure over all live words.
    ///
    /// Returns `false` without doing anything when nothing changed since the
    /// last rebuild.
    pub fn update(&mut self) -> Result<bool> {
        if !self.store.is_dirty() {
            return Ok(false);
        }
        let start = Instant::now();

        if self.store.is_empty() {
            self.backend.clear();
            self.indexed_ids.clear();
        } else {
            let (backend, ids) = build_backend(&self.store, &self.strategy)?;
            self.backend = backend;
            self.indexed_ids = ids;
        }
        self.store.mark_indexed();
        self.version += 1;

        debug!(
            words = self.indexed_ids.len(),
            backend = self.backend.name(),
            version = self.version,
            elapsed_us = start.elapsed().as_micros() as u64,
            "rebuilt visual word index"
        );
        Ok(true)
    }

    /// Nearest word id per descriptor row.
    ///
    /// Never fails: an empty dictionary or a query of the wrong shape yields
    /// `0` for every row. Use [`try_find_nn`](Self::try_find_nn) to see why.
    pub fn find_nn(&self, descriptors: &Descriptors) -> Vec<WordId> {
        match self.try_find_nn(descriptors) {
            Ok(ids) => ids,
            Err(err) => {
                error!(error = %err, rows = descriptors.rows(), "word search failed");
                vec![NO_MATCH; descriptors.rows()]
            }
        }
    }

    /// Like [`find_nn`](Self::find_nn) but surfaces shape mismatches.
    pub fn try_find_nn(&self, descriptors: &Descriptors) -> Result<Vec<WordId>> {
        let matches = self.find_matches(descriptors)?;
        Ok(matches
            .iter()
            .map(|m| m.first().map_or(NO_MATCH, |best| best.id))
            .collect())
    }

    /// The two nearest words per row, nearest first.
    ///
    /// Distances are squared L2 for float search and Hamming for native binary
    /// search. No ratio test is applied.
    pub fn find_matches(&self, descriptors: &Descriptors) -> Result<Vec<WordMatches>> {
        let rows = descriptors.rows();
        if rows == 0 {
            return Ok(Vec::new());
        }
        if self.store.is_empty() {
            return Ok(vec![WordMatches::new(); rows]);
        }
        let canonical = checked_shape(&self.store, descriptors)?;
        let search = DescriptorShape::new(self.strategy.search_element(canonical.element), canonical.dim);
        let query = descriptors.converted(search.element)?;

        let mut merged = vec![WordMatches::new(); rows];
        if !self.indexed_ids.is_empty() {
            self.search_indexed(&query, &mut merged)?;
        }
        if self.store.pending_add_count() > 0 {
            self.search_pending(&query, search, &mut merged)?;
        }

        for candidates in &mut merged {
            candidates.retain(|m| m.id != NO_MATCH && m.distance >= 0.0);
            candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
            candidates.truncate(MATCHES_PER_ROW);
        }
        Ok(merged)
    }

    fn search_indexed(&self, query: &Descriptors, out: &mut [WordMatches]) -> Result<()> {
        // Overfetch so that dropping removed words still leaves two hits.
        let k = MATCHES_PER_ROW + self.store.pending_remove_count();
        let hits = self.backend.knn_search(query, k)?;
        for (candidates, row_hits) in out.iter_mut().zip(hits) {
            let live = row_hits
                .iter()
                .filter_map(|n| {
                    let id = *self.indexed_ids.get(n.position as usize)?;
                    if self.store.is_removed_since_rebuild(id) {
                        return None;
                    }
                    Some(WordMatch {
                        id,
                        distance: n.distance,
                    })
                })
                .take(MATCHES_PER_ROW);
            candidates.extend(live);
        }
        Ok(())
    }

    fn search_pending(
        &self,
        query: &Descriptors,
        search: DescriptorShape,
        out: &mut [WordMatches],
    ) -> Result<()> {
        let ids: Vec<WordId> = self.store.not_indexed_ids().collect();
        let mut pending = Descriptors::with_capacity(search, ids.len());
        for &id in &ids {
            let word = self.store.word(id).ok_or(IndexError::MissingWord(id))?;
            pending.push_row(word.descriptor().as_row())?;
        }

        let hits = LinearScan::over(pending).knn_search(query, MATCHES_PER_ROW)?;
        for (candidates, row_hits) in out.iter_mut().zip(hits) {
            candidates.extend(row_hits.iter().filter_map(|n| {
                Some(WordMatch {
                    id: *ids.get(n.position as usize)?,
                    distance: n.distance,
                })
            }));
        }
        Ok(())
    }
}

impl NearestWord for VisualWordIndex {
    fn find_nearest(&self, descriptors: &Descriptors) -> Result<Vec<WordId>> {
        self.try_find_nn(descriptors)
    }

    fn policy(&self) -> RebuildPolicy {
        RebuildPolicy::LazyRebuild
    }

    fn refresh(&mut self) -> Result<bool> {
        VisualWordIndex::refresh(self)
    }

    fn word_count(&self) -> usize {
        self.len()
    }
}
