//! Eagerly rebuilt word index plus signature retrieval.
//!
//! Used on the signature side of the pipeline: descriptors are resolved with a
//! single nearest-neighbor lookup, and the resulting word ids are scored
//! against the stored signatures.
//!
//! Unlike [`VisualWordIndex`](super::VisualWordIndex), a query whose shape
//! differs from the dictionary is a contract violation and is returned as
//! [`IndexError::InvariantViolation`].

use super::{build_backend, checked_shape, NearestWord, RebuildPolicy};
use crate::backend::{NnStrategy, SpatialIndex};
use crate::descriptor::Descriptors;
use crate::error::{IndexError, Result};
use crate::store::WordStore;
use crate::word::Word;
use crate::{SignatureId, WordId, NO_MATCH};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;
use tracing::{debug, error, warn};

/// A ranked signature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignatureCandidate {
    pub id: SignatureId,
    pub score: f32,
}

#[derive(Debug)]
pub struct SignatureIndex {
    store: WordStore,
    strategy: NnStrategy,
    backend: Box<dyn SpatialIndex>,
    indexed_ids: Vec<WordId>,
    /// Signature -> distinct words.
    signatures: BTreeMap<SignatureId, BTreeSet<WordId>>,
    /// Word -> signatures containing it.
    postings: HashMap<WordId, BTreeSet<SignatureId>>,
}

impl Default for SignatureIndex {
    fn default() -> Self {
        Self::new(NnStrategy::default())
    }
}

impl SignatureIndex {
    pub fn new(strategy: NnStrategy) -> Self {
        Self {
            store: WordStore::new(),
            backend: strategy.create(),
            strategy,
            indexed_ids: Vec::new(),
            signatures: BTreeMap::new(),
            postings: HashMap::new(),
        }
    }

    pub fn store(&self) -> &WordStore {
        &self.store
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }

    /// Distinct words of a signature.
    pub fn signature_words(&self, id: SignatureId) -> Option<&BTreeSet<WordId>> {
        self.signatures.get(&id)
    }

    /// Insert a batch of words and rebuild.
    ///
    /// The whole batch is validated first; on error nothing is inserted.
    pub fn put_words(&mut self, words: Vec<Word>) -> Result<()> {
        self.store.add_words(words)?;
        self.rebuild()
    }

    fn rebuild(&mut self) -> Result<()> {
        let start = Instant::now();
        let (backend, ids) = build_backend(&self.store, &self.strategy)?;
        self.backend = backend;
        self.indexed_ids = ids;
        self.store.mark_indexed();
        debug!(
            words = self.indexed_ids.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "rebuilt signature word index"
        );
        Ok(())
    }

    /// Nearest word id per row (k = 1).
    pub fn find_nns(&self, descriptors: &Descriptors) -> Result<Vec<WordId>> {
        let rows = descriptors.rows();
        if rows == 0 {
            return Ok(Vec::new());
        }
        if self.store.is_empty() {
            return Ok(vec![NO_MATCH; rows]);
        }
        let canonical = checked_shape(&self.store, descriptors).map_err(|err| {
            error!(error = %err, "signature index queried with foreign descriptors");
            IndexError::InvariantViolation(err.to_string())
        })?;

        let query = descriptors.converted(self.strategy.search_element(canonical.element))?;
        let hits = self.backend.knn_search(&query, 1)?;
        Ok(hits
            .iter()
            .map(|row| {
                row.first()
                    .and_then(|n| self.indexed_ids.get(n.position as usize).copied())
                    .unwrap_or(NO_MATCH)
            })
            .collect())
    }

    /// Load signature -> word associations, replacing existing entries.
    pub fn put_signatures<I, W>(&mut self, signatures: I)
    where
        I: IntoIterator<Item = (SignatureId, W)>,
        W: IntoIterator<Item = WordId>,
    {
        for (id, words) in signatures {
            if id == 0 {
                warn!("ignoring signature with null id");
                continue;
            }
            self.remove_signature(id);
            let words: BTreeSet<WordId> = words.into_iter().filter(|&w| w != NO_MATCH).collect();
            for &word in &words {
                self.postings.entry(word).or_default().insert(id);
            }
            self.signatures.insert(id, words);
        }
    }

    /// Forget a signature. Returns whether it existed.
    pub fn remove_signature(&mut self, id: SignatureId) -> bool {
        let Some(words) = self.signatures.remove(&id) else {
            return false;
        };
        for word in words {
            if let Some(posting) = self.postings.get_mut(&word) {
                posting.remove(&id);
                if posting.is_empty() {
                    self.postings.remove(&word);
                }
            }
        }
        true
    }

    /// Up to `top_k` signatures sharing words with `word_ids`, best first.
    ///
    /// Each distinct shared word contributes `ln(1 + N / df)`, where `N` is the
    /// number of signatures and `df` the number containing that word. Equal
    /// scores rank the lower signature id first.
    pub fn rank_signatures(&self, word_ids: &[WordId], top_k: usize) -> Vec<SignatureCandidate> {
        if top_k == 0 || self.signatures.is_empty() {
            return Vec::new();
        }
        let n = self.signatures.len() as f32;
        let query: BTreeSet<WordId> = word_ids.iter().copied().filter(|&w| w != NO_MATCH).collect();

        let mut scores: HashMap<SignatureId, f32> = HashMap::new();
        for word in query {
            let Some(posting) = self.postings.get(&word) else {
                continue;
            };
            let idf = (1.0 + n / posting.len() as f32).ln();
            for &signature in posting {
                *scores.entry(signature).or_insert(0.0) += idf;
            }
        }

        let mut ranked: Vec<SignatureCandidate> = scores
            .into_iter()
            .map(|(id, score)| SignatureCandidate { id, score })
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        ranked.truncate(top_k);
        ranked
    }

    /// Drop words, signatures and the built structure.
    pub fn clear(&mut self) {
        self.store.clear(false);
        self.backend.clear();
        self.indexed_ids.clear();
        self.signatures.clear();
        self.postings.clear();
    }
}

impl NearestWord for SignatureIndex {
    fn find_nearest(&self, descriptors: &Descriptors) -> Result<Vec<WordId>> {
        self.find_nns(descriptors)
    }

    fn policy(&self) -> RebuildPolicy {
        RebuildPolicy::EagerRebuild
    }

    fn refresh(&mut self) -> Result<bool> {
        Ok(false)
    }

    fn word_count(&self) -> usize {
        self.len()
    }
}
