//! Word storage with reference counting and pending index bookkeeping.
//!
//! The store is the sole owner of every [`Word`]. Callers hold ids, never
//! words. It does no searching; it records which words the spatial index
//! still has to learn about (`not_indexed`) and which ones it has to forget
//! (`removed_indexed`) at the next rebuild.
//!
//! # Design
//!
//! ```text
//!   add_word ──► not_indexed ──(rebuild)──► indexed
//!                    │                         │
//!   remove_words ◄───┘ drop silently           └──► removed_indexed ──(rebuild)──► gone
//! ```
//!
//! A word added and removed before any rebuild leaves no trace.

use crate::descriptor::DescriptorShape;
use crate::error::{IndexError, Result};
use crate::word::Word;
use crate::{SignatureId, WordId};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, error, warn};

/// Id-keyed registry of vocabulary words.
#[derive(Debug, Default)]
pub struct WordStore {
    words: BTreeMap<WordId, Word>,
    /// Added since the last rebuild.
    not_indexed: BTreeSet<WordId>,
    /// Removed since the last rebuild while still part of the built index.
    removed_indexed: BTreeSet<WordId>,
    /// Words with no references (eviction candidates).
    unused: BTreeSet<WordId>,
    total_active_references: usize,
    /// Shape fixed by the first word ever added.
    canonical: Option<DescriptorShape>,
}

impl WordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a word. It stays invisible to the spatial index until the next
    /// rebuild, but is searched exactly in the meantime.
    pub fn add_word(&mut self, word: Word) -> Result<()> {
        let shape = self.check_word(&word, self.canonical)?;
        self.commit(word, shape);
        Ok(())
    }

    /// Insert a batch of words, all or nothing.
    ///
    /// Every word is checked against the store and against the rest of the
    /// batch before the first one is inserted.
    pub fn add_words(&mut self, words: Vec<Word>) -> Result<()> {
        let mut shape = self.canonical;
        let mut seen = HashSet::with_capacity(words.len());
        for word in &words {
            let actual = self.check_word(word, shape)?;
            if !seen.insert(word.id()) {
                return Err(IndexError::DuplicateId(word.id()));
            }
            shape = Some(actual);
        }
        for word in words {
            let shape = word.descriptor().shape();
            self.commit(word, shape);
        }
        Ok(())
    }

    /// Shape of `word` if it may join a store whose shape is `expected`.
    fn check_word(&self, word: &Word, expected: Option<DescriptorShape>) -> Result<DescriptorShape> {
        let id = word.id();
        if id == 0 {
            return Err(IndexError::InvalidWord {
                id,
                reason: "word id 0 is reserved for \"no match\"".to_string(),
            });
        }
        if word.descriptor().is_empty() {
            return Err(IndexError::InvalidWord {
                id,
                reason: "empty descriptor".to_string(),
            });
        }
        if !word.descriptor().is_finite() {
            return Err(IndexError::InvalidWord {
                id,
                reason: "descriptor has a NaN or infinite component".to_string(),
            });
        }
        if self.words.contains_key(&id) {
            return Err(IndexError::DuplicateId(id));
        }

        let shape = word.descriptor().shape();
        match expected {
            Some(expected) if expected != shape => {
                error!(word_id = id, %expected, actual = %shape, "word descriptor does not match dictionary");
                Err(IndexError::ConfigMismatch {
                    expected,
                    actual: shape,
                })
            }
            _ => Ok(shape),
        }
    }

    fn commit(&mut self, word: Word, shape: DescriptorShape) {
        let id = word.id();
        if self.canonical.is_none() {
            self.canonical = Some(shape);
        }
        let references = word.reference_count();
        if references > 0 {
            self.total_active_references += references;
        } else {
            self.unused.insert(id);
        }
        self.not_indexed.insert(id);
        self.words.insert(id, word);
    }

    /// Record that `signature_id` uses `word_id`.
    pub fn add_word_ref(&mut self, word_id: WordId, signature_id: SignatureId) {
        if word_id == 0 || signature_id == 0 {
            warn!(word_id, signature_id, "ignoring reference with a null id");
            return;
        }
        let Some(word) = self.words.get_mut(&word_id) else {
            error!(word_id, signature_id, "word not found");
            return;
        };
        word.add_ref(signature_id);
        self.total_active_references += 1;
        self.unused.remove(&word_id);
    }

    /// Drop every reference from `signature_id` to `word_id`.
    ///
    /// Returns the number of references removed. A word left with no
    /// references becomes an eviction candidate; it is not deleted.
    pub fn remove_all_word_ref(&mut self, word_id: WordId, signature_id: SignatureId) -> usize {
        let Some(word) = self.words.get_mut(&word_id) else {
            error!(word_id, signature_id, "word not found");
            return 0;
        };
        let removed = word.remove_all_refs(signature_id);
        self.total_active_references -= removed;
        if word.is_unused() {
            self.unused.insert(word_id);
        }
        removed
    }

    /// Remove words by id. Returns how many were removed.
    pub fn remove_words(&mut self, ids: &[WordId]) -> usize {
        let mut removed = 0;
        for &id in ids {
            let Some(word) = self.words.remove(&id) else {
                warn!(word_id = id, "cannot remove unknown word");
                continue;
            };
            self.total_active_references -= word.reference_count();
            self.unused.remove(&id);
            if !self.not_indexed.remove(&id) {
                self.removed_indexed.insert(id);
            }
            removed += 1;
        }
        removed
    }

    /// Remove and free every unused word. Returns the deleted ids.
    pub fn delete_unused_words(&mut self) -> Vec<WordId> {
        let snapshot: Vec<WordId> = self.unused.iter().copied().collect();
        let removed = self.remove_words(&snapshot);
        debug!(removed, "deleted unused words");
        snapshot
    }

    /// Drop everything, including the canonical shape.
    pub fn clear(&mut self, warn_if_not_empty: bool) {
        if warn_if_not_empty {
            if !self.words.is_empty() {
                warn!(words = self.words.len(), "clearing a non-empty dictionary");
            }
            if !self.not_indexed.is_empty() {
                warn!(not_indexed = self.not_indexed.len(), "clearing words that were never indexed");
            }
        }
        *self = Self::default();
    }

    pub fn word(&self, id: WordId) -> Option<&Word> {
        self.words.get(&id)
    }

    pub fn contains(&self, id: WordId) -> bool {
        self.words.contains_key(&id)
    }

    /// All words in ascending id order.
    pub fn words(&self) -> impl Iterator<Item = &Word> + '_ {
        self.words.values()
    }

    pub fn unused_word_ids(&self) -> impl Iterator<Item = WordId> + '_ {
        self.unused.iter().copied()
    }

    pub fn is_unused(&self, id: WordId) -> bool {
        self.unused.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn total_active_references(&self) -> usize {
        self.total_active_references
    }

    pub fn canonical_shape(&self) -> Option<DescriptorShape> {
        self.canonical
    }

    /// Ids added since the last rebuild, ascending.
    pub fn not_indexed_ids(&self) -> impl Iterator<Item = WordId> + '_ {
        self.not_indexed.iter().copied()
    }

    pub fn is_indexed(&self, id: WordId) -> bool {
        self.words.contains_key(&id) && !self.not_indexed.contains(&id)
    }

    pub fn is_removed_since_rebuild(&self, id: WordId) -> bool {
        self.removed_indexed.contains(&id)
    }

    pub fn pending_add_count(&self) -> usize {
        self.not_indexed.len()
    }

    pub fn pending_remove_count(&self) -> usize {
        self.removed_indexed.len()
    }

    /// Whether the spatial index is out of date.
    pub fn is_dirty(&self) -> bool {
        !self.not_indexed.is_empty() || !self.removed_indexed.is_empty()
    }

    /// Called by the index once a rebuild covers every live word.
    pub(crate) fn mark_indexed(&mut self) {
        self.not_indexed.clear();
        self.removed_indexed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ElementType;

    fn word(id: WordId) -> Word {
        Word::new(id, vec![id as f32, 0.0, 1.0])
    }

    #[test]
    fn add_marks_not_indexed_and_unused() {
        let mut store = WordStore::new();
        store.add_word(word(1)).unwrap();
        assert!(store.is_dirty());
        assert!(!store.is_indexed(1));
        assert!(store.is_unused(1));
        assert_eq!(
            store.canonical_shape(),
            Some(DescriptorShape::new(ElementType::F32, 3))
        );
    }

    #[test]
    fn duplicate_and_invalid_words_rejected() {
        let mut store = WordStore::new();
        store.add_word(word(1)).unwrap();
        assert_eq!(store.add_word(word(1)), Err(IndexError::DuplicateId(1)));
        assert!(matches!(
            store.add_word(word(0)),
            Err(IndexError::InvalidWord { id: 0, .. })
        ));
        assert!(matches!(
            store.add_word(Word::new(2, Vec::<f32>::new())),
            Err(IndexError::InvalidWord { id: 2, .. })
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn shape_violation_is_not_inserted() {
        let mut store = WordStore::new();
        store.add_word(word(1)).unwrap();
        let err = store.add_word(Word::new(2, vec![1.0f32, 2.0])).unwrap_err();
        assert!(matches!(err, IndexError::ConfigMismatch { .. }));
        let err = store.add_word(Word::new(3, vec![1u8, 2, 3])).unwrap_err();
        assert!(matches!(err, IndexError::ConfigMismatch { .. }));
        assert_eq!(store.len(), 1);
        assert!(!store.contains(2));
    }

    #[test]
    fn referenced_words_count_toward_active_references() {
        let mut store = WordStore::new();
        store
            .add_word(Word::with_references(5, vec![1.0f32], [10, 10, 11]))
            .unwrap();
        assert_eq!(store.total_active_references(), 3);
        assert!(!store.is_unused(5));
    }

    #[test]
    fn reference_accounting_round_trip() {
        let mut store = WordStore::new();
        store.add_word(word(1)).unwrap();
        let before = store.total_active_references();

        store.add_word_ref(1, 42);
        store.add_word_ref(1, 42);
        assert!(!store.is_unused(1));
        assert_eq!(store.total_active_references(), before + 2);

        assert_eq!(store.remove_all_word_ref(1, 42), 2);
        assert!(store.is_unused(1));
        assert_eq!(store.total_active_references(), before);
    }

    #[test]
    fn refs_to_missing_or_null_ids_are_ignored() {
        let mut store = WordStore::new();
        store.add_word(word(1)).unwrap();
        store.add_word_ref(99, 1);
        store.add_word_ref(0, 1);
        store.add_word_ref(1, 0);
        assert_eq!(store.total_active_references(), 0);
        assert!(store.is_unused(1));
        assert_eq!(store.remove_all_word_ref(99, 1), 0);
    }

    #[test]
    fn removing_unindexed_word_leaves_no_trace() {
        let mut store = WordStore::new();
        store.add_word(word(1)).unwrap();
        assert_eq!(store.remove_words(&[1]), 1);
        assert!(!store.is_dirty());
        assert_eq!(store.pending_remove_count(), 0);
    }

    #[test]
    fn removing_indexed_word_records_pending_remove() {
        let mut store = WordStore::new();
        store.add_word(word(1)).unwrap();
        store.mark_indexed();
        assert!(store.is_indexed(1));
        store.remove_words(&[1]);
        assert!(store.is_removed_since_rebuild(1));
        assert!(store.is_dirty());
    }

    #[test]
    fn delete_unused_only_touches_unreferenced_words() {
        let mut store = WordStore::new();
        for id in 1..=4 {
            store.add_word(word(id)).unwrap();
        }
        store.mark_indexed();
        store.add_word_ref(2, 7);
        store.add_word_ref(4, 7);

        let deleted = store.delete_unused_words();
        assert_eq!(deleted, vec![1, 3]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.unused_word_ids().count(), 0);
        assert_eq!(store.pending_remove_count(), 2);
        assert_eq!(store.total_active_references(), 2);
    }

    #[test]
    fn removing_referenced_word_releases_its_references() {
        let mut store = WordStore::new();
        store.add_word(word(1)).unwrap();
        store.add_word_ref(1, 3);
        store.remove_words(&[1]);
        assert_eq!(store.total_active_references(), 0);
    }

    #[test]
    fn clear_resets_canonical_shape() {
        let mut store = WordStore::new();
        store.add_word(word(1)).unwrap();
        store.clear(false);
        assert!(store.is_empty());
        assert_eq!(store.canonical_shape(), None);
        store.add_word(Word::new(2, vec![1u8; 32])).unwrap();
        assert_eq!(
            store.canonical_shape(),
            Some(DescriptorShape::new(ElementType::U8, 32))
        );
    }

    #[test]
    fn failed_batch_leaves_store_untouched() {
        let mut store = WordStore::new();
        store.add_word(word(1)).unwrap();
        store.mark_indexed();

        let batch = vec![word(5), word(1)];
        assert_eq!(store.add_words(batch), Err(IndexError::DuplicateId(1)));
        assert_eq!(store.len(), 1);
        assert!(!store.contains(5));
        assert!(!store.is_dirty());

        let batch = vec![word(6), word(6)];
        assert_eq!(store.add_words(batch), Err(IndexError::DuplicateId(6)));
        let batch = vec![word(7), Word::new(8, vec![1.0f32])];
        assert!(matches!(
            store.add_words(batch),
            Err(IndexError::ConfigMismatch { .. })
        ));
        assert_eq!(store.len(), 1);
        assert!(!store.is_dirty());

        store.add_words(vec![word(2), word(3)]).unwrap();
        assert_eq!(store.pending_add_count(), 2);
    }

    #[test]
    fn first_batch_fixes_the_shape() {
        let mut store = WordStore::new();
        let batch = vec![Word::new(1, vec![1u8; 4]), Word::new(2, vec![1.0f32; 4])];
        assert!(store.add_words(batch).is_err());
        assert_eq!(store.canonical_shape(), None);

        store.add_words(vec![Word::new(1, vec![1u8; 4])]).unwrap();
        assert_eq!(
            store.canonical_shape(),
            Some(DescriptorShape::new(ElementType::U8, 4))
        );
    }

    #[test]
    fn non_finite_descriptors_rejected() {
        let mut store = WordStore::new();
        for bad in [f32::INFINITY, f32::NEG_INFINITY, f32::NAN] {
            assert!(matches!(
                store.add_word(Word::new(1, vec![bad, 0.0])),
                Err(IndexError::InvalidWord { id: 1, .. })
            ));
        }
        assert!(store.is_empty());
        assert_eq!(store.canonical_shape(), None);
    }

    #[test]
    fn unknown_word_reference_removal_is_a_no_op() {
        let mut store = WordStore::new();
        store.add_word(word(1)).unwrap();
        store.add_word_ref(1, 4);
        assert_eq!(store.remove_all_word_ref(9, 4), 0);
        assert_eq!(store.total_active_references(), 1);
        assert!(!store.is_unused(1));
    }
}
