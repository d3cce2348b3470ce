//! What a stage calls to do its work.
//!
//! A resolver is owned by exactly one stage task, so it takes `&mut self` and
//! needs no interior locking. Local indexes and RPC clients implement the same
//! traits; a stage cannot tell them apart.

use super::messages::{SensorData, Session};
use crate::error::StageError;
use crate::index::{SignatureCandidate, SignatureIndex, VisualWordIndex};
use crate::word::Word;
use crate::{SignatureId, WordId};
use async_trait::async_trait;

/// A vocabulary mutation, applied by the word stage between queries.
#[derive(Debug, Clone, PartialEq)]
pub enum VocabularyOp {
    AddWords(Vec<Word>),
    AddWordRef {
        word_id: WordId,
        signature_id: SignatureId,
    },
    RemoveAllWordRef {
        word_id: WordId,
        signature_id: SignatureId,
    },
    RemoveWords(Vec<WordId>),
    DeleteUnusedWords,
    /// Force a rebuild now.
    Update,
}

/// Turns descriptors into word ids.
#[async_trait]
pub trait WordResolver: Send + 'static {
    /// One id per descriptor row of `sensor`.
    async fn resolve_words(
        &mut self,
        sensor: &SensorData,
        session: Session,
    ) -> Result<Vec<WordId>, StageError>;

    /// Apply a vocabulary mutation. Returns the ids removed by it, if any.
    fn apply(&mut self, op: VocabularyOp) -> Result<Vec<WordId>, StageError> {
        let _ = op;
        Err(StageError::Unsupported("vocabulary maintenance"))
    }

    /// Rebuild if due. Returns whether a rebuild happened.
    fn refresh(&mut self) -> Result<bool, StageError> {
        Ok(false)
    }
}

/// Turns word ids into ranked signatures.
#[async_trait]
pub trait SignatureResolver: Send + 'static {
    async fn resolve_signatures(
        &mut self,
        word_ids: &[WordId],
        sensor: &SensorData,
        session: Session,
        top_k: usize,
    ) -> Result<Vec<SignatureCandidate>, StageError>;
}

#[async_trait]
impl WordResolver for VisualWordIndex {
    async fn resolve_words(
        &mut self,
        sensor: &SensorData,
        _session: Session,
    ) -> Result<Vec<WordId>, StageError> {
        Ok(self.try_find_nn(&sensor.descriptors)?)
    }

    fn apply(&mut self, op: VocabularyOp) -> Result<Vec<WordId>, StageError> {
        let removed = match op {
            VocabularyOp::AddWords(words) => {
                self.add_words(words)?;
                Vec::new()
            }
            VocabularyOp::AddWordRef {
                word_id,
                signature_id,
            } => {
                self.add_word_ref(word_id, signature_id);
                Vec::new()
            }
            VocabularyOp::RemoveAllWordRef {
                word_id,
                signature_id,
            } => {
                self.remove_all_word_ref(word_id, signature_id);
                Vec::new()
            }
            VocabularyOp::RemoveWords(ids) => {
                let removed: Vec<WordId> = ids
                    .into_iter()
                    .filter(|&id| self.store().contains(id))
                    .collect();
                self.remove_words(&removed);
                removed
            }
            VocabularyOp::DeleteUnusedWords => self.delete_unused_words(),
            VocabularyOp::Update => {
                self.update()?;
                Vec::new()
            }
        };
        Ok(removed)
    }

    fn refresh(&mut self) -> Result<bool, StageError> {
        Ok(VisualWordIndex::refresh(self)?)
    }
}

#[async_trait]
impl WordResolver for SignatureIndex {
    async fn resolve_words(
        &mut self,
        sensor: &SensorData,
        _session: Session,
    ) -> Result<Vec<WordId>, StageError> {
        Ok(self.find_nns(&sensor.descriptors)?)
    }

    fn apply(&mut self, op: VocabularyOp) -> Result<Vec<WordId>, StageError> {
        match op {
            VocabularyOp::AddWords(words) => {
                self.put_words(words)?;
                Ok(Vec::new())
            }
            VocabularyOp::Update => Ok(Vec::new()),
            _ => Err(StageError::Unsupported("removing words from an eagerly built index")),
        }
    }
}

#[async_trait]
impl SignatureResolver for SignatureIndex {
    async fn resolve_signatures(
        &mut self,
        word_ids: &[WordId],
        _sensor: &SensorData,
        _session: Session,
        top_k: usize,
    ) -> Result<Vec<SignatureCandidate>, StageError> {
        Ok(self.rank_signatures(word_ids, top_k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> VisualWordIndex {
        let mut index = VisualWordIndex::default();
        index.add_word(Word::new(1, vec![0.0f32, 0.0])).unwrap();
        index.update().unwrap();
        index
    }

    #[test]
    fn failed_add_words_changes_nothing() {
        let mut index = index();
        let op = VocabularyOp::AddWords(vec![
            Word::new(5, vec![5.0f32, 5.0]),
            Word::new(1, vec![1.0f32, 1.0]),
        ]);
        assert!(index.apply(op).is_err());
        assert_eq!(index.len(), 1);
        assert!(!index.store().contains(5));
        assert!(!index.store().is_dirty());
    }

    #[test]
    fn remove_words_reports_only_known_ids() {
        let mut index = index();
        let removed = index.apply(VocabularyOp::RemoveWords(vec![1, 42])).unwrap();
        assert_eq!(removed, vec![1]);
        assert!(index.is_empty());
    }

    #[test]
    fn signature_index_rejects_reference_ops() {
        let mut index = SignatureIndex::default();
        let op = VocabularyOp::AddWordRef {
            word_id: 1,
            signature_id: 1,
        };
        assert!(matches!(index.apply(op), Err(StageError::Unsupported(_))));
    }
}
