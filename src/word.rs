//! Vocabulary words.

use crate::descriptor::Descriptor;
use crate::{SignatureId, WordId};
use std::collections::BTreeMap;

/// A visual word: an id, an immutable descriptor and the signatures that
/// reference it.
///
/// References form a multiset: the same signature may reference a word several
/// times (one per matching keypoint).
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    id: WordId,
    descriptor: Descriptor,
    references: BTreeMap<SignatureId, usize>,
}

impl Word {
    pub fn new(id: WordId, descriptor: impl Into<Descriptor>) -> Self {
        Self {
            id,
            descriptor: descriptor.into(),
            references: BTreeMap::new(),
        }
    }

    /// A word that is already referenced, e.g. when loaded from a database.
    pub fn with_references(
        id: WordId,
        descriptor: impl Into<Descriptor>,
        references: impl IntoIterator<Item = SignatureId>,
    ) -> Self {
        let mut word = Self::new(id, descriptor);
        for signature_id in references {
            word.add_ref(signature_id);
        }
        word
    }

    pub fn id(&self) -> WordId {
        self.id
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Signature id -> number of references from that signature.
    pub fn references(&self) -> &BTreeMap<SignatureId, usize> {
        &self.references
    }

    /// Total references, counting repeats.
    pub fn reference_count(&self) -> usize {
        self.references.values().sum()
    }

    pub fn is_unused(&self) -> bool {
        self.references.is_empty()
    }

    pub(crate) fn add_ref(&mut self, signature_id: SignatureId) {
        *self.references.entry(signature_id).or_insert(0) += 1;
    }

    /// Drop every reference from `signature_id`; returns how many were dropped.
    pub(crate) fn remove_all_refs(&mut self, signature_id: SignatureId) -> usize {
        self.references.remove(&signature_id).unwrap_or(0)
    }
}
