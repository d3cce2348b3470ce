//! Descriptor-to-word resolution.
//!
//! Two indexes share one [`WordStore`] model and one backend abstraction but
//! differ in *when* the spatial structure is rebuilt:
//!
//! | Index | Policy | Rebuild | Query shape mismatch |
//! |-------|--------|---------|----------------------|
//! | [`VisualWordIndex`] | [`RebuildPolicy::LazyRebuild`] | on `update()` / `refresh()` | zeros, logged |
//! | [`SignatureIndex`] | [`RebuildPolicy::EagerRebuild`] | every `put_words` | `Err(InvariantViolation)` |
//!
//! The lazy index stays correct between rebuilds by scanning not-yet-indexed
//! words exactly and filtering words removed since the last build.

pub mod signature;
pub mod visual;

pub use signature::{SignatureCandidate, SignatureIndex};
pub use visual::{LazyRebuildConfig, VisualWordIndex, WordMatch, WordMatches};

use crate::backend::{NnStrategy, SpatialIndex};
use crate::descriptor::{DescriptorShape, Descriptors};
use crate::error::{IndexError, Result};
use crate::store::WordStore;
use crate::WordId;

/// When an index rebuilds its spatial structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildPolicy {
    /// Mutations accumulate; rebuild on demand.
    LazyRebuild,
    /// Every insertion batch triggers a full rebuild.
    EagerRebuild,
}

/// Shared query surface of the word indexes.
pub trait NearestWord: Send {
    /// One word id per descriptor row (`0` for no match).
    fn find_nearest(&self, descriptors: &Descriptors) -> Result<Vec<WordId>>;

    fn policy(&self) -> RebuildPolicy;

    /// Rebuild if the index's policy says it is due. Returns whether it rebuilt.
    fn refresh(&mut self) -> Result<bool>;

    fn word_count(&self) -> usize;
}

/// Backend built over every live word of `store`, and the position -> id map.
///
/// Rows are laid out in ascending id order, so backend position ties resolve
/// to the lowest word id.
pub(crate) fn build_backend(
    store: &WordStore,
    strategy: &NnStrategy,
) -> Result<(Box<dyn SpatialIndex>, Vec<WordId>)> {
    let mut backend = strategy.create();
    let Some(canonical) = store.canonical_shape() else {
        return Ok((backend, Vec::new()));
    };
    let shape = DescriptorShape::new(strategy.search_element(canonical.element), canonical.dim);

    let mut matrix = Descriptors::with_capacity(shape, store.len());
    let mut ids = Vec::with_capacity(store.len());
    for word in store.words() {
        matrix.push_row(word.descriptor().as_row())?;
        ids.push(word.id());
    }
    if !ids.is_empty() {
        backend.build(matrix)?;
    }
    Ok((backend, ids))
}

/// The dictionary shape, if `query` matches it.
pub(crate) fn checked_shape(store: &WordStore, query: &Descriptors) -> Result<DescriptorShape> {
    let canonical = store.canonical_shape().ok_or(IndexError::EmptyDictionary)?;
    if query.shape() != canonical {
        return Err(IndexError::ConfigMismatch {
            expected: canonical,
            actual: query.shape(),
        });
    }
    Ok(canonical)
}
