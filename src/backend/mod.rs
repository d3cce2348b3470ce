//! Nearest-neighbor backends.
//!
//! A backend is built once over a full descriptor matrix and answers k-NN
//! queries by **row position**; mapping positions back to word ids is the
//! caller's job. Backends are never mutated in place: a changed vocabulary
//! means a fresh [`SpatialIndex::build`].
//!
//! | Strategy | Search type | Exact | Notes |
//! |----------|-------------|-------|-------|
//! | [`KdTreeIndex`] | `F32` (binary rows widened) | yes, unless `max_checks` is set | default |
//! | [`LinearScan`] | native | yes | also used for not-yet-indexed words |
//!
//! Both order candidates by `(distance, position)`, so equal distances resolve
//! to the lower position.

mod kdtree;
mod linear;

pub use kdtree::{KdTreeIndex, KdTreeParams};
pub use linear::LinearScan;

use crate::descriptor::{Descriptors, ElementType};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;

/// One k-NN hit: a row position in the built matrix and its distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: u32,
    pub distance: f32,
}

impl Neighbor {
    /// Total order by distance, then position.
    pub fn key_cmp(&self, other: &Neighbor) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.position.cmp(&other.position))
    }
}

/// Hits for one query row, nearest first. Inline for the common k <= 2.
pub type Neighbors = SmallVec<[Neighbor; 2]>;

/// Capability set of a nearest-neighbor structure.
pub trait SpatialIndex: Send + Sync + fmt::Debug {
    /// Replace whatever was built before with an index over `data`.
    fn build(&mut self, data: Descriptors) -> Result<()>;

    /// Up to `k` nearest rows for every row of `query`.
    fn knn_search(&self, query: &Descriptors, k: usize) -> Result<Vec<Neighbors>>;

    /// Number of rows indexed.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the built structure and its rows.
    fn clear(&mut self);

    fn name(&self) -> &'static str;
}

/// Backend selection, fixed when an index is constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NnStrategy {
    KdTree(KdTreeParams),
    Linear,
}

impl Default for NnStrategy {
    fn default() -> Self {
        NnStrategy::KdTree(KdTreeParams::default())
    }
}

impl NnStrategy {
    /// Element type rows must be converted to before searching.
    pub fn search_element(&self, stored: ElementType) -> ElementType {
        match self {
            NnStrategy::KdTree(_) => ElementType::F32,
            NnStrategy::Linear => stored,
        }
    }

    /// A fresh, unbuilt backend.
    pub fn create(&self) -> Box<dyn SpatialIndex> {
        match self {
            NnStrategy::KdTree(params) => Box::new(KdTreeIndex::new(params.clone())),
            NnStrategy::Linear => Box::new(LinearScan::new()),
        }
    }
}

/// Bounded best-k collector ordered by [`Neighbor::key_cmp`].
#[derive(Debug)]
pub(crate) struct TopK {
    k: usize,
    items: Neighbors,
}

impl TopK {
    pub(crate) fn new(k: usize) -> Self {
        Self {
            k,
            items: SmallVec::new(),
        }
    }

    pub(crate) fn is_full(&self) -> bool {
        self.items.len() >= self.k
    }

    /// Distance of the k-th best hit once `k` hits are held.
    pub(crate) fn worst(&self) -> Option<f32> {
        if self.is_full() {
            self.items.last().map(|n| n.distance)
        } else {
            None
        }
    }

    pub(crate) fn push(&mut self, candidate: Neighbor) {
        if self.k == 0 {
            return;
        }
        let at = self
            .items
            .partition_point(|n| n.key_cmp(&candidate) == Ordering::Less);
        if self.is_full() {
            if at >= self.k {
                return;
            }
            self.items.pop();
        }
        self.items.insert(at, candidate);
    }

    pub(crate) fn into_neighbors(self) -> Neighbors {
        self.items
    }
}
