//! visword: incremental visual-word nearest-neighbor index.
//!
//! Camera images arrive as descriptor matrices. Each descriptor row is
//! quantized to the nearest word of a visual vocabulary, and the resulting
//! word ids are matched against stored signatures (previously seen places).
//! The vocabulary keeps changing while queries run.
//!
//! # Layers
//!
//! | Module | Role |
//! |--------|------|
//! | [`descriptor`], [`distance`], [`simd`] | rows, matrices, metrics |
//! | [`backend`] | k-NN structures built over a matrix (K-D tree, linear scan) |
//! | [`store`] | word ownership, reference counts, pending index changes |
//! | [`index`] | lazily rebuilt [`VisualWordIndex`], eagerly rebuilt [`SignatureIndex`] |
//! | [`pipeline`] | word and signature stages as tokio tasks |
//! | [`rpc`] | `onFeature` / `onWord` over TCP |
//!
//! # Example
//!
//! ```
//! use visword::{Descriptors, VisualWordIndex, Word};
//!
//! let mut index = VisualWordIndex::default();
//! index.add_word(Word::new(10, vec![1.0f32, 0.0])).unwrap();
//! index.add_word(Word::new(20, vec![0.0f32, 1.0])).unwrap();
//!
//! // Not yet rebuilt: pending words are searched exactly.
//! let query = Descriptors::from_f32_rows(&[vec![0.1, 0.9]]).unwrap();
//! assert_eq!(index.find_nn(&query), vec![20]);
//!
//! index.update().unwrap();
//! assert_eq!(index.find_nn(&query), vec![20]);
//! ```
//!
//! # Sentinel
//!
//! Word and signature ids are positive. [`NO_MATCH`] (`0`) stands for "no
//! match": empty dictionary, wrong descriptor shape, or a failed request.

pub mod backend;
pub mod config;
pub mod descriptor;
pub mod distance;
pub mod error;
pub mod index;
pub mod pipeline;
pub mod rpc;
pub mod simd;
pub mod snapshot;
pub mod store;
pub mod word;

/// Vocabulary word id. `0` is reserved.
pub type WordId = u32;

/// Signature (location) id. `0` is reserved.
pub type SignatureId = u32;

/// Returned for rows that matched nothing.
pub const NO_MATCH: WordId = 0;

pub use backend::{KdTreeParams, NnStrategy, SpatialIndex};
pub use config::{NodeConfig, PipelineConfig, RpcConfig};
pub use descriptor::{Descriptor, DescriptorShape, Descriptors, ElementType};
pub use error::{FailureKind, IndexError, Result, RpcError, StageError};
pub use index::{
    LazyRebuildConfig, NearestWord, RebuildPolicy, SignatureCandidate, SignatureIndex,
    VisualWordIndex,
};
pub use pipeline::Pipeline;
pub use snapshot::VocabularySnapshot;
pub use store::WordStore;
pub use word::Word;
