//! JSON vocabulary snapshots.
//!
//! Enough to start a node or a test from a file; not a persistence layer.
//!
//! ```json
//! {
//!   "words": [
//!     { "id": 1, "descriptor": { "f32": [0.0, 1.0] } },
//!     { "id": 2, "descriptor": { "u8": [255, 0] } }
//!   ],
//!   "signatures": [ { "id": 10, "words": [1, 2, 2] } ]
//! }
//! ```

use crate::backend::NnStrategy;
use crate::descriptor::Descriptor;
use crate::error::IndexError;
use crate::index::{LazyRebuildConfig, SignatureIndex, VisualWordIndex};
use crate::word::Word;
use crate::{SignatureId, WordId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("cannot access snapshot {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Index(#[from] IndexError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordRecord {
    pub id: WordId,
    pub descriptor: Descriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub id: SignatureId,
    /// One entry per reference; repeats are allowed.
    pub words: Vec<WordId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabularySnapshot {
    pub words: Vec<WordRecord>,
    pub signatures: Vec<SignatureRecord>,
}

impl VocabularySnapshot {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let snapshot: Self = serde_json::from_str(&json)?;
        info!(
            path = %path.display(),
            words = snapshot.words.len(),
            signatures = snapshot.signatures.len(),
            "loaded vocabulary snapshot"
        );
        Ok(snapshot)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| SnapshotError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Words with their signature references attached.
    fn referenced_words(self) -> Vec<Word> {
        let mut refs: HashMap<WordId, Vec<SignatureId>> = HashMap::new();
        for signature in self.signatures.iter().filter(|s| s.id != 0) {
            for &word in &signature.words {
                refs.entry(word).or_default().push(signature.id);
            }
        }
        self.words
            .into_iter()
            .map(|record| {
                let signatures = refs.remove(&record.id).unwrap_or_default();
                Word::with_references(record.id, record.descriptor, signatures)
            })
            .collect()
    }

    /// A lazily rebuilt index over the words, already built once.
    pub fn into_visual_index(
        self,
        strategy: NnStrategy,
        config: LazyRebuildConfig,
    ) -> Result<VisualWordIndex, SnapshotError> {
        let mut index = VisualWordIndex::with_config(strategy, config);
        index.add_words(self.referenced_words())?;
        index.update()?;
        Ok(index)
    }

    /// An eager index over the words, with the signatures loaded.
    pub fn into_signature_index(self, strategy: NnStrategy) -> Result<SignatureIndex, SnapshotError> {
        let signatures: Vec<(SignatureId, Vec<WordId>)> = self
            .signatures
            .iter()
            .map(|s| (s.id, s.words.clone()))
            .collect();
        let mut index = SignatureIndex::new(strategy);
        index.put_words(self.referenced_words())?;
        index.put_signatures(signatures);
        Ok(index)
    }
}
