//! The two services: `onFeature` over a [`VisualWordIndex`] and `onWord`
//! over a [`SignatureIndex`].
//!
//! Connections are served concurrently, so each index sits behind a
//! `parking_lot::RwLock`: queries share the read lock and maintenance takes
//! the write lock.

use super::server::RpcService;
use super::wire::{RpcRequest, RpcResponse};
use crate::error::{FailureKind, IndexError};
use crate::index::{SignatureIndex, VisualWordIndex};
use parking_lot::RwLock;
use std::sync::Arc;

fn failed(err: &IndexError) -> RpcResponse {
    RpcResponse::Failed {
        kind: err.failure_kind(),
        message: err.to_string(),
    }
}

fn not_served(method: &str, service: &str) -> RpcResponse {
    RpcResponse::Failed {
        kind: FailureKind::InvariantViolation,
        message: format!("{method} is not served by the {service} service"),
    }
}

/// Serves `onFeature`.
#[derive(Debug, Clone)]
pub struct WordService {
    index: Arc<RwLock<VisualWordIndex>>,
}

impl WordService {
    pub fn new(index: VisualWordIndex) -> Self {
        Self {
            index: Arc::new(RwLock::new(index)),
        }
    }

    /// The served index, for maintenance while serving.
    pub fn index(&self) -> Arc<RwLock<VisualWordIndex>> {
        Arc::clone(&self.index)
    }
}

impl RpcService for WordService {
    fn handle(&self, request: RpcRequest) -> RpcResponse {
        match request {
            RpcRequest::OnFeature { descriptors, .. } => {
                match self.index.read().try_find_nn(&descriptors) {
                    Ok(ids) => RpcResponse::Words(ids),
                    Err(err) => failed(&err),
                }
            }
            other => not_served(other.method(), "word"),
        }
    }
}

/// Serves `onWord`.
#[derive(Debug, Clone)]
pub struct SignatureService {
    index: Arc<RwLock<SignatureIndex>>,
    top_k: usize,
}

impl SignatureService {
    pub fn new(index: SignatureIndex, top_k: usize) -> Self {
        Self {
            index: Arc::new(RwLock::new(index)),
            top_k,
        }
    }

    pub fn index(&self) -> Arc<RwLock<SignatureIndex>> {
        Arc::clone(&self.index)
    }
}

impl RpcService for SignatureService {
    fn handle(&self, request: RpcRequest) -> RpcResponse {
        match request {
            RpcRequest::OnWord { word_ids, .. } => {
                RpcResponse::Signatures(self.index.read().rank_signatures(&word_ids, self.top_k))
            }
            other => not_served(other.method(), "signature"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Descriptors;
    use crate::pipeline::Session;
    use crate::word::Word;

    fn on_feature(descriptors: Descriptors) -> RpcRequest {
        RpcRequest::OnFeature {
            keypoints: Vec::new(),
            descriptors,
            camera: None,
            session: Session(1),
        }
    }

    #[test]
    fn word_service_resolves_and_reports_mismatch() {
        let mut index = VisualWordIndex::default();
        index.add_word(Word::new(4, vec![1.0f32, 1.0])).unwrap();
        let service = WordService::new(index);

        let ok = service.handle(on_feature(Descriptors::from_f32_rows(&[vec![1.0, 1.0]]).unwrap()));
        assert_eq!(ok, RpcResponse::Words(vec![4]));

        let bad = service.handle(on_feature(Descriptors::from_f32_rows(&[vec![1.0]]).unwrap()));
        assert!(matches!(
            bad,
            RpcResponse::Failed {
                kind: FailureKind::ConfigMismatch,
                ..
            }
        ));
    }

    #[test]
    fn services_reject_the_other_method() {
        let words = WordService::new(VisualWordIndex::default());
        let response = words.handle(RpcRequest::OnWord {
            word_ids: vec![1],
            keypoints: Vec::new(),
            camera: None,
            session: Session(1),
        });
        assert!(matches!(response, RpcResponse::Failed { .. }));

        let signatures = SignatureService::new(SignatureIndex::default(), 1);
        let response = signatures.handle(on_feature(Descriptors::from_f32(1, Vec::new()).unwrap()));
        assert!(matches!(response, RpcResponse::Failed { .. }));
    }

    #[test]
    fn signature_service_honours_top_k() {
        let mut index = SignatureIndex::default();
        index.put_signatures([(1, vec![1, 2]), (2, vec![2]), (3, vec![2, 3])]);
        let service = SignatureService::new(index, 2);
        let response = service.handle(RpcRequest::OnWord {
            word_ids: vec![2, 3],
            keypoints: Vec::new(),
            camera: None,
            session: Session(1),
        });
        match response {
            RpcResponse::Signatures(candidates) => {
                assert_eq!(candidates.len(), 2);
                assert_eq!(candidates[0].id, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
