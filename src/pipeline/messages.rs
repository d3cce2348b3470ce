//! Messages passed between stages.
//!
//! Every message is moved, never shared: a stage owns the sensor data of a
//! request from the moment it receives it until it forwards it.

use crate::descriptor::Descriptors;
use crate::error::{FailureKind, StageError};
use crate::index::SignatureCandidate;
use crate::WordId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An image keypoint (position, scale, orientation).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct KeyPoint {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub angle: f32,
    pub response: f32,
    pub octave: i32,
}

/// Pinhole camera intrinsics. Passed through untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CameraModel {
    pub name: String,
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub image_width: u32,
    pub image_height: u32,
}

/// Opaque client session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Session(pub u64);

/// Output of feature extraction for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorData {
    pub image: Vec<u8>,
    pub keypoints: Vec<KeyPoint>,
    pub descriptors: Descriptors,
    pub camera_models: Vec<CameraModel>,
}

impl SensorData {
    pub fn new(keypoints: Vec<KeyPoint>, descriptors: Descriptors) -> Self {
        Self {
            image: Vec::new(),
            keypoints,
            descriptors,
            camera_models: Vec::new(),
        }
    }

    pub fn with_camera(mut self, camera: CameraModel) -> Self {
        self.camera_models.push(camera);
        self
    }

    /// The camera forwarded across the RPC boundary.
    pub fn primary_camera(&self) -> Option<&CameraModel> {
        self.camera_models.first()
    }
}

/// Time spent in each stage, accumulated as the request moves along.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PerfData {
    pub word_search: Duration,
    pub signature_search: Duration,
}

/// A request entering the word stage.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureEvent {
    pub sensor: SensorData,
    pub perf: PerfData,
    pub session: Session,
}

impl FeatureEvent {
    pub fn new(sensor: SensorData, session: Session) -> Self {
        Self {
            sensor,
            perf: PerfData::default(),
            session,
        }
    }
}

/// Descriptors resolved to word ids (one per row).
#[derive(Debug, Clone, PartialEq)]
pub struct WordEvent {
    pub sensor: SensorData,
    pub word_ids: Vec<WordId>,
    pub perf: PerfData,
    pub session: Session,
}

/// Word ids resolved to ranked signature candidates.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureEvent {
    pub sensor: SensorData,
    pub word_ids: Vec<WordId>,
    pub candidates: Vec<SignatureCandidate>,
    pub perf: PerfData,
    pub session: Session,
}

/// Serializable summary of a stage error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&StageError> for FailureReason {
    fn from(err: &StageError) -> Self {
        Self {
            kind: err.failure_kind(),
            message: err.to_string(),
        }
    }
}

/// A request that could not be resolved. Downstream treats it as "no match".
#[derive(Debug, Clone, PartialEq)]
pub struct FailedRequest {
    pub reason: FailureReason,
    pub sensor: SensorData,
    pub perf: PerfData,
    pub session: Session,
}

/// Result of one stage for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Resolved(T),
    Failed(FailedRequest),
}

impl<T> Outcome<T> {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Outcome::Resolved(_))
    }

    pub fn resolved(self) -> Option<T> {
        match self {
            Outcome::Resolved(value) => Some(value),
            Outcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&FailedRequest> {
        match self {
            Outcome::Resolved(_) => None,
            Outcome::Failed(failed) => Some(failed),
        }
    }
}

