//! Length-prefixed postcard frames.
//!
//! ```text
//! ┌──────────────────┬──────────────────────────────┐
//! │ len: u32 (BE)    │ postcard(RpcRequest|Response)│
//! └──────────────────┴──────────────────────────────┘
//! ```

use crate::descriptor::Descriptors;
use crate::error::{FailureKind, RpcError};
use crate::index::SignatureCandidate;
use crate::pipeline::{CameraModel, KeyPoint, Session};
use crate::WordId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Calls a client can make.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcRequest {
    /// Descriptors -> word ids.
    OnFeature {
        keypoints: Vec<KeyPoint>,
        descriptors: Descriptors,
        camera: Option<CameraModel>,
        session: Session,
    },
    /// Word ids -> ranked signatures.
    OnWord {
        word_ids: Vec<WordId>,
        keypoints: Vec<KeyPoint>,
        camera: Option<CameraModel>,
        session: Session,
    },
}

impl RpcRequest {
    pub fn method(&self) -> &'static str {
        match self {
            RpcRequest::OnFeature { .. } => "onFeature",
            RpcRequest::OnWord { .. } => "onWord",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RpcResponse {
    Words(Vec<WordId>),
    Signatures(Vec<SignatureCandidate>),
    Failed { kind: FailureKind, message: String },
}

pub async fn write_frame<W, T>(writer: &mut W, message: &T, max_frame_bytes: usize) -> Result<(), RpcError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = postcard::to_allocvec(message)?;
    if payload.len() > max_frame_bytes {
        return Err(RpcError::FrameTooLarge {
            size: payload.len(),
            limit: max_frame_bytes,
        });
    }
    let len = u32::try_from(payload.len()).map_err(|_| RpcError::FrameTooLarge {
        size: payload.len(),
        limit: u32::MAX as usize,
    })?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. `Ok(None)` on a clean end of stream before a header.
pub async fn read_frame<R, T>(reader: &mut R, max_frame_bytes: usize) -> Result<Option<T>, RpcError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }
    let size = u32::from_be_bytes(header) as usize;
    if size > max_frame_bytes {
        return Err(RpcError::FrameTooLarge {
            size,
            limit: max_frame_bytes,
        });
    }

    let mut payload = vec![0u8; size];
    reader.read_exact(&mut payload).await.map_err(|err| {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            RpcError::ConnectionClosed
        } else {
            RpcError::Io(err)
        }
    })?;
    Ok(Some(postcard::from_bytes(&payload)?))
}
