//! RPC client and the remote resolvers built on it.

use super::wire::{read_frame, write_frame, RpcRequest, RpcResponse};
use crate::config::RpcConfig;
use crate::descriptor::Descriptors;
use crate::error::{RpcError, StageError};
use crate::index::SignatureCandidate;
use crate::pipeline::{CameraModel, KeyPoint, SensorData, Session, SignatureResolver, WordResolver};
use crate::WordId;
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

/// One connection to an RPC server, reopened after a failed call.
#[derive(Debug)]
pub struct RpcClient {
    addr: SocketAddr,
    config: RpcConfig,
    stream: Option<TcpStream>,
}

impl RpcClient {
    pub async fn connect(addr: SocketAddr, config: RpcConfig) -> Result<Self, RpcError> {
        let mut client = Self {
            addr,
            config,
            stream: None,
        };
        client.ensure_connected().await?;
        Ok(client)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    async fn ensure_connected(&mut self) -> Result<&mut TcpStream, RpcError> {
        if self.stream.is_none() {
            let limit = self.config.connect_timeout();
            let stream = timeout(limit, TcpStream::connect(self.addr))
                .await
                .map_err(|_| RpcError::Timeout(limit))??;
            stream.set_nodelay(true)?;
            debug!(addr = %self.addr, "connected");
            self.stream = Some(stream);
        }
        self.stream.as_mut().ok_or(RpcError::ConnectionClosed)
    }

    /// Send one request and wait for its response.
    pub async fn call(&mut self, request: &RpcRequest) -> Result<RpcResponse, RpcError> {
        let limit = self.config.request_timeout();
        let max_frame_bytes = self.config.max_frame_bytes;
        let result = match self.ensure_connected().await {
            Ok(stream) => timeout(limit, async {
                write_frame(stream, request, max_frame_bytes).await?;
                read_frame::<_, RpcResponse>(stream, max_frame_bytes)
                    .await?
                    .ok_or(RpcError::ConnectionClosed)
            })
            .await
            .unwrap_or(Err(RpcError::Timeout(limit))),
            Err(err) => Err(err),
        };

        if let Err(err) = &result {
            // The stream may hold half a frame; start over next time.
            warn!(addr = %self.addr, method = request.method(), error = %err, "rpc call failed");
            self.stream = None;
        }
        result
    }

    /// `onFeature`: descriptors -> word ids.
    pub async fn on_feature(
        &mut self,
        keypoints: Vec<KeyPoint>,
        descriptors: Descriptors,
        camera: Option<CameraModel>,
        session: Session,
    ) -> Result<Vec<WordId>, RpcError> {
        let request = RpcRequest::OnFeature {
            keypoints,
            descriptors,
            camera,
            session,
        };
        match self.call(&request).await? {
            RpcResponse::Words(ids) => Ok(ids),
            RpcResponse::Failed { kind, message } => Err(RpcError::Remote { kind, message }),
            RpcResponse::Signatures(_) => Err(RpcError::UnexpectedResponse("onFeature")),
        }
    }

    /// `onWord`: word ids -> ranked signatures.
    pub async fn on_word(
        &mut self,
        word_ids: Vec<WordId>,
        keypoints: Vec<KeyPoint>,
        camera: Option<CameraModel>,
        session: Session,
    ) -> Result<Vec<SignatureCandidate>, RpcError> {
        let request = RpcRequest::OnWord {
            word_ids,
            keypoints,
            camera,
            session,
        };
        match self.call(&request).await? {
            RpcResponse::Signatures(candidates) => Ok(candidates),
            RpcResponse::Failed { kind, message } => Err(RpcError::Remote { kind, message }),
            RpcResponse::Words(_) => Err(RpcError::UnexpectedResponse("onWord")),
        }
    }
}

/// Word resolution on a remote word service.
#[derive(Debug)]
pub struct RemoteWordResolver {
    client: RpcClient,
}

impl RemoteWordResolver {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }

    pub fn into_client(self) -> RpcClient {
        self.client
    }
}

#[async_trait]
impl WordResolver for RemoteWordResolver {
    async fn resolve_words(
        &mut self,
        sensor: &SensorData,
        session: Session,
    ) -> Result<Vec<WordId>, StageError> {
        let ids = self
            .client
            .on_feature(
                sensor.keypoints.clone(),
                sensor.descriptors.clone(),
                sensor.primary_camera().cloned(),
                session,
            )
            .await?;
        Ok(ids)
    }
}

/// Signature ranking on a remote signature service.
#[derive(Debug)]
pub struct RemoteSignatureResolver {
    client: RpcClient,
}

impl RemoteSignatureResolver {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }

    pub fn into_client(self) -> RpcClient {
        self.client
    }
}

#[async_trait]
impl SignatureResolver for RemoteSignatureResolver {
    async fn resolve_signatures(
        &mut self,
        word_ids: &[WordId],
        sensor: &SensorData,
        session: Session,
        top_k: usize,
    ) -> Result<Vec<SignatureCandidate>, StageError> {
        let mut candidates = self
            .client
            .on_word(
                word_ids.to_vec(),
                sensor.keypoints.clone(),
                sensor.primary_camera().cloned(),
                session,
            )
            .await?;
        candidates.truncate(top_k);
        Ok(candidates)
    }
}
