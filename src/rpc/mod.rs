//! Network boundary between stages.
//!
//! | Method | Service | Request | Response |
//! |--------|---------|---------|----------|
//! | `onFeature` | [`WordService`] | keypoints, descriptors, camera, session | word ids |
//! | `onWord` | [`SignatureService`] | word ids, keypoints, camera, session | ranked signatures (`<= top_k`) |
//!
//! Frames are described in [`wire`]. A server-side failure comes back as
//! [`RpcResponse::Failed`] and surfaces as [`RpcError::Remote`](crate::error::RpcError::Remote).
//! The client never retries.

pub mod client;
pub mod server;
pub mod services;
pub mod wire;

pub use client::{RemoteSignatureResolver, RemoteWordResolver, RpcClient};
pub use server::{RpcServer, RpcService};
pub use services::{SignatureService, WordService};
pub use wire::{RpcRequest, RpcResponse};
