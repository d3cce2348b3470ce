//! RPC services on loopback, driven directly and as pipeline resolvers.

use std::net::SocketAddr;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use visword::pipeline::{FeatureEvent, Outcome, SensorData, Session};
use visword::rpc::{
    RemoteSignatureResolver, RemoteWordResolver, RpcClient, RpcServer, RpcService,
    SignatureService, WordService,
};
use visword::{
    Descriptors, FailureKind, Pipeline, PipelineConfig, RpcConfig, RpcError, SignatureIndex,
    VisualWordIndex, Word,
};

struct Running {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<(), RpcError>>,
}

impl Running {
    async fn stop(self) -> anyhow::Result<()> {
        let _ = self.stop.send(());
        self.task.await??;
        Ok(())
    }
}

async fn start<S: RpcService>(service: S) -> anyhow::Result<Running> {
    let server = RpcServer::bind("127.0.0.1:0", service, RpcConfig::default()).await?;
    let addr = server.local_addr()?;
    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(server.serve(async move {
        let _ = stopped.await;
    }));
    Ok(Running { addr, stop, task })
}

fn word_service() -> WordService {
    let mut index = VisualWordIndex::default();
    index.add_word(Word::new(1, vec![0u8; 32])).unwrap();
    index.add_word(Word::new(2, vec![255u8; 32])).unwrap();
    index.update().unwrap();
    WordService::new(index)
}

fn signature_service(top_k: usize) -> SignatureService {
    let mut index = SignatureIndex::default();
    index.put_signatures([(10, vec![1]), (20, vec![1, 2]), (30, vec![2])]);
    SignatureService::new(index, top_k)
}

fn binary(rows: &[Vec<u8>]) -> Descriptors {
    Descriptors::from_u8_rows(rows).unwrap()
}

#[tokio::test]
async fn test_on_feature_and_on_word() -> anyhow::Result<()> {
    let words = start(word_service()).await?;
    let signatures = start(signature_service(5)).await?;

    let mut client = RpcClient::connect(words.addr, RpcConfig::default()).await?;
    let ids = client
        .on_feature(Vec::new(), binary(&[vec![3u8; 32], vec![250u8; 32]]), None, Session(1))
        .await?;
    assert_eq!(ids, vec![1, 2]);

    let mut client = RpcClient::connect(signatures.addr, RpcConfig::default()).await?;
    let candidates = client.on_word(vec![1, 2], Vec::new(), None, Session(1)).await?;
    assert_eq!(candidates[0].id, 20);
    assert_eq!(candidates.len(), 3);

    words.stop().await?;
    signatures.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_server_failure_surfaces_as_remote_error() -> anyhow::Result<()> {
    let words = start(word_service()).await?;
    let mut client = RpcClient::connect(words.addr, RpcConfig::default()).await?;

    let err = client
        .on_feature(Vec::new(), binary(&[vec![1u8; 8]]), None, Session(1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RpcError::Remote {
            kind: FailureKind::ConfigMismatch,
            ..
        }
    ));

    // Same client keeps working.
    let ids = client
        .on_feature(Vec::new(), binary(&[vec![0u8; 32]]), None, Session(2))
        .await?;
    assert_eq!(ids, vec![1]);

    let err = client.on_word(vec![1], Vec::new(), None, Session(3)).await.unwrap_err();
    assert!(matches!(err, RpcError::Remote { .. }));

    words.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_pipeline_over_remote_resolvers() -> anyhow::Result<()> {
    let words = start(word_service()).await?;
    let signatures = start(signature_service(5)).await?;

    let word_resolver =
        RemoteWordResolver::new(RpcClient::connect(words.addr, RpcConfig::default()).await?);
    let signature_resolver =
        RemoteSignatureResolver::new(RpcClient::connect(signatures.addr, RpcConfig::default()).await?);

    let config = PipelineConfig {
        queue_capacity: 4,
        top_k: 1,
    };
    let mut pipeline = Pipeline::spawn(word_resolver, signature_resolver, &config);

    let sensor = SensorData::new(Vec::new(), binary(&[vec![0u8; 32], vec![255u8; 32]]));
    pipeline.submit(FeatureEvent::new(sensor, Session(42))).await?;
    let event = pipeline.next_result().await.and_then(Outcome::resolved).unwrap();
    assert_eq!(event.session, Session(42));
    assert_eq!(event.word_ids, vec![1, 2]);
    assert_eq!(event.candidates.len(), 1);
    assert_eq!(event.candidates[0].id, 20);

    // Remote mismatch becomes a failed request, not a dead stage.
    let sensor = SensorData::new(Vec::new(), binary(&[vec![0u8; 4]]));
    pipeline.submit(FeatureEvent::new(sensor, Session(43))).await?;
    let outcome = pipeline.next_result().await.unwrap();
    assert_eq!(outcome.failure().unwrap().reason.kind, FailureKind::ConfigMismatch);

    pipeline.shutdown().await?;
    words.stop().await?;
    signatures.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_unreachable_server_fails_the_request() -> anyhow::Result<()> {
    let words = start(word_service()).await?;
    let addr = words.addr;
    let client = RpcClient::connect(addr, RpcConfig::default()).await?;
    words.stop().await?;

    let mut pipeline = Pipeline::spawn(
        RemoteWordResolver::new(client),
        signature_service_resolver(),
        &PipelineConfig::default(),
    );
    let sensor = SensorData::new(Vec::new(), binary(&[vec![0u8; 32]]));
    pipeline.submit(FeatureEvent::new(sensor, Session(1))).await?;
    let outcome = pipeline.next_result().await.unwrap();
    assert_eq!(
        outcome.failure().unwrap().reason.kind,
        FailureKind::RemoteCallFailure
    );
    pipeline.shutdown().await?;
    Ok(())
}

fn signature_service_resolver() -> SignatureIndex {
    let mut index = SignatureIndex::default();
    index.put_signatures([(10, vec![1])]);
    index
}
