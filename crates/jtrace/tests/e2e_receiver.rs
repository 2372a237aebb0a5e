use std::sync::Arc;
use std::time::Duration;

use jtrace_core::model::SourceFormat;
use jtrace_core::{ConsumerError, TraceConsumer};
use jtrace_ingest::jaeger::api_v2::collector_service_client::CollectorServiceClient;
use jtrace_ingest::{JaegerReceiver, ReceiverConfig};
use testkit::{AbandonedConsumer, FailingConsumer, PendingConsumer, SinkConsumer};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

fn local_config(consumer_timeout: Duration) -> ReceiverConfig {
    ReceiverConfig {
        http_addr: Some("127.0.0.1:0".parse().unwrap()),
        grpc_addr: Some("127.0.0.1:0".parse().unwrap()),
        max_request_bytes: 1 << 20,
        consumer_timeout,
    }
}

async fn start(consumer: Arc<dyn TraceConsumer>) -> JaegerReceiver {
    start_with_timeout(consumer, Duration::from_secs(5)).await
}

async fn start_with_timeout(
    consumer: Arc<dyn TraceConsumer>,
    consumer_timeout: Duration,
) -> JaegerReceiver {
    JaegerReceiver::start(local_config(consumer_timeout), consumer)
        .await
        .unwrap()
}

async fn post_thrift(receiver: &JaegerReceiver, body: Vec<u8>) -> reqwest::StatusCode {
    let addr = receiver.http_addr().unwrap();
    reqwest::Client::new()
        .post(format!("http://{addr}/api/traces"))
        .header("content-type", "application/x-thrift")
        .body(body)
        .send()
        .await
        .unwrap()
        .status()
}

async fn grpc_client(
    receiver: &JaegerReceiver,
) -> CollectorServiceClient<tonic::transport::Channel> {
    let addr = receiver.grpc_addr().unwrap();
    CollectorServiceClient::connect(format!("http://{addr}"))
        .await
        .unwrap()
}

#[tokio::test]
async fn http_thrift_scenario_reaches_consumer() {
    let sink = Arc::new(SinkConsumer::new());
    let receiver = start(sink.clone()).await;

    let status = post_thrift(&receiver, testkit::thrift_body()).await;
    assert_eq!(status, reqwest::StatusCode::ACCEPTED);

    let batches = sink.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(
        batches[0],
        testkit::expected_trace_data(SourceFormat::JaegerThrift)
    );

    receiver.stop().await.unwrap();
}

#[tokio::test]
async fn grpc_scenario_reaches_consumer() {
    let sink = Arc::new(SinkConsumer::new());
    let receiver = start(sink.clone()).await;

    grpc_client(&receiver)
        .await
        .post_spans(tonic::Request::new(testkit::grpc_request()))
        .await
        .unwrap();

    let batches = sink.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(
        batches[0],
        testkit::expected_trace_data(SourceFormat::JaegerProto)
    );

    receiver.stop().await.unwrap();
}

#[tokio::test]
async fn grpc_short_trace_id_span_is_dropped() {
    let sink = Arc::new(SinkConsumer::new());
    let receiver = start(sink.clone()).await;

    let mut request = testkit::grpc_request();
    if let Some(batch) = request.batch.as_mut() {
        batch.spans[1].trace_id.truncate(15);
    }
    grpc_client(&receiver)
        .await
        .post_spans(tonic::Request::new(request))
        .await
        .unwrap();

    let batches = sink.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].spans.len(), 1);
    assert_eq!(batches[0].spans[0].name, "DBSearch");

    receiver.stop().await.unwrap();
}

#[tokio::test]
async fn consumer_unavailable_surfaces_on_both_paths() {
    let receiver = start(Arc::new(FailingConsumer(ConsumerError::Unavailable(
        "downstream offline".into(),
    ))))
    .await;

    let status = post_thrift(&receiver, testkit::thrift_body()).await;
    assert_eq!(status, reqwest::StatusCode::SERVICE_UNAVAILABLE);

    let err = grpc_client(&receiver)
        .await
        .post_spans(tonic::Request::new(testkit::grpc_request()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), tonic::Code::Unavailable);

    receiver.stop().await.unwrap();
}

#[tokio::test]
async fn missing_process_is_refused_on_grpc() {
    let sink = Arc::new(SinkConsumer::new());
    let receiver = start(sink.clone()).await;

    let mut request = testkit::grpc_request();
    if let Some(batch) = request.batch.as_mut() {
        batch.process = None;
    }
    let err = grpc_client(&receiver)
        .await
        .post_spans(tonic::Request::new(request))
        .await
        .unwrap_err();
    assert_eq!(err.code(), tonic::Code::InvalidArgument);
    assert!(sink.batches().is_empty());

    receiver.stop().await.unwrap();
}

#[tokio::test]
async fn slow_consumer_hits_deadline_on_both_paths() {
    let receiver =
        start_with_timeout(Arc::new(PendingConsumer), Duration::from_millis(100)).await;

    let status = post_thrift(&receiver, testkit::thrift_body()).await;
    assert_eq!(status, reqwest::StatusCode::GATEWAY_TIMEOUT);

    let err = grpc_client(&receiver)
        .await
        .post_spans(tonic::Request::new(testkit::grpc_request()))
        .await
        .unwrap_err();
    assert_eq!(err.code(), tonic::Code::DeadlineExceeded);

    receiver.stop().await.unwrap();
}

#[tokio::test]
async fn http_deadline_drops_consumer_call() {
    let consumer = Arc::new(AbandonedConsumer::new());
    let receiver = start_with_timeout(consumer.clone(), Duration::from_millis(100)).await;

    let status = post_thrift(&receiver, testkit::thrift_body()).await;
    assert_eq!(status, reqwest::StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(consumer.started(), 1);
    assert_eq!(consumer.dropped(), 1);

    receiver.stop().await.unwrap();
}

#[tokio::test]
async fn http_client_disconnect_drops_consumer_call() {
    let consumer = Arc::new(AbandonedConsumer::new());
    let receiver = start_with_timeout(consumer.clone(), Duration::from_secs(30)).await;
    let addr = receiver.http_addr().unwrap();

    let body = testkit::thrift_body();
    let head = format!(
        "POST /api/traces HTTP/1.1\r\nhost: {addr}\r\n\
         content-type: application/x-thrift\r\ncontent-length: {}\r\n\r\n",
        body.len()
    );
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(head.as_bytes()).await.unwrap();
    stream.write_all(&body).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), consumer.wait_started())
        .await
        .expect("consumer called");
    drop(stream);

    tokio::time::timeout(Duration::from_secs(5), consumer.wait_dropped())
        .await
        .expect("consumer call dropped after disconnect");
    assert_eq!(consumer.started(), 1);

    receiver.stop().await.unwrap();
}

#[tokio::test]
async fn grpc_client_deadline_drops_consumer_call() {
    let consumer = Arc::new(AbandonedConsumer::new());
    let receiver = start_with_timeout(consumer.clone(), Duration::from_secs(30)).await;

    let mut request = tonic::Request::new(testkit::grpc_request());
    request.set_timeout(Duration::from_millis(200));
    let err = grpc_client(&receiver)
        .await
        .post_spans(request)
        .await
        .unwrap_err();
    assert!(
        matches!(
            err.code(),
            tonic::Code::DeadlineExceeded | tonic::Code::Cancelled
        ),
        "unexpected status {err:?}"
    );

    tokio::time::timeout(Duration::from_secs(5), consumer.wait_dropped())
        .await
        .expect("consumer call dropped after deadline");
    assert_eq!(consumer.started(), 1);

    receiver.stop().await.unwrap();
}

#[tokio::test]
async fn stop_releases_listeners() {
    let receiver = start(Arc::new(SinkConsumer::new())).await;
    let http_addr = receiver.http_addr().unwrap();
    receiver.stop().await.unwrap();

    let result = reqwest::Client::new()
        .post(format!("http://{http_addr}/api/traces"))
        .body(testkit::thrift_body())
        .timeout(Duration::from_secs(2))
        .send()
        .await;
    assert!(result.is_err());
}
