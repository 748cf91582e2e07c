use bytes::Bytes;
use pretty_assertions::assert_eq;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use skylark_client::{
    params, ApiEnvironment, ApiError, AuthenticationMethod, BaseUrlKind, BodyContentType,
    CallbackQueue, DataTaskExt, FixedClock, FixedNonce, MultipartPart,
    RequestDescription, RequestError, Response, ResponseTaskExt, Session, StreamingTaskExt,
    TaskState,
};
use skylark_test_utils::{init_test_logging, parse_multipart, Collector, TestHttpServer};

fn oauth() -> AuthenticationMethod {
    AuthenticationMethod::oauth1("ck", "cs", "tk", "ts")
}

fn session_for(server: &TestHttpServer, auth: AuthenticationMethod) -> Session {
    init_test_logging();
    Session::builder(auth, ApiEnvironment::new(server.url(), server.url()))
        .clock(Arc::new(FixedClock(1_000_000_000)))
        .nonce_source(Arc::new(FixedNonce::new("nonce1")))
        .build()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_get_sends_ordered_query_without_body() {
    let server = TestHttpServer::start().await;
    server
        .json("GET", "/1.1/search/tweets.json", 200, &serde_json::json!({"statuses": []}))
        .await;
    let session = session_for(&server, oauth());
    let queue = CallbackQueue::new("get-test");
    let mut collector = Collector::new();
    let sink = collector.sink();

    let request = RequestDescription::get("/1.1/search/tweets.json")
        .parameters(params! { "q" => "swift", "count" => "10" });
    session.send(&request).on_response_json(&queue, move |r| sink(r.into_result().unwrap()));

    let json = collector.next().await.expect("response callback");
    assert_eq!(json, serde_json::json!({"statuses": []}));

    let received = server.only_request().await;
    assert_eq!(received.url.query(), Some("q=swift&count=10"));
    assert!(received.body.is_empty());
    assert!(received.headers.get("content-type").is_none());
    let authorization = received.headers.get("authorization").unwrap().to_str().unwrap();
    assert!(authorization.starts_with("OAuth "));
    assert!(authorization.contains("oauth_nonce=\"nonce1\""));
    assert!(authorization.contains("oauth_timestamp=\"1000000000\""));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_post_form_body_uses_percent_twenty() {
    let server = TestHttpServer::start().await;
    server.json("POST", "/1.1/statuses/update.json", 200, &serde_json::json!({"id": 1})).await;
    let session = session_for(&server, oauth());
    let mut collector = Collector::new();
    let sink = collector.sink();

    let request = RequestDescription::post("/1.1/statuses/update.json").param("status", "hello world");
    session
        .send(&request)
        .on_response(&CallbackQueue::main(), move |r| sink(r.is_success()));
    assert!(collector.next().await.unwrap());

    let received = server.only_request().await;
    assert_eq!(received.body, b"status=hello%20world");
    assert_eq!(
        received.headers.get("content-type").unwrap().to_str().unwrap(),
        "application/x-www-form-urlencoded"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unauthorized_is_a_failure_with_body() {
    let server = TestHttpServer::start().await;
    server
        .raw("GET", "/1.1/account/verify_credentials.json", 401, r#"{"errors":[{"code":32}]}"#)
        .await;
    let session = session_for(&server, AuthenticationMethod::bearer("expired"));
    let mut collector = Collector::new();
    let sink = collector.sink();

    session
        .send(&RequestDescription::get("/1.1/account/verify_credentials.json"))
        .on_response(&CallbackQueue::main(), move |r: Response<Bytes>| sink(r));

    let response = collector.next().await.unwrap();
    assert_eq!(response.meta().map(|m| m.status), Some(401));
    match response.error() {
        Some(ApiError::Http { status, body }) => {
            assert_eq!(*status, 401);
            assert_eq!(body, &Bytes::from_static(br#"{"errors":[{"code":32}]}"#));
        }
        other => panic!("expected an HTTP failure, got {other:?}"),
    }
    let authorization = server.only_request().await;
    assert_eq!(
        authorization.headers.get("authorization").unwrap().to_str().unwrap(),
        "Bearer expired"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_construction_failure_never_reaches_the_network() {
    let server = TestHttpServer::start().await;
    let session = session_for(&server, oauth());
    let mut collector = Collector::new();
    let sink = collector.sink();

    let task = session.send(&RequestDescription::get(":99999/1.1/test.json"));
    assert_eq!(session.in_flight(), 0);
    task.on_response(&CallbackQueue::main(), move |r| sink(r.error().cloned()));

    let error = collector.next().await.unwrap().unwrap();
    assert!(matches!(error.request_error(), Some(RequestError::InvalidUrl(_))));
    collector.assert_quiet(Duration::from_millis(100)).await;
    assert!(server.received_requests().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_scalar_in_multipart_body_is_invalid_parameter() {
    let server = TestHttpServer::start().await;
    let session = session_for(&server, oauth());

    let request = RequestDescription::post("/1.1/media/upload.json")
        .content_type(BodyContentType::Multipart)
        .param("media_category", "tweet_image");
    let response = session.send(&request).response().await.unwrap();

    match response.error().and_then(ApiError::request_error) {
        Some(RequestError::InvalidParameter { parameter, .. }) => assert_eq!(parameter, "media_category"),
        other => panic!("expected InvalidParameter, got {other:?}"),
    }
    assert!(server.received_requests().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_multipart_upload_reaches_upload_base() {
    let server = TestHttpServer::start().await;
    server.json("POST", "/1.1/media/upload.json", 200, &serde_json::json!({"media_id": 7})).await;
    let session = session_for(&server, oauth());

    let request = RequestDescription::post("/1.1/media/upload.json")
        .base_url(BaseUrlKind::Upload)
        .content_type(BodyContentType::Multipart)
        .param("media_category", MultipartPart::value("media_category", "tweet_image"))
        .param("media", MultipartPart::data("media", vec![0u8, 159, 146, 150], "a.bin", "application/octet-stream"));
    let response = session.send(&request).response().await.unwrap();
    assert!(response.is_success());

    let received = server.only_request().await;
    let content_type = received.headers.get("content-type").unwrap().to_str().unwrap().to_string();
    assert_eq!(content_type, "multipart/form-data; boundary=skylark-boundary-nonce1");
    assert_eq!(
        received.headers.get("content-length").unwrap().to_str().unwrap(),
        received.body.len().to_string()
    );

    let parts = parse_multipart(received.body.clone(), "skylark-boundary-nonce1").await.unwrap();
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].name, "media_category");
    assert_eq!(parts[0].body, b"tweet_image");
    assert_eq!(parts[1].filename.as_deref(), Some("a.bin"));
    assert_eq!(parts[1].body, vec![0u8, 159, 146, 150]);
}

#[derive(Debug, Deserialize, PartialEq)]
struct User {
    id: u64,
    screen_name: String,
}

#[tokio::test(flavor = "multi_thread")]
async fn test_decodable_task_delivers_typed_value() {
    let server = TestHttpServer::start().await;
    server
        .json("GET", "/1.1/users/show.json", 200, &serde_json::json!({"id": 12, "screen_name": "jack"}))
        .await;
    let session = session_for(&server, oauth());

    let request = RequestDescription::get("/1.1/users/show.json").param("screen_name", "jack");
    let user = session
        .send(&request)
        .decodable::<User>()
        .response()
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert_eq!(
        user,
        User {
            id: 12,
            screen_name: "jack".into()
        }
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_removes_task_and_suppresses_callbacks() {
    let server = TestHttpServer::start().await;
    server.slow("GET", "/1.1/slow.json", Duration::from_secs(2)).await;
    let session = session_for(&server, oauth());
    let mut collector = Collector::<()>::new();
    let sink = collector.sink();

    let task = session.send(&RequestDescription::get("/1.1/slow.json"));
    task.on_response(&CallbackQueue::main(), move |_| sink(()));
    assert_eq!(session.in_flight(), 1);

    task.cancel();
    assert_eq!(task.state(), TaskState::Cancelled);
    assert_eq!(session.in_flight(), 0);
    collector.assert_quiet(Duration::from_millis(300)).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_completed_task_leaves_registry() {
    let server = TestHttpServer::start().await;
    server.json("GET", "/1.1/ok.json", 200, &serde_json::json!({})).await;
    let session = session_for(&server, oauth());

    let response = session.send(&RequestDescription::get("/1.1/ok.json")).response().await.unwrap();
    assert!(response.is_success());
    assert_eq!(session.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stream_delivers_lines_then_completes() {
    let server = TestHttpServer::start().await;
    server
        .raw("GET", "/1.1/statuses/sample.json", 200, "{\"id\":1}\r\n\r\n{\"id\":2}\r\n{\"id\":3}")
        .await;
    let session = session_for(&server, oauth());
    let queue = CallbackQueue::new("stream-test");
    let mut chunks = Collector::new();
    let mut done = Collector::new();
    let (chunk_sink, done_sink) = (chunks.sink(), done.sink());

    let task = session.send_stream(&RequestDescription::get("/1.1/statuses/sample.json"));
    task.on_chunk(&queue, move |r| chunk_sink(r.into_result().unwrap()))
        .on_complete(&queue, move |e| done_sink(e.is_none()));

    assert_eq!(
        chunks.take(3).await,
        vec![
            Bytes::from_static(b"{\"id\":1}"),
            Bytes::from_static(b"{\"id\":2}"),
            Bytes::from_static(b"{\"id\":3}"),
        ]
    );
    assert!(done.next().await.unwrap());
    chunks.assert_quiet(Duration::from_millis(100)).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stream_error_status_is_classified_per_chunk() {
    let server = TestHttpServer::start().await;
    server.raw("GET", "/1.1/statuses/filter.json", 420, "Enhance Your Calm").await;
    let session = session_for(&server, oauth());
    let mut chunks = Collector::new();
    let mut done = Collector::new();
    let (chunk_sink, done_sink) = (chunks.sink(), done.sink());

    let task = session.send_stream(&RequestDescription::get("/1.1/statuses/filter.json"));
    task.on_chunk(&CallbackQueue::main(), move |r| sink_status(&chunk_sink, r))
        .on_complete(&CallbackQueue::main(), move |e| done_sink(e.and_then(|e| e.status())));

    assert_eq!(chunks.next().await.unwrap(), Some(420));
    assert_eq!(done.next().await.unwrap(), Some(420));
}

fn sink_status(sink: &(impl Fn(Option<u16>) + Send), response: Response<Bytes>) {
    sink(response.error().and_then(ApiError::status));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_build_request_does_not_send() {
    let server = TestHttpServer::start().await;
    let session = session_for(&server, oauth());

    let built = session
        .build_request(&RequestDescription::delete("/1.1/statuses/destroy/1.json").param("trim_user", true))
        .unwrap();
    assert_eq!(built.url.query(), Some("trim_user=true"));
    assert!(built.body.is_none());
    assert!(server.received_requests().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dropping_session_cancels_in_flight_tasks() {
    let server = TestHttpServer::start().await;
    server.slow("GET", "/1.1/slow.json", Duration::from_millis(500)).await;
    let session = session_for(&server, oauth());
    let mut collector = Collector::<()>::new();
    let sink = collector.sink();

    let task = session.send(&RequestDescription::get("/1.1/slow.json"));
    task.on_response(&CallbackQueue::main(), move |_| sink(()));
    assert_eq!(task.state(), TaskState::Running);

    drop(session);
    assert_eq!(task.state(), TaskState::Cancelled);
    collector.assert_quiet(Duration::from_millis(800)).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_cancels_streams_without_completion() {
    let server = TestHttpServer::start().await;
    server.slow("GET", "/1.1/statuses/sample.json", Duration::from_millis(500)).await;
    let session = session_for(&server, oauth());
    let mut chunks = Collector::<()>::new();
    let mut done = Collector::<()>::new();
    let (chunk_sink, done_sink) = (chunks.sink(), done.sink());

    let task = session.send_stream(&RequestDescription::get("/1.1/statuses/sample.json"));
    task.on_chunk(&CallbackQueue::main(), move |_| chunk_sink(()))
        .on_complete(&CallbackQueue::main(), move |_| done_sink(()));
    assert_eq!(session.in_flight(), 1);

    session.shutdown();
    assert_eq!(task.state(), TaskState::Cancelled);
    chunks.assert_quiet(Duration::from_millis(800)).await;
    done.assert_quiet(Duration::from_millis(50)).await;
}
