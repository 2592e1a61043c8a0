//! End-to-end tests of the `/stream` endpoint against the real router,
//! driven by the scripted sim engine.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use tidegate_core::engine::sim::{SimEngine, SimTorrent};
use tidegate_core::engine::EngineOptions;
use tidegate_core::{GatewayConfig, Session};
use tidegate_web::{Gateway, router};
use tower::ServiceExt;

fn engine_options(config: &GatewayConfig) -> EngineOptions {
    EngineOptions {
        storage_dir: config
            .engine
            .storage_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir),
        peer_port: config.peer_port(),
        disable_ipv6: config.engine.disable_ipv6,
        seed: config.engine.seed,
    }
}

fn gateway_with(scripts: Vec<SimTorrent>) -> (Router, Arc<Session>) {
    let config = GatewayConfig::for_testing();
    let engine = SimEngine::new(engine_options(&config), scripts);
    let session = Session::with_engine(config, engine).unwrap();
    (router(session.clone()), session)
}

async fn get(app: &Router, uri: &str) -> axum::response::Response {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn test_episodes_stream_in_lexicographic_order() {
    let script = SimTorrent::new(1, "show")
        .with_file("b.mkv", b"BBBB")
        .with_file("a.mp4", b"AAAA");
    let magnet = script.magnet();
    let hash = script.info_hash;
    let (app, session) = gateway_with(vec![script]);
    session.ingest(&magnet).await.unwrap();

    let first = get(&app, &format!("/stream?hash={hash}&ep=1")).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(
        first.headers()[header::CONTENT_TYPE].to_str().unwrap(),
        "video/mp4"
    );
    assert_eq!(body_bytes(first).await, b"AAAA");

    let second = get(&app, &format!("/stream?hash={hash}&ep=2")).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(body_bytes(second).await, b"BBBB");
}

#[tokio::test]
async fn test_malformed_episode_is_bad_request() {
    let script = SimTorrent::new(2, "one").with_file("a.mp4", b"AAAA");
    let magnet = script.magnet();
    let hash = script.info_hash;
    let (app, session) = gateway_with(vec![script]);
    session.ingest(&magnet).await.unwrap();

    for uri in [
        format!("/stream?hash={hash}&ep=0"),
        format!("/stream?hash={hash}&ep=-1"),
        format!("/stream?hash={hash}&ep=two"),
        format!("/stream?hash={hash}"),
    ] {
        let response = get(&app, &uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "uri: {uri}");
    }
}

#[tokio::test]
async fn test_missing_or_malformed_hash_is_bad_request() {
    let (app, _session) = gateway_with(vec![]);

    for uri in [
        "/stream?ep=1",
        "/stream?hash=&ep=1",
        "/stream?hash=%20%0A&ep=1",
        "/stream?hash=nothex&ep=1",
    ] {
        let response = get(&app, uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "uri: {uri}");
    }
}

#[tokio::test]
async fn test_unknown_hash_is_not_found() {
    let (app, _session) = gateway_with(vec![]);

    let response = get(
        &app,
        "/stream?hash=ffffffffffffffffffffffffffffffffffffffff&ep=1",
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_hash_lookup_ignores_hex_case_and_whitespace() {
    let script = SimTorrent::new(0xab, "cased").with_file("a.mp4", b"AAAA");
    let magnet = script.magnet();
    let (app, session) = gateway_with(vec![script]);
    session.ingest(&magnet).await.unwrap();

    let upper = "AB".repeat(20);
    let response = get(&app, &format!("/stream?hash=%0A{upper}%20&ep=1")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_out_of_range_episode_is_not_found() {
    let script = SimTorrent::new(3, "short").with_file("a.mp4", b"AAAA");
    let magnet = script.magnet();
    let hash = script.info_hash;
    let (app, session) = gateway_with(vec![script]);
    session.ingest(&magnet).await.unwrap();

    let response = get(&app, &format!("/stream?hash={hash}&ep=2")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_disallowed_extension_is_unsupported_media_type() {
    let script = SimTorrent::new(4, "mixed")
        .with_file("a.mp4", b"AAAA")
        .with_file("notes.txt", b"text");
    let magnet = script.magnet();
    let hash = script.info_hash;
    let (app, session) = gateway_with(vec![script]);
    session.ingest(&magnet).await.unwrap();

    let response = get(&app, &format!("/stream?hash={hash}&ep=2")).await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_unresolved_metadata_answers_service_unavailable() {
    let script = SimTorrent::new(5, "pending").held();
    let magnet = script.magnet();
    let hash = script.info_hash;
    let (app, session) = gateway_with(vec![script]);

    // Registration succeeds; the metadata wait times out under the short
    // test bound but the handle stays registered.
    assert!(session.ingest(&magnet).await.is_err());

    let response = get(&app, &format!("/stream?hash={hash}&ep=1")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
}

#[tokio::test]
async fn test_range_request_serves_partial_content() {
    let script = SimTorrent::new(6, "media").with_file("clip.mp4", b"0123456789");
    let magnet = script.magnet();
    let hash = script.info_hash;
    let (app, session) = gateway_with(vec![script]);
    session.ingest(&magnet).await.unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/stream?hash={hash}&ep=1"))
                .header(header::RANGE, "bytes=2-5")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers()[header::CONTENT_RANGE].to_str().unwrap(),
        "bytes 2-5/10"
    );
    assert_eq!(
        response.headers()[header::CONTENT_LENGTH].to_str().unwrap(),
        "4"
    );
    assert_eq!(body_bytes(response).await, b"2345");
}

#[tokio::test]
async fn test_suffix_range_serves_file_tail() {
    let script = SimTorrent::new(7, "media").with_file("clip.mp4", b"0123456789");
    let magnet = script.magnet();
    let hash = script.info_hash;
    let (app, session) = gateway_with(vec![script]);
    session.ingest(&magnet).await.unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/stream?hash={hash}&ep=1"))
                .header(header::RANGE, "bytes=-3")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers()[header::CONTENT_RANGE].to_str().unwrap(),
        "bytes 7-9/10"
    );
    assert_eq!(body_bytes(response).await, b"789");
}

#[tokio::test]
async fn test_range_past_end_is_not_satisfiable() {
    let script = SimTorrent::new(8, "media").with_file("clip.mp4", b"0123456789");
    let magnet = script.magnet();
    let hash = script.info_hash;
    let (app, session) = gateway_with(vec![script]);
    session.ingest(&magnet).await.unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/stream?hash={hash}&ep=1"))
                .header(header::RANGE, "bytes=100-")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(
        response.headers()[header::CONTENT_RANGE].to_str().unwrap(),
        "bytes */10"
    );
}

#[tokio::test]
async fn test_conditional_get_honors_if_modified_since() {
    let script = SimTorrent::new(9, "cached").with_file("clip.mp4", b"AAAA");
    let magnet = script.magnet();
    let hash = script.info_hash;
    let (app, session) = gateway_with(vec![script]);
    session.ingest(&magnet).await.unwrap();

    // The torrent's timestamp is its registration time, so any later date
    // makes the response a 304.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/stream?hash={hash}&ep=1"))
                .header(header::IF_MODIFIED_SINCE, "Fri, 01 Jan 2100 00:00:00 GMT")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_concurrent_streams_of_different_torrents() {
    let first = SimTorrent::new(10, "alpha").with_file("a.mp4", b"alpha-bytes");
    let second = SimTorrent::new(11, "beta").with_file("b.mp4", b"beta-bytes");
    let (first_magnet, first_hash) = (first.magnet(), first.info_hash);
    let (second_magnet, second_hash) = (second.magnet(), second.info_hash);
    let (app, session) = gateway_with(vec![first, second]);
    session.ingest(&first_magnet).await.unwrap();
    session.ingest(&second_magnet).await.unwrap();

    let first_uri = format!("/stream?hash={first_hash}&ep=1");
    let second_uri = format!("/stream?hash={second_hash}&ep=1");
    let (alpha, beta) = tokio::join!(get(&app, &first_uri), get(&app, &second_uri));

    assert_eq!(alpha.status(), StatusCode::OK);
    assert_eq!(beta.status(), StatusCode::OK);
    assert_eq!(body_bytes(alpha).await, b"alpha-bytes");
    assert_eq!(body_bytes(beta).await, b"beta-bytes");
}

#[tokio::test]
async fn test_gateway_lifecycle_serves_and_closes() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let script = SimTorrent::new(12, "live").with_file("a.mp4", b"LIVE");
    let magnet = script.magnet();
    let hash = script.info_hash;

    let mut config = GatewayConfig::for_testing();
    // Bind IPv4 so the raw client below can always reach 127.0.0.1.
    config.engine.disable_ipv6 = true;
    let engine = SimEngine::new(engine_options(&config), vec![script]);
    let session = Session::with_engine(config, engine).unwrap();
    session.ingest(&magnet).await.unwrap();

    let gateway = Gateway::start(session).await.unwrap();
    let port = gateway.port();
    assert_ne!(port, 0);

    let mut socket = tokio::net::TcpStream::connect(("127.0.0.1", port))
        .await
        .unwrap();
    socket
        .write_all(
            format!("GET /stream?hash={hash}&ep=1 HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n")
                .as_bytes(),
        )
        .await
        .unwrap();
    let mut response = Vec::new();
    socket.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8_lossy(&response);
    assert!(response.starts_with("HTTP/1.1 200"), "got: {response}");
    assert!(response.ends_with("LIVE"), "got: {response}");

    gateway.close().await.unwrap();
    assert!(
        tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .is_err()
    );
}
