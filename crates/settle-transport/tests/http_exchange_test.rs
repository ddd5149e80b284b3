//! Integration tests for HTTP exchanges

use settle::{CompletionConfig, ErrorKind, finished};
use settle_core::{Event, Resource, Signal};
use settle_transport::{HttpExchange, HttpExchangeConfig, HttpRequest, TransportError};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client() -> reqwest::Client {
    HttpExchangeConfig::default()
        .with_timeout(Duration::from_secs(5))
        .build_client()
        .expect("Failed to build client")
}

#[tokio::test]
async fn test_exchange_completes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let request = HttpRequest::get(format!("{}/status", server.uri()));
    let exchange = HttpExchange::send(&client(), request).expect("Failed to start exchange");
    let done = finished(&exchange, CompletionConfig::default()).expect("inside a runtime");

    let response = exchange.response().await.expect("response");
    assert!(response.is_success());
    assert_eq!(response.text().unwrap(), "ok");
    assert!(done.await.is_ok());
}

#[tokio::test]
async fn test_exchange_signal_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("x-trace", "1"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let request = HttpRequest::new("POST", server.uri())
        .with_header("x-trace", "1")
        .with_text_body("payload");
    let exchange = HttpExchange::send(&client(), request).unwrap();

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    for signal in [Signal::Request, Signal::End, Signal::Complete, Signal::Close] {
        let seen = seen.clone();
        exchange.emitter().on(signal, move |event| {
            if let Event::Request(transport) = event {
                let seen = seen.clone();
                transport.on(Signal::Finish, move |_| seen.lock().push("request finish"));
            }
            seen.lock().push(event.signal().as_str());
        });
    }

    let response = exchange.response().await.unwrap();
    assert_eq!(response.status, 201);
    assert_eq!(
        *seen.lock(),
        vec!["request", "request finish", "end", "complete", "close"]
    );
}

#[tokio::test]
async fn test_abort_is_premature_close() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let exchange = HttpExchange::send(&client(), HttpRequest::get(server.uri())).unwrap();
    let done = finished(&exchange, CompletionConfig::default()).unwrap();

    assert!(exchange.abort());
    assert!(!exchange.abort());

    let err = done.await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PrematureClose);
    assert!(matches!(
        exchange.response().await,
        Err(TransportError::Aborted)
    ));
}

#[tokio::test]
async fn test_refused_exchange_is_connection_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let request = HttpRequest::get(format!("http://{}/", addr));
    let exchange = HttpExchange::send(&client(), request).unwrap();
    let done = finished(&exchange, CompletionConfig::default()).unwrap();

    let err = done.await.unwrap_err();
    assert!(err.is_connection_error());
    assert!(err.is_stream_error());
    assert_eq!(err.io_kind(), Some(io::ErrorKind::ConnectionRefused));

    let transport_err = exchange.response().await.unwrap_err();
    assert!(matches!(transport_err, TransportError::Connection(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tracking_after_exchange_closed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("late"))
        .mount(&server)
        .await;

    let exchange = HttpExchange::send(&client(), HttpRequest::get(server.uri())).unwrap();
    while !exchange.state().is_closed() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let outcome = finished(&exchange, CompletionConfig::default())
        .unwrap()
        .await;
    assert!(outcome.is_ok());
    assert_eq!(exchange.response().await.unwrap().text().unwrap(), "late");
}
