//! Service client behaviour against a real HTTP backend.

use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use situation_monitor::client::{FetchError, ReqwestTransport, RequestOptions, ServiceClient};
use situation_monitor::config::{CircuitBreakerConfig, ServiceConfig};
use situation_monitor::resilience::CircuitState;

mod common;

fn client(base_url: String, threshold: u32) -> ServiceClient {
    let config = ServiceConfig {
        base_url: Some(base_url),
        timeout_ms: 2000,
        retries: 2,
        retry_delay_ms: 10,
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: threshold,
            reset_timeout_ms: 60_000,
            half_open_requests: 1,
        },
        ..ServiceConfig::named("local")
    };
    ServiceClient::new(
        &config,
        None,
        Duration::from_secs(5),
        Arc::new(ReqwestTransport::new().unwrap()),
    )
}

#[tokio::test]
async fn test_json_get_retries_transient_errors() {
    let calls = Arc::new(AtomicU32::new(0));
    let accepts = Arc::new(Mutex::new(Vec::new()));
    let (c, a) = (calls.clone(), accepts.clone());
    let addr = common::start_programmable_backend(move |req| {
        let n = c.fetch_add(1, Ordering::SeqCst);
        a.lock().unwrap().push(req.accept);
        async move {
            if n < 2 {
                (503, "busy".to_string())
            } else {
                (200, r#"{"indices":[{"symbol":"DJI","change":-0.4}]}"#.to_string())
            }
        }
    })
    .await;

    let client = client(format!("http://{addr}"), 3);
    let body: Value = client.get("/quotes", RequestOptions::new()).await.unwrap();

    assert_eq!(body["indices"][0]["symbol"], "DJI");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(accepts
        .lock()
        .unwrap()
        .iter()
        .all(|a| a.as_deref() == Some("application/json")));
    assert_eq!(client.breaker().state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_text_get_uses_separate_cache_key() {
    let addr = common::start_mock_backend("<rss><item>Breaking</item></rss>").await;
    let client = client(format!("http://{addr}"), 3);

    let feed = client.get_text("/feed.xml", RequestOptions::new()).await.unwrap();
    assert!(feed.contains("Breaking"));

    let keys = client.status().cache.keys;
    assert_eq!(keys, vec![format!("TEXT:http://{addr}/feed.xml")]);
}

#[tokio::test]
async fn test_stale_data_survives_outage() {
    let healthy = Arc::new(AtomicBool::new(true));
    let calls = Arc::new(AtomicU32::new(0));
    let (h, c) = (healthy.clone(), calls.clone());
    let addr = common::start_programmable_backend(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
        let up = h.load(Ordering::SeqCst);
        async move {
            if up {
                (200, "[101.5, 99.2]".to_string())
            } else {
                (500, "down".to_string())
            }
        }
    })
    .await;

    let client = client(format!("http://{addr}"), 1);
    let short = RequestOptions::new().cache_ttl(Duration::from_millis(20));

    let fresh: Vec<f64> = client.get("/prices", short).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    healthy.store(false, Ordering::SeqCst);

    let stale: Vec<f64> = client.get("/prices", short).await.unwrap();
    assert_eq!(stale, fresh);
    assert_eq!(client.breaker().state(), CircuitState::Open);
    assert_eq!(calls.load(Ordering::SeqCst), 4, "one success plus three failed attempts");

    let again: Vec<f64> = client.get("/prices", short).await.unwrap();
    assert_eq!(again, fresh);
    assert_eq!(calls.load(Ordering::SeqCst), 4, "open circuit short-circuits");

    let err = client
        .get::<Vec<f64>>("/prices", short.skip_cache())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::CircuitOpen(_)));
}

#[tokio::test]
async fn test_slow_backend_times_out_without_retry() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let addr = common::start_programmable_backend(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
        async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            (200, "late".to_string())
        }
    })
    .await;

    let client = client(format!("http://{addr}"), 3);
    let err = client
        .get_text("/slow", RequestOptions::new().timeout(Duration::from_millis(50)))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Timeout(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.breaker().failures(), 1);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_request() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let addr = common::start_programmable_backend(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            (200, r#"{"markets":12}"#.to_string())
        }
    })
    .await;

    let client = client(format!("http://{addr}"), 3);
    let (a, b, c) = tokio::join!(
        client.get_json("/events", RequestOptions::new()),
        client.get_json("/events", RequestOptions::new()),
        client.get_json("/events", RequestOptions::new()),
    );

    assert_eq!(a.unwrap()["markets"], 12);
    assert!(b.is_ok() && c.is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
