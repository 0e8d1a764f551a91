// Integration tests for discovery, sensor reads and metric delivery using wiremock.

use std::net::TcpListener;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use hue_influx_bridge::client::{build_client_with_timeout, ClientError};
use hue_influx_bridge::{
    Bridge, BridgeDiscovery, DiscoveryError, ForwardError, MetricForwarder, ReaderError,
    ResourceScope, RetryPolicy, Scheduler, SchedulerState, SensorKind, SensorReader, StatusCheck,
};

// ── Helpers ─────────────────────────────────────────────────────────

const API_KEY: &str = "testkey";

fn http() -> reqwest::Client {
    build_client_with_timeout(Duration::from_secs(5)).unwrap()
}

fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries: Some(max_retries),
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        max_elapsed: Duration::from_secs(10),
    }
}

fn bridge_for(server: &MockServer) -> Bridge {
    Bridge::new("001788fffe100491", server.address().to_string())
}

/// Address on loopback with nothing listening.
fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}/write?db=hue")
}

fn sensors_json() -> serde_json::Value {
    json!({
        "1": {"name": "Daylight", "type": "Daylight", "config": {"on": true}, "state": {"daylight": null}},
        "5": {
            "name": "Kitchen Sensor", "type": "ZLLTemperature",
            "config": {"battery": 87}, "state": {"temperature": 2153, "lastupdated": "2021-01-12T10:15:02"}
        },
        "6": {
            "name": "Hall Light", "type": "ZLLLightLevel",
            "config": {"battery": 90}, "state": {"lightlevel": 15000, "lastupdated": "2021-01-12T10:14:40"}
        },
        "7": {"name": "Broken", "type": "ZLLLightLevel", "config": {"battery": 90}, "state": {"lightlevel": null}}
    })
}

// ── Discovery tests ─────────────────────────────────────────────────

#[tokio::test]
async fn test_discover_bridges() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "001788fffe100491", "internalipaddress": "192.168.2.23"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let discovery = BridgeDiscovery::new(http(), format!("{}/", server.uri()), fast_policy(3));
    let bridges = discovery.discover().await.unwrap();

    assert_eq!(bridges, vec![Bridge::new("001788fffe100491", "192.168.2.23")]);
}

#[tokio::test]
async fn test_discovery_retries_server_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let discovery = BridgeDiscovery::new(http(), server.uri(), fast_policy(3));
    let bridges = discovery.discover().await.unwrap();
    assert!(bridges.is_empty());
}

#[tokio::test]
async fn test_discovery_malformed_body_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let discovery = BridgeDiscovery::new(http(), server.uri(), fast_policy(3));
    let err = discovery.discover().await.unwrap_err();

    assert!(
        matches!(err, DiscoveryError::Malformed(_)),
        "expected Malformed, got: {err:?}"
    );
}

#[tokio::test]
async fn test_discovery_unreachable_exhausts_retries() {
    let discovery = BridgeDiscovery::new(http(), closed_port_url(), fast_policy(2));
    let err = discovery.discover().await.unwrap_err();

    assert!(
        matches!(
            err,
            DiscoveryError::Transport(ClientError::RetriesExhausted { attempts: 3, .. })
        ),
        "expected RetriesExhausted after 3 attempts, got: {err:?}"
    );
}

// ── Sensor reader tests ─────────────────────────────────────────────

#[tokio::test]
async fn test_read_sensors_from_full_datastore() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("/api/{API_KEY}/")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "lights": {"1": {"name": "Lamp", "type": "Extended color light", "state": {"on": true}}},
            "config": {"name": "Philips hue", "apiversion": "1.41.0"},
            "sensors": sensors_json()
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reader = SensorReader::new(http(), API_KEY, ResourceScope::All);
    let batch = reader.read_sensors(&bridge_for(&server)).await.unwrap();

    assert_eq!(batch.len(), 3);
    assert_eq!(batch.unrecognized_count(), 1);
    assert_eq!(batch.skipped.len(), 1);
    assert_eq!(batch.skipped[0].id, "7");

    let kinds: Vec<SensorKind> = batch.recognized().filter_map(|s| s.kind()).collect();
    assert_eq!(kinds, vec![SensorKind::Temperature, SensorKind::LightLevel]);
}

#[tokio::test]
async fn test_read_sensors_subpath() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("/api/{API_KEY}/sensors/")))
        .respond_with(ResponseTemplate::new(200).set_body_json(sensors_json()))
        .expect(1)
        .mount(&server)
        .await;

    let reader = SensorReader::new(http(), API_KEY, ResourceScope::Sensors);
    let batch = reader.read_sensors(&bridge_for(&server)).await.unwrap();
    assert_eq!(batch.recognized().count(), 2);
}

#[tokio::test]
async fn test_read_sensors_unauthorized() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"error": {"type": 1, "address": "/", "description": "unauthorized user"}}
        ])))
        .mount(&server)
        .await;

    let reader = SensorReader::new(http(), "wrong", ResourceScope::All);
    let err = reader.read_sensors(&bridge_for(&server)).await.unwrap_err();

    assert!(
        matches!(err, ReaderError::Api { kind: 1, .. }),
        "expected Api error, got: {err:?}"
    );
}

#[tokio::test]
async fn test_read_sensors_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let reader = SensorReader::new(http(), API_KEY, ResourceScope::All);
    let err = reader.read_sensors(&bridge_for(&server)).await.unwrap_err();

    assert!(matches!(err, ReaderError::Transport(ClientError::Status { .. })));
}

// ── Forwarder tests ─────────────────────────────────────────────────

const LINE: &str = "hue,name=Kitchen_Sensor temperature=21.53,battery=87";

#[tokio::test]
async fn test_forward_posts_line_protocol() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/write"))
        .and(header("content-type", "application/octet-stream"))
        .and(body_string(LINE))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let forwarder = MetricForwarder::new(
        http(),
        format!("{}/write?db=hue", server.uri()),
        fast_policy(3),
        StatusCheck::Ignore,
    );
    let delivery = forwarder.forward(LINE).await.unwrap();

    assert_eq!(delivery.attempts, 1);
    assert_eq!(delivery.retries(), 0);
    assert_eq!(forwarder.stats().metrics_sent, 1);
    assert_eq!(forwarder.stats().retries, 0);
}

#[tokio::test]
async fn test_forward_ignores_backend_status_by_default() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404).set_body_string("database not found"))
        .expect(1)
        .mount(&server)
        .await;

    let forwarder = MetricForwarder::new(http(), server.uri(), fast_policy(3), StatusCheck::Ignore);
    let delivery = forwarder.forward(LINE).await.unwrap();

    assert_eq!(delivery.status.as_u16(), 404);
    assert_eq!(delivery.attempts, 1);
}

#[tokio::test]
async fn test_forward_enforced_client_error_is_fatal_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("unable to parse"))
        .expect(1)
        .mount(&server)
        .await;

    let forwarder =
        MetricForwarder::new(http(), server.uri(), fast_policy(3), StatusCheck::Enforce);
    let err = forwarder.forward(LINE).await.unwrap_err();

    let ForwardError::Transport(ClientError::Status { code, message }) = &err else {
        panic!("expected Status error, got: {err:?}");
    };
    assert_eq!(code.as_u16(), 400);
    assert_eq!(message, "unable to parse");
    assert_eq!(forwarder.stats().failures, 1);
}

#[tokio::test]
async fn test_forward_enforced_server_error_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&server)
        .await;

    let forwarder =
        MetricForwarder::new(http(), server.uri(), fast_policy(3), StatusCheck::Enforce);
    let err = forwarder.forward(LINE).await.unwrap_err();

    assert!(matches!(
        err,
        ForwardError::Transport(ClientError::RetriesExhausted { attempts: 4, .. })
    ));
    assert_eq!(forwarder.stats().retries, 3);
}

#[tokio::test]
async fn test_forward_recovers_after_transient_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let forwarder =
        MetricForwarder::new(http(), server.uri(), fast_policy(3), StatusCheck::Enforce);
    let delivery = forwarder.forward(LINE).await.unwrap();

    assert_eq!(delivery.attempts, 2);
    assert_eq!(forwarder.stats().retries, 1);
}

#[tokio::test]
async fn test_forward_transport_failure_retries_exactly_n_times() {
    let forwarder = MetricForwarder::new(
        http(),
        closed_port_url(),
        fast_policy(5),
        StatusCheck::Ignore,
    );
    let err = forwarder.forward(LINE).await.unwrap_err();

    assert!(
        matches!(
            err,
            ForwardError::Transport(ClientError::RetriesExhausted { attempts: 6, .. })
        ),
        "expected 1 attempt + 5 retries, got: {err:?}"
    );
    let stats = forwarder.stats();
    assert_eq!(stats.retries, 5);
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.metrics_sent, 0);
}

// ── End-to-end ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_first_cycle_end_to_end() {
    let bridge_server = MockServer::start().await;
    let discovery_server = MockServer::start().await;
    let influx = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "001788fffe100491", "internalipaddress": bridge_server.address().to_string()}
        ])))
        .expect(1)
        .mount(&discovery_server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/api/{API_KEY}/")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sensors": sensors_json()})))
        .expect(1)
        .mount(&bridge_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/write"))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&influx)
        .await;

    let mut scheduler = Scheduler::new(
        BridgeDiscovery::new(http(), discovery_server.uri(), fast_policy(3)),
        SensorReader::new(http(), API_KEY, ResourceScope::All),
        MetricForwarder::new(
            http(),
            format!("{}/write?db=hue", influx.uri()),
            fast_policy(3),
            StatusCheck::Ignore,
        ),
        Duration::from_secs(300),
    );

    let report = scheduler.step().await.unwrap();
    assert_eq!(scheduler.state(), SchedulerState::Polling);
    assert_eq!(report.bridges_polled, 1);
    assert_eq!(report.metrics_forwarded, 2);
    assert_eq!(report.entries_skipped, 1);
    assert_eq!(report.unrecognized, 1);

    let requests = influx.received_requests().await.unwrap();
    let bodies: Vec<String> = requests
        .iter()
        .map(|r| String::from_utf8(r.body.clone()).unwrap())
        .collect();

    assert_eq!(bodies[0], LINE);
    assert!(bodies[1].starts_with("hue,name=Hall_Light lux=31.6"));
    assert!(bodies[1].ends_with(",battery=90"));

    let totals = scheduler.sink().stats();
    assert_eq!(totals.metrics_sent, 2);
    assert_eq!(totals.retries, 0);
    assert_eq!(totals.failures, 0);
}
