/// Tests for the analytics surface: error taxonomy, upload envelope, action
/// events and environment switches.
use std::sync::{Arc, Mutex};

use futures_util::future::{self, BoxFuture, FutureExt};
use serde_json::{json, Map, Value};
use serial_test::serial;

use cdp_sdk::analytics::*;
use cdp_sdk::config::AnalyticsConfig;
use cdp_sdk::errors::{CdpError, HttpErrorType};

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<EventData>>,
}

impl EventSink for RecordingSink {
    fn send(&self, event: EventData) -> BoxFuture<'static, ()> {
        self.events.lock().unwrap().push(event);
        future::ready(()).boxed()
    }
}

// ---------------------------------------------------------------------------
// Taxonomy
// ---------------------------------------------------------------------------

#[test]
fn test_input_validation_is_not_trackable() {
    assert!(!is_trackable(&CdpError::UserInputValidation(
        "amount must be positive".into()
    )));
}

#[test]
fn test_network_errors_are_trackable() {
    for error_type in [
        HttpErrorType::NetworkTimeout,
        HttpErrorType::NetworkConnectionFailed,
        HttpErrorType::NetworkIpBlocked,
        HttpErrorType::NetworkDnsFailure,
    ] {
        assert!(is_trackable(&CdpError::network(error_type, "down", false)));
    }
}

#[test]
fn test_classified_api_errors_are_expected() {
    for error_type in [
        HttpErrorType::NotFound,
        HttpErrorType::InvalidRequest,
        HttpErrorType::Unauthorized,
        HttpErrorType::RateLimitExceeded,
        HttpErrorType::FaucetLimitExceeded,
    ] {
        assert!(!is_trackable(&CdpError::api(400, error_type, "rejected")));
    }
    assert!(is_trackable(&CdpError::api(
        500,
        HttpErrorType::UnexpectedError,
        "boom"
    )));
}

#[test]
fn test_other_errors_are_trackable() {
    assert!(is_trackable(&CdpError::JsonError("bad".into())));
    assert!(is_trackable(&CdpError::Timeout("user operation".into())));
    assert!(is_trackable(&CdpError::Other("anything".into())));
}

#[test]
fn test_error_type_parse() {
    assert_eq!(HttpErrorType::parse("not_found"), HttpErrorType::NotFound);
    assert_eq!(
        HttpErrorType::parse("faucet_limit_exceeded"),
        HttpErrorType::FaucetLimitExceeded
    );
    assert_eq!(HttpErrorType::parse("brand_new_kind"), HttpErrorType::Unknown);
    assert_eq!(HttpErrorType::UnexpectedError.as_str(), "unexpected_error");
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[test]
fn test_payload_envelope_and_checksum() {
    let event = EventData::Error(ErrorEventData {
        method: "create_end_user".into(),
        message: "Network error".into(),
        stack: None,
    });
    let payload = build_payload(&event, "key-id", "client-123", 1_700_000_000_000).unwrap();

    assert_eq!(payload["client"], "client-123");
    let stringified = payload["e"].as_str().unwrap();
    assert_eq!(
        payload["checksum"].as_str().unwrap(),
        checksum(stringified, 1_700_000_000_000)
    );
    assert_eq!(payload["checksum"].as_str().unwrap().len(), 32);

    let events: Vec<Value> = serde_json::from_str(stringified).unwrap();
    assert_eq!(events.len(), 1);
    let record = &events[0];
    assert_eq!(record["user_id"], "key-id");
    assert_eq!(record["event_type"], "error");
    assert_eq!(record["platform"], "server");
    assert_eq!(record["timestamp"], 1_700_000_000_000u64);

    let props = &record["event_properties"];
    assert_eq!(props["name"], "error");
    assert_eq!(props["method"], "create_end_user");
    assert_eq!(props["message"], "Network error");
    assert_eq!(props["project_name"], "cdp-sdk");
    assert_eq!(props["cdp_sdk_language"], SDK_LANGUAGE);
    assert_eq!(props["version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_checksum_is_md5_of_events_and_timestamp() {
    use md5::{Digest, Md5};

    let expected = hex::encode(Md5::digest(b"[{\"a\":1}]1700000000000"));
    assert_eq!(checksum("[{\"a\":1}]", 1_700_000_000_000), expected);
    assert_ne!(checksum("[]", 0), checksum("[]", 1));
    assert_eq!(checksum("abc", 12), checksum("abc1", 2));
}

#[test]
fn test_action_event_serializes_account_type() {
    let event = action_event("list_token_balances", Some(AccountType::EvmSmart), None);
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["name"], "action");
    assert_eq!(value["action"], "list_token_balances");
    assert_eq!(value["account_type"], "evm_smart");
}

// ---------------------------------------------------------------------------
// Action events
// ---------------------------------------------------------------------------

fn props(value: Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

#[test]
fn test_action_event_rewrites_custom_rpc_network() {
    let event = action_event(
        "send_transaction",
        Some(AccountType::EvmServer),
        props(json!({ "network": "https://rpc.example.com/v1/abc" })),
    );
    let data = event.as_action().unwrap();
    let properties = data.properties.as_ref().unwrap();
    assert_eq!(properties["network"], "custom");
    assert_eq!(properties["customRpcHost"], "rpc.example.com");
}

#[test]
fn test_action_event_keeps_named_network() {
    let event = action_event(
        "request_faucet",
        None,
        props(json!({ "network": "base-sepolia" })),
    );
    let properties = event.as_action().unwrap().properties.clone().unwrap();
    assert_eq!(properties["network"], "base-sepolia");
    assert!(!properties.contains_key("customRpcHost"));
}

#[test]
fn test_action_event_unparseable_rpc_url() {
    let event = action_event("swap", None, props(json!({ "network": "http://" })));
    let properties = event.as_action().unwrap().properties.clone().unwrap();
    assert_eq!(properties["network"], "custom");
    assert_eq!(properties["customRpcHost"], Value::Null);
}

#[test]
fn test_track_action_records_event() {
    let sink = Arc::new(RecordingSink::default());
    let analytics = Analytics::with_sink(AnalyticsConfig::default(), sink.clone());

    analytics.track_action("create_end_user", None, None);

    let events = sink.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].as_action().unwrap().action, "create_end_user");
}

#[test]
fn test_track_action_disabled_records_nothing() {
    let sink = Arc::new(RecordingSink::default());
    let config = AnalyticsConfig {
        usage_tracking: false,
        ..AnalyticsConfig::default()
    };
    let analytics = Analytics::with_sink(config, sink.clone());

    analytics.track_action("create_end_user", None, None);
    assert!(sink.events.lock().unwrap().is_empty());
}

#[test]
fn test_registry_honors_error_reporting_switch() {
    let sink = Arc::new(RecordingSink::default());
    let config = AnalyticsConfig {
        error_reporting: false,
        ..AnalyticsConfig::default()
    };
    let analytics = Analytics::with_sink(config, sink);

    struct Widget {
        _id: u8,
    }
    let registry = analytics.registry::<Widget>("Widget");
    let _method = registry.sync_method("noop", |_: &Widget, (v,): (u8,)| Ok(v)).unwrap();
    registry.instrument();
    assert_eq!(registry.layers(), 0);
    assert_eq!(registry.type_name(), "Widget");
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

#[test]
#[serial]
fn test_analytics_config_from_env() {
    std::env::remove_var("DISABLE_CDP_ERROR_REPORTING");
    std::env::remove_var("DISABLE_CDP_USAGE_TRACKING");
    let config = AnalyticsConfig::from_env();
    assert!(config.error_reporting);
    assert!(config.usage_tracking);

    std::env::set_var("DISABLE_CDP_ERROR_REPORTING", "true");
    std::env::set_var("DISABLE_CDP_USAGE_TRACKING", "1");
    let config = AnalyticsConfig::from_env();
    assert!(!config.error_reporting);
    assert!(config.usage_tracking);

    std::env::set_var("DISABLE_CDP_USAGE_TRACKING", "true");
    assert!(!AnalyticsConfig::from_env().usage_tracking);

    std::env::remove_var("DISABLE_CDP_ERROR_REPORTING");
    std::env::remove_var("DISABLE_CDP_USAGE_TRACKING");
}

#[test]
fn test_disabled_analytics_turns_off_both_streams() {
    let analytics = Analytics::disabled();
    assert!(!analytics.config().error_reporting);
    assert!(!analytics.config().usage_tracking);
}
