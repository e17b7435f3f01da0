//! Usage and error analytics.
//!
//! Two event streams share one sink: action events recorded by
//! [`Analytics::track_action`] at the start of each public operation, and
//! error events raised by instrumented methods (see [`MethodRegistry`]).
//! Both are best-effort: a failing or slow sink never changes what the caller
//! sees.

mod event;
mod interceptor;
mod policy;
mod sink;

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::AnalyticsConfig;
use crate::errors::CdpError;

pub use event::{
    build_payload, checksum, AccountType, ActionEventData, ErrorEventData, EventData, SDK_LANGUAGE,
};
pub use interceptor::{
    instrument, AsyncFn, AsyncMethod, ErrorTracker, ExecutingSet, FirstArgument, InstanceKey,
    MethodRegistry, SyncFn, SyncMethod,
};
pub use policy::{is_trackable, Trackable};
pub use sink::{dispatch, dispatch_blocking, EventSink, HttpEventSink, NoopSink};

/// Shared analytics handle held by every domain client.
#[derive(Clone)]
pub struct Analytics {
    sink: Arc<dyn EventSink>,
    config: AnalyticsConfig,
    policy: Option<fn(&CdpError) -> bool>,
}

impl std::fmt::Debug for Analytics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analytics")
            .field("config", &self.config)
            .field("custom_policy", &self.policy.is_some())
            .finish_non_exhaustive()
    }
}

impl Analytics {
    /// Post events to the configured endpoint, attributed to `identifier`.
    pub fn new(config: AnalyticsConfig, identifier: impl Into<String>) -> Result<Self, CdpError> {
        let sink = HttpEventSink::new(&config, identifier)?;
        Ok(Self::with_sink(config, Arc::new(sink)))
    }

    /// Use a caller-provided sink.
    pub fn with_sink(config: AnalyticsConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            config,
            policy: None,
        }
    }

    /// Decide which errors are reported instead of using [`is_trackable`].
    /// Applies to registries built after this call.
    pub fn with_policy(mut self, policy: fn(&CdpError) -> bool) -> Self {
        self.policy = Some(policy);
        self
    }

    /// No events of either kind.
    pub fn disabled() -> Self {
        Self::with_sink(AnalyticsConfig::disabled(), Arc::new(NoopSink))
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn sink(&self) -> Arc<dyn EventSink> {
        Arc::clone(&self.sink)
    }

    /// A method registry reporting to this sink. It honors the error-reporting
    /// switch, the configured dispatch timeout and any custom policy.
    pub fn registry<R>(&self, type_name: &'static str) -> MethodRegistry<R, CdpError> {
        let tracker = match self.policy {
            Some(policy) => ErrorTracker::with_policy(self.sink(), policy),
            None => ErrorTracker::new(self.sink()),
        }
        .with_timeout(self.config.timeout);
        MethodRegistry::from_tracker(type_name, tracker)
            .error_reporting(self.config.error_reporting)
    }

    /// Record that `action` is being performed. Never fails.
    ///
    /// A `network` property holding an RPC URL is replaced by `"custom"` and
    /// its host is kept as `customRpcHost`.
    pub fn track_action(
        &self,
        action: &str,
        account_type: Option<AccountType>,
        properties: Option<Map<String, Value>>,
    ) {
        if !self.config.usage_tracking {
            return;
        }
        let event = action_event(action, account_type, properties);
        dispatch_blocking(self.sink(), event, self.config.timeout);
    }
}

/// Build an action event, rewriting custom RPC networks.
pub fn action_event(
    action: &str,
    account_type: Option<AccountType>,
    mut properties: Option<Map<String, Value>>,
) -> EventData {
    if let Some(props) = properties.as_mut() {
        let custom_host = match props.get("network") {
            Some(Value::String(network)) if network.starts_with("http") => Some(
                url::Url::parse(network)
                    .ok()
                    .and_then(|url| url.host_str().map(str::to_string)),
            ),
            _ => None,
        };
        if let Some(host) = custom_host {
            props.insert(
                "customRpcHost".into(),
                host.map(Value::String).unwrap_or(Value::Null),
            );
            props.insert("network".into(), Value::String("custom".into()));
        }
    }

    EventData::Action(ActionEventData {
        action: action.to_string(),
        account_type,
        properties,
    })
}

/// Re-entry value for methods whose first argument is not their return type.
pub fn reentrant_error<A, T>(
    method: &'static str,
) -> impl Fn(A) -> Result<T, CdpError> + Send + Sync + 'static
where
    A: 'static,
    T: 'static,
{
    move |_args: A| Err(CdpError::ReentrantCall(method))
}
