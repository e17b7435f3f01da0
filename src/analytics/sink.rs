/// Event sinks and best-effort dispatch helpers.
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::future::{self, BoxFuture, FutureExt};
use log::debug;

use crate::config::AnalyticsConfig;
use crate::errors::CdpError;

use super::event::{build_payload, EventData};

/// Receives analytics events. Sending never fails from the caller's point of
/// view; implementations swallow their own errors.
pub trait EventSink: Send + Sync {
    fn send(&self, event: EventData) -> BoxFuture<'static, ()>;
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn send(&self, _event: EventData) -> BoxFuture<'static, ()> {
        future::ready(()).boxed()
    }
}

/// Posts events to the analytics ingestion endpoint.
#[derive(Debug, Clone)]
pub struct HttpEventSink {
    client: reqwest::Client,
    endpoint: String,
    client_id: String,
    identifier: String,
    error_reporting: bool,
    usage_tracking: bool,
}

impl HttpEventSink {
    /// `identifier` is the API key id the events are attributed to.
    pub fn new(config: &AnalyticsConfig, identifier: impl Into<String>) -> Result<Self, CdpError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            client_id: config.client_id.clone(),
            identifier: identifier.into(),
            error_reporting: config.error_reporting,
            usage_tracking: config.usage_tracking,
        })
    }

    fn accepts(&self, event: &EventData) -> bool {
        if event.is_error() {
            self.error_reporting
        } else {
            self.usage_tracking
        }
    }
}

impl EventSink for HttpEventSink {
    fn send(&self, event: EventData) -> BoxFuture<'static, ()> {
        if !self.accepts(&event) {
            return future::ready(()).boxed();
        }

        let payload = match build_payload(&event, &self.identifier, &self.client_id, now_ms()) {
            Ok(payload) => payload,
            Err(e) => {
                debug!("analytics.send event={} encode_error={}", event.name(), e);
                return future::ready(()).boxed();
            }
        };

        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let name = event.name();
        async move {
            match client.post(&endpoint).json(&payload).send().await {
                Ok(response) => {
                    debug!("analytics.send event={} status={}", name, response.status());
                    let _ = response.text().await;
                }
                Err(e) => debug!("analytics.send event={} error={}", name, e),
            }
        }
        .boxed()
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Await a send, giving up after `timeout`.
pub async fn dispatch(sink: &dyn EventSink, event: EventData, timeout: Duration) {
    let name = event.name();
    if tokio::time::timeout(timeout, sink.send(event)).await.is_err() {
        debug!("analytics.dispatch event={} timed_out=true", name);
    }
}

/// Fire-and-forget send from synchronous code.
///
/// Inside a tokio runtime the send is spawned and this returns immediately.
/// Otherwise it runs on a helper thread and the caller waits at most `timeout`.
pub fn dispatch_blocking(sink: Arc<dyn EventSink>, event: EventData, timeout: Duration) {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(async move {
            dispatch(sink.as_ref(), event, timeout).await;
        });
        return;
    }

    let (done_tx, done_rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name("cdp-analytics".into())
        .spawn(move || {
            match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime.block_on(dispatch(sink.as_ref(), event, timeout)),
                Err(e) => debug!("analytics.dispatch runtime_error={}", e),
            }
            let _ = done_tx.send(());
        });

    match spawned {
        Ok(_) => {
            let _ = done_rx.recv_timeout(timeout);
        }
        Err(e) => debug!("analytics.dispatch spawn_error={}", e),
    }
}
