/// High-level CdpClient that ties configuration, transport and analytics together.
///
/// This is the primary entry point for SDK users. It owns the REST transport,
/// the analytics sink, and the instrumented end-user and EVM clients.
use std::sync::Arc;

use log::debug;

use crate::analytics::{Analytics, EventSink};
use crate::api::CdpApi;
use crate::config::CdpConfig;
use crate::crypto::LocalAccount;
use crate::end_user::EndUserClient;
use crate::errors::CdpError;
use crate::evm::EvmClient;

/// The high-level CDP client.
#[derive(Debug, Clone)]
pub struct CdpClient {
    pub api: Arc<CdpApi>,
    pub config: CdpConfig,
    analytics: Analytics,
    end_user: EndUserClient,
    evm: EvmClient,
}

impl CdpClient {
    /// Create a client that reports analytics to the default endpoint.
    pub fn new(config: CdpConfig) -> Result<Self, CdpError> {
        let analytics = Analytics::new(config.analytics.clone(), config.api_key_id.clone())?;
        Self::with_analytics(config, analytics)
    }

    /// Create a client from `CDP_API_KEY_ID`, `CDP_API_KEY_SECRET` and friends.
    pub fn from_env() -> Result<Self, CdpError> {
        Self::new(CdpConfig::from_env()?)
    }

    /// Create a client that hands analytics events to `sink`.
    pub fn with_sink(config: CdpConfig, sink: Arc<dyn EventSink>) -> Result<Self, CdpError> {
        let analytics = Analytics::with_sink(config.analytics.clone(), sink);
        Self::with_analytics(config, analytics)
    }

    /// Create a client around a prepared [`Analytics`] handle, for example one
    /// carrying a custom tracking policy.
    pub fn with_analytics(config: CdpConfig, analytics: Analytics) -> Result<Self, CdpError> {
        let api = Arc::new(CdpApi::new(&config)?);
        debug!(
            "client.new base_path={} error_reporting={} usage_tracking={}",
            api.base_path(),
            config.analytics.error_reporting,
            config.analytics.usage_tracking
        );
        Ok(Self {
            end_user: EndUserClient::new(Arc::clone(&api), analytics.clone())?,
            evm: EvmClient::new(Arc::clone(&api), analytics.clone())?,
            api,
            config,
            analytics,
        })
    }

    pub fn end_user(&self) -> &EndUserClient {
        &self.end_user
    }

    pub fn evm(&self) -> &EvmClient {
        &self.evm
    }

    pub fn analytics(&self) -> &Analytics {
        &self.analytics
    }

    // -----------------------------------------------------------------------
    // Local accounts
    // -----------------------------------------------------------------------

    /// Generate a new local EVM account.
    pub fn generate_account(&self) -> LocalAccount {
        LocalAccount::generate()
    }

    /// Load a local EVM account from a private key hex string.
    pub fn load_account(&self, private_key_hex: &str) -> Result<LocalAccount, CdpError> {
        LocalAccount::from_hex(private_key_hex)
    }
}
