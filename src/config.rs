/// Client configuration: credentials, endpoints, retry and analytics settings.
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::CdpError;

/// Default REST base path.
pub const DEFAULT_BASE_PATH: &str = "https://api.cdp.coinbase.com/platform";

/// Default analytics ingestion endpoint.
pub const DEFAULT_ANALYTICS_ENDPOINT: &str = "https://cca-lite.coinbase.com/amp";

/// Public client id for the analytics service.
pub const ANALYTICS_CLIENT_ID: &str = "54f2ee2fb3d2b901a829940d70fbfc13";

/// EVM networks supported by the SDK helpers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    Base,
    BaseSepolia,
    Ethereum,
    EthereumSepolia,
    Arbitrum,
    Optimism,
    Polygon,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Base => "base",
            Network::BaseSepolia => "base-sepolia",
            Network::Ethereum => "ethereum",
            Network::EthereumSepolia => "ethereum-sepolia",
            Network::Arbitrum => "arbitrum",
            Network::Optimism => "optimism",
            Network::Polygon => "polygon",
        }
    }

    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Base => 8453,
            Network::BaseSepolia => 84532,
            Network::Ethereum => 1,
            Network::EthereumSepolia => 11155111,
            Network::Arbitrum => 42161,
            Network::Optimism => 10,
            Network::Polygon => 137,
        }
    }

    /// Whether the faucet serves this network.
    pub fn is_testnet(&self) -> bool {
        matches!(self, Network::BaseSepolia | Network::EthereumSepolia)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = CdpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "base" => Ok(Network::Base),
            "base-sepolia" => Ok(Network::BaseSepolia),
            "ethereum" => Ok(Network::Ethereum),
            "ethereum-sepolia" => Ok(Network::EthereumSepolia),
            "arbitrum" => Ok(Network::Arbitrum),
            "optimism" => Ok(Network::Optimism),
            "polygon" => Ok(Network::Polygon),
            other => Err(CdpError::UserInputValidation(format!(
                "Unsupported network: {other}"
            ))),
        }
    }
}

/// Retry behavior for idempotent requests.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Initial delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 250,
            max_delay_ms: 4000,
        }
    }
}

impl RetryConfig {
    /// No retries at all.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// Analytics settings. Both switches default to enabled.
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    pub endpoint: String,
    pub client_id: String,
    /// Upper bound on how long a single event upload may take.
    pub timeout: Duration,
    pub error_reporting: bool,
    pub usage_tracking: bool,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ANALYTICS_ENDPOINT.into(),
            client_id: ANALYTICS_CLIENT_ID.into(),
            timeout: Duration::from_secs(1),
            error_reporting: true,
            usage_tracking: true,
        }
    }
}

impl AnalyticsConfig {
    /// Read `DISABLE_CDP_ERROR_REPORTING` and `DISABLE_CDP_USAGE_TRACKING`;
    /// the literal value `"true"` disables the corresponding stream.
    pub fn from_env() -> Self {
        Self {
            error_reporting: !env_flag("DISABLE_CDP_ERROR_REPORTING"),
            usage_tracking: !env_flag("DISABLE_CDP_USAGE_TRACKING"),
            ..Self::default()
        }
    }

    /// Everything off.
    pub fn disabled() -> Self {
        Self {
            error_reporting: false,
            usage_tracking: false,
            ..Self::default()
        }
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name).map(|v| v == "true").unwrap_or(false)
}

/// Configuration for a [`crate::CdpClient`].
#[derive(Clone)]
pub struct CdpConfig {
    pub api_key_id: String,
    pub api_key_secret: String,
    pub base_path: String,
    pub request_timeout: Duration,
    pub retry: RetryConfig,
    pub analytics: AnalyticsConfig,
}

impl fmt::Debug for CdpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CdpConfig")
            .field("api_key_id", &self.api_key_id)
            .field("api_key_secret", &"<redacted>")
            .field("base_path", &self.base_path)
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .field("analytics", &self.analytics)
            .finish()
    }
}

impl CdpConfig {
    /// Create a configuration with default endpoints.
    pub fn new(api_key_id: impl Into<String>, api_key_secret: impl Into<String>) -> Self {
        Self {
            api_key_id: api_key_id.into(),
            api_key_secret: api_key_secret.into(),
            base_path: DEFAULT_BASE_PATH.into(),
            request_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            analytics: AnalyticsConfig::from_env(),
        }
    }

    /// Read `CDP_API_KEY_ID`, `CDP_API_KEY_SECRET` and optionally `CDP_BASE_PATH`.
    pub fn from_env() -> Result<Self, CdpError> {
        let api_key_id = env::var("CDP_API_KEY_ID")
            .map_err(|_| CdpError::Config("CDP_API_KEY_ID is not set".into()))?;
        let api_key_secret = env::var("CDP_API_KEY_SECRET")
            .map_err(|_| CdpError::Config("CDP_API_KEY_SECRET is not set".into()))?;
        let mut config = Self::new(api_key_id, api_key_secret);
        if let Ok(base_path) = env::var("CDP_BASE_PATH") {
            config.base_path = base_path;
        }
        Ok(config)
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_analytics(mut self, analytics: AnalyticsConfig) -> Self {
        self.analytics = analytics;
        self
    }
}
