/// REST API client for the Coinbase Developer Platform.
///
/// Typed wrappers for the end-user, swap, faucet, balance and smart-account
/// user-operation endpoints. Uses reqwest for HTTP with JSON support and
/// retries idempotent requests with exponential backoff.
use std::any::type_name;
use std::time::Duration;

use log::debug;
use rand::Rng;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::auth::ApiKeyAuth;
use crate::config::{CdpConfig, Network, RetryConfig};
use crate::crypto::parse_hex_32;
use crate::errors::{CdpError, HttpErrorType};
use crate::models::*;

/// Error body returned by the service on non-success responses.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiErrorBody {
    error_type: Option<String>,
    error_message: Option<String>,
    correlation_id: Option<String>,
    error_link: Option<String>,
}

/// Low-level REST API client.
#[derive(Debug, Clone)]
pub struct CdpApi {
    client: Client,
    base_path: String,
    auth: ApiKeyAuth,
    retry: RetryConfig,
}

impl CdpApi {
    /// Create a new API client from a configuration.
    pub fn new(config: &CdpConfig) -> Result<Self, CdpError> {
        let auth = ApiKeyAuth::new(config.api_key_id.clone(), &config.api_key_secret)?;
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Url::parse(&config.base_path)?;
        Ok(Self {
            client,
            base_path: config.base_path.trim_end_matches('/').to_string(),
            auth,
            retry: config.retry.clone(),
        })
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn api_key_id(&self) -> &str {
        self.auth.key_id()
    }

    /// Send a request, retrying when it is idempotent (GET, or carries an
    /// idempotency key) and the failure is retryable.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
        idempotency_key: Option<&str>,
    ) -> Result<T, CdpError> {
        let idempotent = method == Method::GET || idempotency_key.is_some();
        let mut attempt: u32 = 0;
        loop {
            let result = self
                .request_once(method.clone(), path, query, body.as_ref(), idempotency_key)
                .await;
            match result {
                Err(e) if idempotent && e.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.backoff(attempt);
                    debug!(
                        "api.retry method={} path={} attempt={} delay_ms={} error={}",
                        method,
                        path,
                        attempt + 1,
                        delay.as_millis(),
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = std::cmp::min(
            self.retry
                .initial_delay_ms
                .saturating_mul(2u64.saturating_pow(attempt)),
            self.retry.max_delay_ms,
        );
        let jitter = rand::thread_rng().gen_range(0..=base / 4);
        Duration::from_millis(base + jitter)
    }

    async fn request_once<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        idempotency_key: Option<&str>,
    ) -> Result<T, CdpError> {
        let url = Url::parse(&format!("{}{}", self.base_path, path))?;
        let jwt = self
            .auth
            .generate_jwt(method.as_str(), &authority(&url), url.path())?;

        let mut builder = self
            .client
            .request(method, url)
            .query(query)
            .bearer_auth(jwt)
            .header("Correlation-Context", correlation_context());
        if let Some(key) = idempotency_key {
            builder = builder.header("X-Idempotency-Key", key);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let resp = builder.send().await?;
        self.parse_response(resp).await
    }

    /// Parse an API response, mapping error bodies to typed errors.
    async fn parse_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, CdpError> {
        let status = response.status();
        let text = response.text().await?;
        let target_type = type_name::<T>();
        debug!(
            "api.parse_response status={} target_type={} body_len={}",
            status,
            target_type,
            text.len()
        );

        if !status.is_success() {
            debug!(
                "api.parse_response non_success status={} body={}",
                status, text
            );
            return Err(error_from_body(status.as_u16(), &text));
        }

        if text.trim().is_empty() {
            return Err(CdpError::JsonError(format!(
                "Empty response (status {status})"
            )));
        }

        match serde_json::from_str(&text) {
            Ok(parsed) => {
                debug!("api.parse_response decode_ok target_type={}", target_type);
                Ok(parsed)
            }
            Err(e) => {
                debug!(
                    "api.parse_response decode_failed target_type={} error={}",
                    target_type, e
                );
                Err(CdpError::JsonError(format!(
                    "Invalid JSON response: {e}\nBody: {}",
                    truncate(&text, 500)
                )))
            }
        }
    }

    // -----------------------------------------------------------------------
    // End users
    // -----------------------------------------------------------------------

    /// POST /v2/end-users - Create an end user.
    pub async fn create_end_user(&self, request: &CreateEndUserRequest) -> Result<EndUser, CdpError> {
        debug!("api.create_end_user user_id={}", request.user_id);
        let body = serde_json::to_value(request)?;
        self.request(Method::POST, "/v2/end-users", &[], Some(body), None)
            .await
    }

    /// GET /v2/end-users - List end users.
    pub async fn list_end_users(
        &self,
        page_size: Option<u32>,
        page_token: Option<&str>,
        sort: &[String],
    ) -> Result<ListEndUsersResponse, CdpError> {
        debug!(
            "api.list_end_users page_size={:?} page_token={:?} sort={:?}",
            page_size, page_token, sort
        );
        let mut query = page_query(page_size, page_token);
        for s in sort {
            query.push(("sort", s.clone()));
        }
        self.request(Method::GET, "/v2/end-users", &query, None, None)
            .await
    }

    /// POST /v2/end-users/auth/validate-token - Validate an end-user access token.
    pub async fn validate_end_user_access_token(
        &self,
        access_token: &str,
    ) -> Result<EndUser, CdpError> {
        debug!("api.validate_end_user_access_token");
        let body = serde_json::json!({ "accessToken": access_token });
        self.request(
            Method::POST,
            "/v2/end-users/auth/validate-token",
            &[],
            Some(body),
            None,
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Swaps
    // -----------------------------------------------------------------------

    /// GET /v2/evm/swaps/quote - Indicative swap price.
    ///
    /// Returned raw: a no-liquidity answer carries none of the price fields.
    pub async fn get_swap_price(&self, options: &GetSwapPriceOptions) -> Result<Value, CdpError> {
        debug!(
            "api.get_swap_price network={} from_token={} to_token={} from_amount={}",
            options.network, options.from_token, options.to_token, options.from_amount
        );
        let mut query = vec![
            ("network", options.network.to_string()),
            ("toToken", options.to_token.clone()),
            ("fromToken", options.from_token.clone()),
            ("fromAmount", options.from_amount.clone()),
            ("taker", options.taker.clone()),
        ];
        if let Some(signer) = &options.signer_address {
            query.push(("signerAddress", signer.clone()));
        }
        if let Some(gas_price) = &options.gas_price {
            query.push(("gasPrice", gas_price.clone()));
        }
        if let Some(bps) = options.slippage_bps {
            query.push(("slippageBps", bps.to_string()));
        }
        self.request(Method::GET, "/v2/evm/swaps/quote", &query, None, None)
            .await
    }

    /// POST /v2/evm/swaps - Firm swap quote.
    pub async fn create_swap_quote(
        &self,
        request: &CreateSwapQuoteRequest,
        idempotency_key: Option<&str>,
    ) -> Result<Value, CdpError> {
        debug!(
            "api.create_swap_quote network={} from_token={} to_token={} from_amount={}",
            request.network, request.from_token, request.to_token, request.from_amount
        );
        let body = serde_json::to_value(request)?;
        self.request(
            Method::POST,
            "/v2/evm/swaps",
            &[],
            Some(body),
            idempotency_key,
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Faucet & balances
    // -----------------------------------------------------------------------

    /// POST /v2/evm/faucet - Request testnet funds.
    pub async fn request_faucet(&self, request: &FaucetRequest) -> Result<FaucetResponse, CdpError> {
        debug!(
            "api.request_faucet address={} network={} token={}",
            request.address, request.network, request.token
        );
        let body = serde_json::to_value(request)?;
        self.request(Method::POST, "/v2/evm/faucet", &[], Some(body), None)
            .await
    }

    /// GET /v2/evm/token-balances/{network}/{address} - List token balances.
    pub async fn list_token_balances(
        &self,
        network: Network,
        address: &str,
        page: &PageOptions,
    ) -> Result<ListTokenBalancesResult, CdpError> {
        debug!(
            "api.list_token_balances network={} address={}",
            network, address
        );
        let path = format!("/v2/evm/token-balances/{}/{}", network, address);
        let query = page_query(page.page_size, page.page_token.as_deref());
        self.request(Method::GET, &path, &query, None, None).await
    }

    // -----------------------------------------------------------------------
    // Smart-account user operations
    // -----------------------------------------------------------------------

    /// POST /v2/evm/smart-accounts/{address}/user-operations - Prepare a user operation.
    pub async fn prepare_user_operation(
        &self,
        address: &str,
        request: &PrepareUserOperationRequest,
        idempotency_key: Option<&str>,
    ) -> Result<UserOperation, CdpError> {
        debug!(
            "api.prepare_user_operation address={} network={} calls={}",
            address,
            request.network,
            request.calls.len()
        );
        let path = format!("/v2/evm/smart-accounts/{}/user-operations", address);
        let body = serde_json::to_value(request)?;
        self.request(Method::POST, &path, &[], Some(body), idempotency_key)
            .await
    }

    /// GET /v2/evm/smart-accounts/{address}/user-operations/{hash}
    pub async fn get_user_operation(
        &self,
        address: &str,
        user_op_hash: &str,
    ) -> Result<UserOperation, CdpError> {
        debug!(
            "api.get_user_operation address={} user_op_hash={}",
            address, user_op_hash
        );
        check_user_op_hash(user_op_hash)?;
        let path = format!(
            "/v2/evm/smart-accounts/{}/user-operations/{}",
            address, user_op_hash
        );
        self.request(Method::GET, &path, &[], None, None).await
    }

    /// POST /v2/evm/smart-accounts/{address}/user-operations/{hash}/send
    pub async fn send_user_operation(
        &self,
        address: &str,
        user_op_hash: &str,
        request: &SendUserOperationRequest,
        idempotency_key: Option<&str>,
    ) -> Result<UserOperation, CdpError> {
        debug!(
            "api.send_user_operation address={} user_op_hash={}",
            address, user_op_hash
        );
        check_user_op_hash(user_op_hash)?;
        let path = format!(
            "/v2/evm/smart-accounts/{}/user-operations/{}/send",
            address, user_op_hash
        );
        let body = serde_json::to_value(request)?;
        self.request(Method::POST, &path, &[], Some(body), idempotency_key)
            .await
    }
}

/// A user-operation hash must be 32 bytes of hex before it enters a path.
fn check_user_op_hash(user_op_hash: &str) -> Result<(), CdpError> {
    parse_hex_32(user_op_hash).map(|_| ()).map_err(|_| {
        CdpError::UserInputValidation(format!(
            "Invalid user operation hash '{}': expected 32 bytes of hex",
            user_op_hash
        ))
    })
}

/// Map a non-success response to a typed error.
fn error_from_body(status: u16, text: &str) -> CdpError {
    match serde_json::from_str::<ApiErrorBody>(text) {
        Ok(body) if body.error_type.is_some() => {
            let error_type = body
                .error_type
                .as_deref()
                .map(HttpErrorType::parse)
                .unwrap_or(HttpErrorType::Unknown);
            CdpError::Api {
                http_code: status,
                error_type,
                message: body.error_message.unwrap_or_else(|| text.to_string()),
                correlation_id: body.correlation_id,
                error_link: body.error_link,
            }
        }
        Ok(_) => CdpError::api(
            status,
            HttpErrorType::UnexpectedError,
            format!("HTTP {}: {}", status, truncate(text, 500)),
        ),
        Err(_) if status == 403 => CdpError::network(
            HttpErrorType::NetworkIpBlocked,
            "Access denied. Your IP address may be blocked or restricted.",
            false,
        ),
        Err(_) => CdpError::api(
            status,
            HttpErrorType::UnexpectedError,
            format!("HTTP {}: {}", status, truncate(text, 500)),
        ),
    }
}

fn page_query(page_size: Option<u32>, page_token: Option<&str>) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if let Some(size) = page_size {
        query.push(("pageSize", size.to_string()));
    }
    if let Some(token) = page_token {
        query.push(("pageToken", token.to_string()));
    }
    query
}

/// Host plus an explicit port, as bound into the token's `uris` claim.
fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

fn correlation_context() -> String {
    format!(
        "sdk_version={},sdk_language=rust,source=cdp-sdk",
        env!("CARGO_PKG_VERSION")
    )
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
