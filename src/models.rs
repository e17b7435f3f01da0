/// Data models for CDP API types.
///
/// All models use serde with the service's camelCase field names.
/// Token amounts stay as strings to avoid precision loss.
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::Network;

/// Deserialize an optional value that may be a JSON number or a string, storing as String.
fn deserialize_optional_string_or_number<'de, D>(
    deserializer: D,
) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    match value {
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(serde_json::Value::Null) | None => Ok(None),
        Some(v) => Ok(Some(v.to_string())),
    }
}

// ---------------------------------------------------------------------------
// End users
// ---------------------------------------------------------------------------

/// How an end user signs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthenticationMethod {
    Email {
        email: String,
    },
    Sms {
        #[serde(rename = "phoneNumber")]
        phone_number: String,
    },
    Jwt {
        sub: String,
        kid: String,
    },
}

impl AuthenticationMethod {
    pub fn email(email: impl Into<String>) -> Self {
        AuthenticationMethod::Email {
            email: email.into(),
        }
    }
}

/// An end user of the developer's project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndUser {
    pub user_id: String,
    #[serde(default)]
    pub authentication_methods: Vec<AuthenticationMethod>,
    #[serde(default)]
    pub evm_accounts: Vec<String>,
    #[serde(default)]
    pub evm_smart_accounts: Vec<String>,
    #[serde(default)]
    pub solana_accounts: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Account to provision alongside a new end user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEndUserAccount {
    pub create_smart_account: bool,
}

/// Options for [`crate::EndUserClient::create_end_user`].
#[derive(Debug, Clone, Default)]
pub struct CreateEndUserOptions {
    pub authentication_methods: Vec<AuthenticationMethod>,
    /// Generated as a UUID v4 when absent.
    pub user_id: Option<String>,
    pub evm_account: Option<CreateEndUserAccount>,
    pub solana_account: Option<CreateEndUserAccount>,
}

/// Request body for POST /v2/end-users.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEndUserRequest {
    pub user_id: String,
    pub authentication_methods: Vec<AuthenticationMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evm_account: Option<CreateEndUserAccount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solana_account: Option<CreateEndUserAccount>,
}

/// Options for [`crate::EndUserClient::list_end_users`].
#[derive(Debug, Clone, Default)]
pub struct ListEndUsersOptions {
    pub page_size: Option<u32>,
    pub page_token: Option<String>,
    /// Sort expressions such as `createdAt=desc`.
    pub sort: Vec<String>,
}

/// Response from GET /v2/end-users.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEndUsersResponse {
    #[serde(default)]
    pub end_users: Vec<EndUser>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// A page of end users.
#[derive(Debug, Clone)]
pub struct ListEndUsersResult {
    pub end_users: Vec<EndUser>,
    pub next_page_token: Option<String>,
}

// ---------------------------------------------------------------------------
// Swaps
// ---------------------------------------------------------------------------

/// A fee amount denominated in a token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenFee {
    pub amount: String,
    pub token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapFees {
    #[serde(default)]
    pub gas_fee: Option<TokenFee>,
    #[serde(default)]
    pub protocol_fee: Option<TokenFee>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowanceIssue {
    pub current_allowance: String,
    pub spender: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceIssue {
    pub token: String,
    pub current_balance: String,
    pub required_balance: String,
}

/// Conditions the taker must resolve before the swap can settle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapIssues {
    #[serde(default)]
    pub allowance: Option<AllowanceIssue>,
    #[serde(default)]
    pub balance: Option<BalanceIssue>,
    #[serde(default)]
    pub simulation_incomplete: bool,
}

/// Options for [`crate::EvmClient::get_swap_price`].
#[derive(Debug, Clone)]
pub struct GetSwapPriceOptions {
    pub from_token: String,
    pub to_token: String,
    pub from_amount: String,
    pub network: Network,
    pub taker: String,
    pub signer_address: Option<String>,
    pub gas_price: Option<String>,
    pub slippage_bps: Option<u32>,
}

/// An indicative price for a swap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapPrice {
    pub liquidity_available: bool,
    pub from_token: String,
    pub to_token: String,
    pub from_amount: String,
    pub to_amount: String,
    pub min_to_amount: String,
    #[serde(default, deserialize_with = "deserialize_optional_string_or_number")]
    pub block_number: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_string_or_number")]
    pub gas: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_string_or_number")]
    pub gas_price: Option<String>,
    #[serde(default)]
    pub fees: SwapFees,
    #[serde(default)]
    pub issues: SwapIssues,
}

impl SwapPrice {
    /// `to_amount / from_amount` in atomic units, if both parse.
    pub fn price_ratio(&self) -> Option<Decimal> {
        let from = Decimal::from_str(&self.from_amount).ok()?;
        let to = Decimal::from_str(&self.to_amount).ok()?;
        to.checked_div(from)
    }
}

/// Options for [`crate::EvmClient::create_swap_quote`].
#[derive(Debug, Clone)]
pub struct CreateSwapQuoteOptions {
    pub from_token: String,
    pub to_token: String,
    pub from_amount: String,
    pub network: Network,
    pub taker: String,
    pub signer_address: Option<String>,
    pub gas_price: Option<String>,
    /// Basis points, 100 = 1%.
    pub slippage_bps: Option<u32>,
    pub idempotency_key: Option<String>,
}

/// Request body for POST /v2/evm/swaps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSwapQuoteRequest {
    pub network: Network,
    pub from_token: String,
    pub to_token: String,
    pub from_amount: String,
    pub taker: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signer_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slippage_bps: Option<u32>,
}

/// The transaction a taker submits to execute a quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapTransaction {
    pub to: String,
    pub data: String,
    #[serde(default, deserialize_with = "deserialize_optional_string_or_number")]
    pub value: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_string_or_number")]
    pub gas: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_string_or_number")]
    pub gas_price: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_string_or_number")]
    pub max_fee_per_gas: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_string_or_number")]
    pub max_priority_fee_per_gas: Option<String>,
}

/// Permit2 typed data the signer must authorize.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permit2Data {
    pub eip712: serde_json::Value,
    pub hash: String,
}

/// A firm, executable swap quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteSwapResult {
    #[serde(skip)]
    pub network: Option<Network>,
    pub from_token: String,
    pub to_token: String,
    pub from_amount: String,
    pub to_amount: String,
    pub min_to_amount: String,
    #[serde(default, deserialize_with = "deserialize_optional_string_or_number")]
    pub block_number: Option<String>,
    #[serde(default)]
    pub fees: SwapFees,
    #[serde(default)]
    pub issues: SwapIssues,
    pub transaction: Option<SwapTransaction>,
    #[serde(default)]
    pub permit2: Option<Permit2Data>,
}

impl QuoteSwapResult {
    /// True when the signer must sign the Permit2 payload before execution.
    pub fn requires_signature(&self) -> bool {
        self.permit2.is_some()
    }

    pub fn to(&self) -> Option<&str> {
        self.transaction.as_ref().map(|tx| tx.to.as_str())
    }

    pub fn data(&self) -> Option<&str> {
        self.transaction.as_ref().map(|tx| tx.data.as_str())
    }

    pub fn value(&self) -> Option<&str> {
        self.transaction.as_ref().and_then(|tx| tx.value.as_deref())
    }
}

/// Returned instead of a quote when the route has no liquidity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapUnavailableResult {
    pub liquidity_available: bool,
}

/// Outcome of a quote request.
#[derive(Debug, Clone)]
pub enum SwapQuote {
    Available(Box<QuoteSwapResult>),
    Unavailable(SwapUnavailableResult),
}

impl SwapQuote {
    pub fn liquidity_available(&self) -> bool {
        matches!(self, SwapQuote::Available(_))
    }

    /// The executable quote, if liquidity was available.
    pub fn into_quote(self) -> Option<QuoteSwapResult> {
        match self {
            SwapQuote::Available(quote) => Some(*quote),
            SwapQuote::Unavailable(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Faucet & balances
// ---------------------------------------------------------------------------

/// Request body for POST /v2/evm/faucet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaucetRequest {
    pub address: String,
    pub network: Network,
    pub token: String,
}

/// Response from POST /v2/evm/faucet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaucetResponse {
    pub transaction_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub network: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub contract_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAmount {
    pub amount: String,
    pub decimals: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub token: Token,
    pub amount: TokenAmount,
}

/// A page of token balances.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTokenBalancesResult {
    #[serde(default)]
    pub balances: Vec<TokenBalance>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Pagination for list endpoints.
#[derive(Debug, Clone, Default)]
pub struct PageOptions {
    pub page_size: Option<u32>,
    pub page_token: Option<String>,
}

// ---------------------------------------------------------------------------
// User operations
// ---------------------------------------------------------------------------

/// A single call inside a user operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractCall {
    pub to: String,
    /// Wei, decimal string.
    #[serde(default = "zero_value")]
    pub value: String,
    /// 0x-prefixed calldata.
    #[serde(default = "empty_data")]
    pub data: String,
}

fn zero_value() -> String {
    "0".into()
}

fn empty_data() -> String {
    "0x".into()
}

impl ContractCall {
    pub fn new(to: impl Into<String>, value: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            value: value.into(),
            data: data.into(),
        }
    }
}

/// Lifecycle of a user operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserOperationStatus {
    Pending,
    Signed,
    Broadcast,
    Complete,
    Dropped,
    Failed,
    #[serde(other)]
    Unknown,
}

impl UserOperationStatus {
    /// No further transitions happen from a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UserOperationStatus::Complete | UserOperationStatus::Dropped | UserOperationStatus::Failed
        )
    }
}

/// A user operation as tracked by the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub network: String,
    pub user_op_hash: String,
    #[serde(default)]
    pub calls: Vec<ContractCall>,
    pub status: UserOperationStatus,
    #[serde(default)]
    pub transaction_hash: Option<String>,
}

/// Polling bounds for [`crate::EvmSmartAccount::wait_for_user_operation`].
#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            interval: Duration::from_millis(200),
        }
    }
}

/// Request body for POST .../user-operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareUserOperationRequest {
    pub network: Network,
    pub calls: Vec<ContractCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paymaster_url: Option<String>,
}

/// Request body for POST .../user-operations/{hash}/send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendUserOperationRequest {
    pub signature: String,
}

/// Options for [`crate::EvmSmartAccount::quote_swap`]. The smart account is
/// the taker and its owner the signer.
#[derive(Debug, Clone)]
pub struct QuoteSwapOptions {
    pub network: Network,
    pub from_token: String,
    pub to_token: String,
    pub from_amount: String,
    pub slippage_bps: Option<u32>,
    pub idempotency_key: Option<String>,
}

/// Where a smart-account swap gets its quote from.
#[derive(Debug, Clone)]
pub enum SwapSource {
    /// Execute a quote obtained earlier.
    Quote(Box<QuoteSwapResult>),
    /// Request a fresh quote and execute it.
    Inline(QuoteSwapOptions),
}

/// Options for [`crate::EvmSmartAccount::swap`].
#[derive(Debug, Clone)]
pub struct SmartAccountSwapOptions {
    pub source: SwapSource,
    pub paymaster_url: Option<String>,
}

/// Result of a smart-account swap.
#[derive(Debug, Clone)]
pub struct SmartAccountSwapResult {
    pub user_op_hash: String,
    pub smart_account_address: String,
    pub status: UserOperationStatus,
}

/// Arguments to `EvmSmartAccount::transfer`.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Recipient address.
    pub to: String,
    /// Atomic units of `token`.
    pub amount: u128,
    /// `"eth"`, `"usdc"` or an ERC-20 contract address.
    pub token: String,
    pub network: Network,
    pub paymaster_url: Option<String>,
}
