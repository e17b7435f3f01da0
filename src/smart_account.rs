/// EVM smart accounts: user operations, faucet, balances and swaps.
///
/// A smart account is a contract wallet controlled by an owner [`Signer`].
/// Every state change goes through a user operation: the service prepares it,
/// the owner signs the user-operation hash, and the signed operation is sent
/// to the bundler.
use std::fmt;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use log::debug;
use serde_json::{json, Map, Value};
use tokio::time::Instant;

use crate::analytics::{reentrant_error, AccountType, Analytics, AsyncMethod, MethodRegistry};
use crate::api::CdpApi;
use crate::config::Network;
use crate::crypto::{decode_hex, parse_address, parse_hex_32, to_hex_string, Signer};
use crate::errors::CdpError;
use crate::evm::{quote, validate_faucet};
use crate::models::*;

/// A smart account bound to its owner.
#[derive(Clone)]
pub struct EvmSmartAccount {
    address: String,
    owner: Arc<dyn Signer>,
    api: Arc<CdpApi>,
    analytics: Analytics,
    methods: Arc<SmartAccountMethods>,
}

impl fmt::Debug for EvmSmartAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmSmartAccount")
            .field("address", &self.address)
            .field("owner", &self.owner.address())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub(crate) struct SmartAccountMethods {
    registry: MethodRegistry<EvmSmartAccount>,
    list_token_balances:
        AsyncMethod<EvmSmartAccount, (Network, PageOptions), ListTokenBalancesResult>,
    request_faucet: AsyncMethod<EvmSmartAccount, (Network, String), String>,
    send_user_operation:
        AsyncMethod<EvmSmartAccount, (Vec<ContractCall>, Network, Option<String>), UserOperation>,
    get_user_operation: AsyncMethod<EvmSmartAccount, (String,), UserOperation>,
    wait_for_user_operation: AsyncMethod<EvmSmartAccount, (String, WaitOptions), UserOperation>,
    quote_swap: AsyncMethod<EvmSmartAccount, (QuoteSwapOptions,), SwapQuote>,
    swap: AsyncMethod<EvmSmartAccount, (SmartAccountSwapOptions,), SmartAccountSwapResult>,
    transfer: AsyncMethod<EvmSmartAccount, (TransferOptions,), UserOperation>,
}

impl SmartAccountMethods {
    pub(crate) fn new(analytics: &Analytics) -> Result<Self, CdpError> {
        let registry = analytics.registry::<EvmSmartAccount>("EvmSmartAccount");
        let list_token_balances = registry.async_method_with_reentry(
            "list_token_balances",
            list_token_balances,
            reentrant_error("list_token_balances"),
        )?;
        let request_faucet = registry.async_method_with_reentry(
            "request_faucet",
            request_faucet,
            reentrant_error("request_faucet"),
        )?;
        let send_user_operation = registry.async_method_with_reentry(
            "send_user_operation",
            send_user_operation,
            reentrant_error("send_user_operation"),
        )?;
        let get_user_operation = registry.async_method_with_reentry(
            "get_user_operation",
            get_user_operation,
            reentrant_error("get_user_operation"),
        )?;
        let wait_for_user_operation = registry.async_method_with_reentry(
            "wait_for_user_operation",
            wait_for_user_operation,
            reentrant_error("wait_for_user_operation"),
        )?;
        let quote_swap = registry.async_method_with_reentry(
            "quote_swap",
            quote_swap,
            reentrant_error("quote_swap"),
        )?;
        let swap = registry.async_method_with_reentry("swap", swap, reentrant_error("swap"))?;
        let transfer =
            registry.async_method_with_reentry("transfer", transfer, reentrant_error("transfer"))?;
        registry.instrument();
        Ok(Self {
            registry,
            list_token_balances,
            request_faucet,
            send_user_operation,
            get_user_operation,
            wait_for_user_operation,
            quote_swap,
            swap,
            transfer,
        })
    }
}

impl EvmSmartAccount {
    pub(crate) fn new(
        address: String,
        owner: Arc<dyn Signer>,
        api: Arc<CdpApi>,
        analytics: Analytics,
        methods: Arc<SmartAccountMethods>,
    ) -> Self {
        Self {
            address,
            owner,
            api,
            analytics,
            methods,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn owner(&self) -> &Arc<dyn Signer> {
        &self.owner
    }

    /// Method table backing smart accounts.
    pub fn registry(&self) -> &MethodRegistry<EvmSmartAccount> {
        &self.methods.registry
    }

    pub async fn list_token_balances(
        &self,
        network: Network,
        page: PageOptions,
    ) -> Result<ListTokenBalancesResult, CdpError> {
        self.methods
            .list_token_balances
            .call(self, (network, page))
            .await
    }

    /// Request testnet funds for this account; returns the transaction hash.
    pub async fn request_faucet(
        &self,
        network: Network,
        token: impl Into<String>,
    ) -> Result<String, CdpError> {
        self.methods
            .request_faucet
            .call(self, (network, token.into()))
            .await
    }

    /// Prepare, sign and send a user operation made of `calls`.
    pub async fn send_user_operation(
        &self,
        calls: Vec<ContractCall>,
        network: Network,
        paymaster_url: Option<String>,
    ) -> Result<UserOperation, CdpError> {
        self.methods
            .send_user_operation
            .call(self, (calls, network, paymaster_url))
            .await
    }

    pub async fn get_user_operation(
        &self,
        user_op_hash: impl Into<String>,
    ) -> Result<UserOperation, CdpError> {
        self.methods
            .get_user_operation
            .call(self, (user_op_hash.into(),))
            .await
    }

    /// Poll until the operation is complete, failed or dropped.
    ///
    /// Fails with [`CdpError::Timeout`] once `options.timeout` elapses.
    pub async fn wait_for_user_operation(
        &self,
        user_op_hash: impl Into<String>,
        options: WaitOptions,
    ) -> Result<UserOperation, CdpError> {
        self.methods
            .wait_for_user_operation
            .call(self, (user_op_hash.into(), options))
            .await
    }

    /// Quote a swap with this account as taker and its owner as signer.
    pub async fn quote_swap(&self, options: QuoteSwapOptions) -> Result<SwapQuote, CdpError> {
        self.methods.quote_swap.call(self, (options,)).await
    }

    /// Execute a swap through a user operation.
    pub async fn swap(
        &self,
        options: SmartAccountSwapOptions,
    ) -> Result<SmartAccountSwapResult, CdpError> {
        self.methods.swap.call(self, (options,)).await
    }

    /// Send `amount` atomic units of native ETH, USDC or any ERC-20 contract
    /// to `options.to` through a user operation.
    pub async fn transfer(&self, options: TransferOptions) -> Result<UserOperation, CdpError> {
        self.methods.transfer.call(self, (options,)).await
    }
}

fn network_properties(network: Network) -> Option<Map<String, Value>> {
    let mut properties = Map::new();
    properties.insert("network".into(), json!(network.as_str()));
    Some(properties)
}

/// Append a signature to call data as a 32-byte big-endian length followed
/// by the signature bytes.
pub fn append_signature(data: &str, signature: &[u8]) -> Result<String, CdpError> {
    let mut bytes = decode_hex(data)?;
    let mut length = [0u8; 32];
    length[24..].copy_from_slice(&(signature.len() as u64).to_be_bytes());
    bytes.extend_from_slice(&length);
    bytes.extend_from_slice(signature);
    Ok(to_hex_string(&bytes))
}

/// `transfer(address,uint256)` selector.
const ERC20_TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// Calldata for an ERC-20 `transfer(to, amount)`.
pub fn erc20_transfer_data(to: &str, amount: u128) -> Result<String, CdpError> {
    let recipient = parse_address(to)?;
    let mut data = Vec::with_capacity(4 + 64);
    data.extend_from_slice(&ERC20_TRANSFER_SELECTOR);
    data.extend_from_slice(&[0u8; 12]);
    data.extend_from_slice(&recipient);
    data.extend_from_slice(&[0u8; 16]);
    data.extend_from_slice(&amount.to_be_bytes());
    Ok(to_hex_string(&data))
}

/// USDC contract on networks where it is known by symbol.
pub fn usdc_address(network: Network) -> Option<&'static str> {
    match network {
        Network::Base => Some("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
        Network::BaseSepolia => Some("0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
        Network::Ethereum => Some("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
        Network::EthereumSepolia => Some("0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238"),
        _ => None,
    }
}

/// The single call that moves `amount` of `token` to `to`.
fn transfer_call(
    to: &str,
    amount: u128,
    token: &str,
    network: Network,
) -> Result<ContractCall, CdpError> {
    parse_address(to)?;
    if token.eq_ignore_ascii_case("eth") {
        return Ok(ContractCall::new(to, amount.to_string(), "0x"));
    }
    let contract = if token.eq_ignore_ascii_case("usdc") {
        usdc_address(network).ok_or_else(|| {
            CdpError::UserInputValidation(format!("USDC is not available on {}", network))
        })?
    } else {
        parse_address(token).map_err(|_| {
            CdpError::UserInputValidation(format!(
                "Unknown token '{}': use eth, usdc or a contract address",
                token
            ))
        })?;
        token
    };
    Ok(ContractCall::new(contract, "0", erc20_transfer_data(to, amount)?))
}

// ---------------------------------------------------------------------------
// Uninstrumented helpers shared by composite operations
// ---------------------------------------------------------------------------

/// Prepare, sign with the owner and send.
async fn submit_calls(
    account: &EvmSmartAccount,
    calls: Vec<ContractCall>,
    network: Network,
    paymaster_url: Option<String>,
) -> Result<UserOperation, CdpError> {
    if calls.is_empty() {
        return Err(CdpError::UserInputValidation(
            "Calls array is empty".into(),
        ));
    }

    let request = PrepareUserOperationRequest {
        network,
        calls,
        paymaster_url,
    };
    let prepared = account
        .api
        .prepare_user_operation(&account.address, &request, None)
        .await?;
    debug!(
        "smart_account.submit_calls prepared user_op_hash={}",
        prepared.user_op_hash
    );

    let hash = parse_hex_32(&prepared.user_op_hash)?;
    let signature = account.owner.sign_hash(&hash)?;
    let send = SendUserOperationRequest {
        signature: to_hex_string(&signature),
    };
    account
        .api
        .send_user_operation(&account.address, &prepared.user_op_hash, &send, None)
        .await
}

/// Quote with this account as taker and its owner as signer.
async fn quote_as_taker(
    account: &EvmSmartAccount,
    options: QuoteSwapOptions,
) -> Result<SwapQuote, CdpError> {
    let request = CreateSwapQuoteOptions {
        from_token: options.from_token,
        to_token: options.to_token,
        from_amount: options.from_amount,
        network: options.network,
        taker: account.address.clone(),
        signer_address: Some(account.owner.address()),
        gas_price: None,
        slippage_bps: options.slippage_bps,
        idempotency_key: options.idempotency_key,
    };
    quote(&account.api, &request).await
}

fn list_token_balances(
    account: &EvmSmartAccount,
    (network, page): (Network, PageOptions),
) -> BoxFuture<'_, Result<ListTokenBalancesResult, CdpError>> {
    async move {
        account.analytics.track_action(
            "list_token_balances",
            Some(AccountType::EvmSmart),
            network_properties(network),
        );
        account
            .api
            .list_token_balances(network, &account.address, &page)
            .await
    }
    .boxed()
}

fn request_faucet(
    account: &EvmSmartAccount,
    (network, token): (Network, String),
) -> BoxFuture<'_, Result<String, CdpError>> {
    async move {
        account.analytics.track_action(
            "request_faucet",
            Some(AccountType::EvmSmart),
            network_properties(network),
        );
        validate_faucet(network, &token)?;
        let request = FaucetRequest {
            address: account.address.clone(),
            network,
            token,
        };
        let response = account.api.request_faucet(&request).await?;
        Ok(response.transaction_hash)
    }
    .boxed()
}

fn send_user_operation(
    account: &EvmSmartAccount,
    (calls, network, paymaster_url): (Vec<ContractCall>, Network, Option<String>),
) -> BoxFuture<'_, Result<UserOperation, CdpError>> {
    async move {
        account.analytics.track_action(
            "send_user_operation",
            Some(AccountType::EvmSmart),
            network_properties(network),
        );
        submit_calls(account, calls, network, paymaster_url).await
    }
    .boxed()
}

fn get_user_operation(
    account: &EvmSmartAccount,
    (user_op_hash,): (String,),
) -> BoxFuture<'_, Result<UserOperation, CdpError>> {
    async move {
        account.analytics.track_action(
            "get_user_operation",
            Some(AccountType::EvmSmart),
            None,
        );
        account
            .api
            .get_user_operation(&account.address, &user_op_hash)
            .await
    }
    .boxed()
}

fn wait_for_user_operation(
    account: &EvmSmartAccount,
    (user_op_hash, options): (String, WaitOptions),
) -> BoxFuture<'_, Result<UserOperation, CdpError>> {
    async move {
        account.analytics.track_action(
            "wait_for_user_operation",
            Some(AccountType::EvmSmart),
            None,
        );
        let deadline = Instant::now() + options.timeout;
        loop {
            let op = account
                .api
                .get_user_operation(&account.address, &user_op_hash)
                .await?;
            if op.status.is_terminal() {
                debug!(
                    "smart_account.wait_for_user_operation user_op_hash={} status={:?}",
                    user_op_hash, op.status
                );
                return Ok(op);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(CdpError::Timeout(format!(
                    "User operation {} not complete after {:?} (status {:?})",
                    user_op_hash, options.timeout, op.status
                )));
            }
            tokio::time::sleep(options.interval.min(deadline - now)).await;
        }
    }
    .boxed()
}

fn quote_swap(
    account: &EvmSmartAccount,
    (options,): (QuoteSwapOptions,),
) -> BoxFuture<'_, Result<SwapQuote, CdpError>> {
    async move {
        account.analytics.track_action(
            "create_swap_quote",
            Some(AccountType::EvmSmart),
            network_properties(options.network),
        );
        quote_as_taker(account, options).await
    }
    .boxed()
}

fn swap(
    account: &EvmSmartAccount,
    (options,): (SmartAccountSwapOptions,),
) -> BoxFuture<'_, Result<SmartAccountSwapResult, CdpError>> {
    async move {
        let network = match &options.source {
            SwapSource::Quote(quote) => quote.network,
            SwapSource::Inline(inline) => Some(inline.network),
        };
        account.analytics.track_action(
            "swap",
            Some(AccountType::EvmSmart),
            network.and_then(network_properties),
        );

        let quote = match options.source {
            SwapSource::Quote(quote) => *quote,
            SwapSource::Inline(inline) => match quote_as_taker(account, inline).await? {
                SwapQuote::Available(quote) => *quote,
                SwapQuote::Unavailable(_) => {
                    return Err(CdpError::InsufficientLiquidity(
                        "no liquidity available for swap".into(),
                    ))
                }
            },
        };
        let network = quote.network.ok_or_else(|| {
            CdpError::UserInputValidation("Swap quote does not carry a network".into())
        })?;
        if let Some(balance) = &quote.issues.balance {
            return Err(CdpError::UserInputValidation(format!(
                "Insufficient balance of {}: have {}, need {}",
                balance.token, balance.current_balance, balance.required_balance
            )));
        }
        let tx = quote
            .transaction
            .as_ref()
            .ok_or_else(|| CdpError::Other("Swap quote has no transaction".into()))?;

        let data = match &quote.permit2 {
            Some(permit2) => {
                let hash = parse_hex_32(&permit2.hash)?;
                let signature = account.owner.sign_hash(&hash)?;
                append_signature(&tx.data, &signature)?
            }
            None => tx.data.clone(),
        };
        let call = ContractCall::new(
            tx.to.clone(),
            tx.value.clone().unwrap_or_else(|| "0".into()),
            data,
        );

        let op = submit_calls(account, vec![call], network, options.paymaster_url).await?;
        Ok(SmartAccountSwapResult {
            user_op_hash: op.user_op_hash,
            smart_account_address: account.address.clone(),
            status: op.status,
        })
    }
    .boxed()
}

fn transfer(
    account: &EvmSmartAccount,
    (options,): (TransferOptions,),
) -> BoxFuture<'_, Result<UserOperation, CdpError>> {
    async move {
        account.analytics.track_action(
            "transfer",
            Some(AccountType::EvmSmart),
            network_properties(options.network),
        );
        let call = transfer_call(&options.to, options.amount, &options.token, options.network)?;
        debug!(
            "smart_account.transfer to={} token={} amount={}",
            options.to, options.token, options.amount
        );
        submit_calls(account, vec![call], options.network, options.paymaster_url).await
    }
    .boxed()
}
