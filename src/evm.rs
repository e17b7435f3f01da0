/// EVM operations: swap pricing and quotes, faucet, balances and smart accounts.
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use log::debug;
use serde_json::{json, Map, Value};

use crate::analytics::{
    reentrant_error, AccountType, Analytics, AsyncMethod, MethodRegistry, SyncMethod,
};
use crate::api::CdpApi;
use crate::config::Network;
use crate::crypto::{parse_address, Signer};
use crate::errors::CdpError;
use crate::models::*;
use crate::smart_account::{EvmSmartAccount, SmartAccountMethods};
use crate::units::parse_atomic;

/// Tokens the faucet dispenses.
pub const FAUCET_TOKENS: &[&str] = &["eth", "usdc", "eurc", "cbbtc"];

/// Client for EVM networks.
#[derive(Debug, Clone)]
pub struct EvmClient {
    api: Arc<CdpApi>,
    analytics: Analytics,
    methods: Arc<EvmMethods>,
    smart_account_methods: Arc<SmartAccountMethods>,
}

#[derive(Debug)]
struct EvmMethods {
    registry: MethodRegistry<EvmClient>,
    get_swap_price: AsyncMethod<EvmClient, (GetSwapPriceOptions,), SwapPrice>,
    create_swap_quote: AsyncMethod<EvmClient, (CreateSwapQuoteOptions,), SwapQuote>,
    request_faucet: AsyncMethod<EvmClient, (String, Network, String), String>,
    list_token_balances:
        AsyncMethod<EvmClient, (String, Network, PageOptions), ListTokenBalancesResult>,
    get_smart_account: SyncMethod<EvmClient, (String, Arc<dyn Signer>), EvmSmartAccount>,
}

impl EvmMethods {
    fn new(analytics: &Analytics) -> Result<Self, CdpError> {
        let registry = analytics.registry::<EvmClient>("EvmClient");
        let get_swap_price = registry.async_method_with_reentry(
            "get_swap_price",
            get_swap_price,
            reentrant_error("get_swap_price"),
        )?;
        let create_swap_quote = registry.async_method_with_reentry(
            "create_swap_quote",
            create_swap_quote,
            reentrant_error("create_swap_quote"),
        )?;
        let request_faucet = registry.async_method_with_reentry(
            "request_faucet",
            request_faucet,
            reentrant_error("request_faucet"),
        )?;
        let list_token_balances = registry.async_method_with_reentry(
            "list_token_balances",
            list_token_balances,
            reentrant_error("list_token_balances"),
        )?;
        let get_smart_account = registry.sync_method_with_reentry(
            "get_smart_account",
            get_smart_account,
            reentrant_error("get_smart_account"),
        )?;
        registry.instrument();
        Ok(Self {
            registry,
            get_swap_price,
            create_swap_quote,
            request_faucet,
            list_token_balances,
            get_smart_account,
        })
    }
}

impl EvmClient {
    pub fn new(api: Arc<CdpApi>, analytics: Analytics) -> Result<Self, CdpError> {
        let methods = Arc::new(EvmMethods::new(&analytics)?);
        let smart_account_methods = Arc::new(SmartAccountMethods::new(&analytics)?);
        Ok(Self {
            api,
            analytics,
            methods,
            smart_account_methods,
        })
    }

    /// Method table backing this client.
    pub fn registry(&self) -> &MethodRegistry<EvmClient> {
        &self.methods.registry
    }

    /// Indicative price for swapping `from_amount` (atomic units) of `from_token`.
    ///
    /// Fails with [`CdpError::InsufficientLiquidity`] when no route exists.
    pub async fn get_swap_price(&self, options: GetSwapPriceOptions) -> Result<SwapPrice, CdpError> {
        self.methods.get_swap_price.call(self, (options,)).await
    }

    /// Firm quote with the transaction to execute it. A route without
    /// liquidity yields [`SwapQuote::Unavailable`] rather than an error.
    pub async fn create_swap_quote(
        &self,
        options: CreateSwapQuoteOptions,
    ) -> Result<SwapQuote, CdpError> {
        self.methods.create_swap_quote.call(self, (options,)).await
    }

    /// Request testnet funds; returns the transaction hash.
    pub async fn request_faucet(
        &self,
        address: impl Into<String>,
        network: Network,
        token: impl Into<String>,
    ) -> Result<String, CdpError> {
        self.methods
            .request_faucet
            .call(self, (address.into(), network, token.into()))
            .await
    }

    pub async fn list_token_balances(
        &self,
        address: impl Into<String>,
        network: Network,
        page: PageOptions,
    ) -> Result<ListTokenBalancesResult, CdpError> {
        self.methods
            .list_token_balances
            .call(self, (address.into(), network, page))
            .await
    }

    /// A handle to an existing smart account owned by `owner`.
    pub fn get_smart_account(
        &self,
        address: impl Into<String>,
        owner: Arc<dyn Signer>,
    ) -> Result<EvmSmartAccount, CdpError> {
        self.methods
            .get_smart_account
            .call(self, (address.into(), owner))
    }
}

fn network_properties(network: Network) -> Option<Map<String, Value>> {
    let mut properties = Map::new();
    properties.insert("network".into(), json!(network.as_str()));
    Some(properties)
}

pub(crate) fn liquidity_available(value: &Value) -> bool {
    value
        .get("liquidityAvailable")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn validate_amount(amount: &str) -> Result<(), CdpError> {
    let parsed = parse_atomic(amount)?;
    if parsed == 0 {
        return Err(CdpError::UserInputValidation(
            "fromAmount must be greater than zero".into(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_faucet(network: Network, token: &str) -> Result<(), CdpError> {
    if !network.is_testnet() {
        return Err(CdpError::UserInputValidation(format!(
            "Faucet is only available on testnets, not {network}"
        )));
    }
    if !FAUCET_TOKENS.contains(&token) {
        return Err(CdpError::UserInputValidation(format!(
            "Unsupported faucet token: {token}"
        )));
    }
    Ok(())
}

/// Create a quote request and interpret a no-liquidity answer.
pub(crate) async fn quote(
    api: &CdpApi,
    options: &CreateSwapQuoteOptions,
) -> Result<SwapQuote, CdpError> {
    validate_amount(&options.from_amount)?;
    let request = CreateSwapQuoteRequest {
        network: options.network,
        from_token: options.from_token.clone(),
        to_token: options.to_token.clone(),
        from_amount: options.from_amount.clone(),
        taker: options.taker.clone(),
        signer_address: options.signer_address.clone(),
        gas_price: options.gas_price.clone(),
        slippage_bps: options.slippage_bps,
    };
    let value = api
        .create_swap_quote(&request, options.idempotency_key.as_deref())
        .await?;
    if !liquidity_available(&value) {
        debug!(
            "evm.create_swap_quote liquidity_available=false network={}",
            options.network
        );
        return Ok(SwapQuote::Unavailable(SwapUnavailableResult {
            liquidity_available: false,
        }));
    }
    let mut quote: QuoteSwapResult = serde_json::from_value(value)?;
    quote.network = Some(options.network);
    Ok(SwapQuote::Available(Box::new(quote)))
}

fn get_swap_price(
    client: &EvmClient,
    (options,): (GetSwapPriceOptions,),
) -> BoxFuture<'_, Result<SwapPrice, CdpError>> {
    async move {
        client.analytics.track_action(
            "get_swap_price",
            None,
            network_properties(options.network),
        );
        validate_amount(&options.from_amount)?;

        let value = client.api.get_swap_price(&options).await?;
        if !liquidity_available(&value) {
            return Err(CdpError::InsufficientLiquidity(format!(
                "no route from {} to {} on {}",
                options.from_token, options.to_token, options.network
            )));
        }
        let price: SwapPrice = serde_json::from_value(value)?;
        debug!(
            "evm.get_swap_price to_amount={} ratio={:?}",
            price.to_amount,
            price.price_ratio()
        );
        Ok(price)
    }
    .boxed()
}

fn create_swap_quote(
    client: &EvmClient,
    (options,): (CreateSwapQuoteOptions,),
) -> BoxFuture<'_, Result<SwapQuote, CdpError>> {
    async move {
        client.analytics.track_action(
            "create_swap_quote",
            None,
            network_properties(options.network),
        );
        quote(&client.api, &options).await
    }
    .boxed()
}

fn request_faucet(
    client: &EvmClient,
    (address, network, token): (String, Network, String),
) -> BoxFuture<'_, Result<String, CdpError>> {
    async move {
        client.analytics.track_action(
            "request_faucet",
            Some(AccountType::EvmServer),
            network_properties(network),
        );
        validate_faucet(network, &token)?;
        parse_address(&address)?;

        let request = FaucetRequest {
            address,
            network,
            token,
        };
        let response = client.api.request_faucet(&request).await?;
        Ok(response.transaction_hash)
    }
    .boxed()
}

fn list_token_balances(
    client: &EvmClient,
    (address, network, page): (String, Network, PageOptions),
) -> BoxFuture<'_, Result<ListTokenBalancesResult, CdpError>> {
    async move {
        client.analytics.track_action(
            "list_token_balances",
            Some(AccountType::EvmServer),
            network_properties(network),
        );
        parse_address(&address)?;
        client
            .api
            .list_token_balances(network, &address, &page)
            .await
    }
    .boxed()
}

fn get_smart_account(
    client: &EvmClient,
    (address, owner): (String, Arc<dyn Signer>),
) -> Result<EvmSmartAccount, CdpError> {
    client.analytics.track_action(
        "get_smart_account",
        Some(AccountType::EvmSmart),
        None,
    );
    parse_address(&address)?;
    Ok(EvmSmartAccount::new(
        address,
        owner,
        Arc::clone(&client.api),
        client.analytics.clone(),
        Arc::clone(&client.smart_account_methods),
    ))
}
