#![cfg(feature = "integration")]
/// Integration tests for the CDP SDK against the live API.
///
/// These tests require network access and `CDP_API_KEY_ID` / `CDP_API_KEY_SECRET`.
/// Run with: cargo test --features integration --test integration_tests -- --test-threads=1
use serial_test::serial;

use cdp_sdk::*;

const USDC_BASE: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";
const WETH_BASE: &str = "0x4200000000000000000000000000000000000006";
const TAKER: &str = "0x1234567890123456789012345678901234567890";

fn client() -> CdpClient {
    CdpClient::from_env().expect("CDP credentials in env")
}

#[tokio::test]
#[serial]
async fn test_create_and_list_end_users() {
    let client = client();
    let email = format!("cdp-sdk-rust-{}@example.com", uuid::Uuid::new_v4());

    let user = client
        .end_user()
        .create_end_user(CreateEndUserOptions {
            authentication_methods: vec![AuthenticationMethod::email(email)],
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(!user.user_id.is_empty());

    let page = client
        .end_user()
        .list_end_users(ListEndUsersOptions {
            page_size: Some(5),
            sort: vec!["createdAt=desc".into()],
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(!page.end_users.is_empty());
}

#[tokio::test]
#[serial]
async fn test_swap_price_and_quote() {
    let client = client();

    let price = client
        .evm()
        .get_swap_price(GetSwapPriceOptions {
            from_token: USDC_BASE.into(),
            to_token: WETH_BASE.into(),
            from_amount: "1000000".into(),
            network: Network::Base,
            taker: TAKER.into(),
            signer_address: None,
            gas_price: None,
            slippage_bps: Some(100),
        })
        .await
        .unwrap();
    assert!(price.liquidity_available);
    eprintln!("price ratio: {:?}", price.price_ratio());

    let quote = client
        .evm()
        .create_swap_quote(CreateSwapQuoteOptions {
            from_token: USDC_BASE.into(),
            to_token: WETH_BASE.into(),
            from_amount: "1000000".into(),
            network: Network::Base,
            taker: TAKER.into(),
            signer_address: None,
            gas_price: None,
            slippage_bps: Some(100),
            idempotency_key: None,
        })
        .await
        .unwrap();
    if let SwapQuote::Available(quote) = quote {
        assert!(quote.to().is_some());
    }
}

#[tokio::test]
#[serial]
async fn test_faucet_and_balances() {
    let client = client();
    let account = client.generate_account();

    let tx_hash = client
        .evm()
        .request_faucet(account.address(), Network::BaseSepolia, "eth")
        .await
        .unwrap();
    assert!(tx_hash.starts_with("0x"));

    let balances = client
        .evm()
        .list_token_balances(account.address(), Network::BaseSepolia, PageOptions::default())
        .await
        .unwrap();
    eprintln!("{} balances", balances.balances.len());
}
