/// Price and quote a USDC -> WETH swap on Base.
///
/// Prints the indicative price first, then a firm quote with the transaction
/// the taker would submit.
use cdp_sdk::units::format_units;
use cdp_sdk::*;

const USDC: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";
const WETH: &str = "0x4200000000000000000000000000000000000006";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = CdpClient::from_env()?;
    let taker = std::env::var("TAKER_ADDRESS")
        .unwrap_or_else(|_| "0x1234567890123456789012345678901234567890".to_string());
    let from_amount = units::parse_units("100", 6)?.to_string();

    match client
        .evm()
        .get_swap_price(GetSwapPriceOptions {
            from_token: USDC.into(),
            to_token: WETH.into(),
            from_amount: from_amount.clone(),
            network: Network::Base,
            taker: taker.clone(),
            signer_address: None,
            gas_price: None,
            slippage_bps: Some(100),
        })
        .await
    {
        Ok(price) => {
            let to_amount = units::parse_atomic(&price.to_amount)?;
            println!("100 USDC -> {} WETH", format_units(to_amount, 18));
        }
        Err(CdpError::InsufficientLiquidity(msg)) => {
            println!("No liquidity: {msg}");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    let quote = client
        .evm()
        .create_swap_quote(CreateSwapQuoteOptions {
            from_token: USDC.into(),
            to_token: WETH.into(),
            from_amount,
            network: Network::Base,
            taker,
            signer_address: None,
            gas_price: None,
            slippage_bps: Some(100),
            idempotency_key: None,
        })
        .await?;

    match quote {
        SwapQuote::Available(quote) => {
            println!("Minimum received: {}", quote.min_to_amount);
            println!("Submit to: {}", quote.to().unwrap_or("-"));
            if quote.requires_signature() {
                println!("Permit2 signature required before submitting");
            }
            if let Some(allowance) = &quote.issues.allowance {
                println!(
                    "Approve {} first (current allowance {})",
                    allowance.spender, allowance.current_allowance
                );
            }
        }
        SwapQuote::Unavailable(_) => println!("Liquidity disappeared"),
    }
    Ok(())
}
