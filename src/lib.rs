//! Coinbase Developer Platform SDK for Rust.
//!
//! A client for the CDP REST API covering end users, EVM swaps, faucets,
//! token balances and smart-account user operations, with built-in usage and
//! error analytics.
//!
//! # What This SDK Provides
//!
//! - High-level client: [`CdpClient`]
//! - Typed REST API access: [`api::CdpApi`]
//! - Instrumented domain clients: [`EndUserClient`], [`EvmClient`], [`EvmSmartAccount`]
//! - Method interception with non-recursive error reporting: [`analytics::MethodRegistry`]
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use cdp_sdk::{AuthenticationMethod, CdpClient, CreateEndUserOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), cdp_sdk::CdpError> {
//!     let client = CdpClient::from_env()?;
//!
//!     let user = client
//!         .end_user()
//!         .create_end_user(CreateEndUserOptions {
//!             authentication_methods: vec![AuthenticationMethod::email("user@example.com")],
//!             ..Default::default()
//!         })
//!         .await?;
//!
//!     println!("created end user {}", user.user_id);
//!     Ok(())
//! }
//! ```
//!
//! # Common Tasks
//!
//! ## Swap Prices and Quotes
//!
//! ```rust,no_run
//! use cdp_sdk::{CdpClient, CreateSwapQuoteOptions, Network, SwapQuote};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), cdp_sdk::CdpError> {
//!     let client = CdpClient::from_env()?;
//!     let quote = client
//!         .evm()
//!         .create_swap_quote(CreateSwapQuoteOptions {
//!             from_token: "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913".into(),
//!             to_token: "0x4200000000000000000000000000000000000006".into(),
//!             from_amount: "100000000".into(),
//!             network: Network::Base,
//!             taker: "0x1234567890123456789012345678901234567890".into(),
//!             signer_address: None,
//!             gas_price: None,
//!             slippage_bps: Some(100),
//!             idempotency_key: None,
//!         })
//!         .await?;
//!
//!     match quote {
//!         SwapQuote::Available(quote) => println!("expect {}", quote.to_amount),
//!         SwapQuote::Unavailable(_) => println!("no liquidity"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Smart Account User Operations
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use cdp_sdk::{CdpClient, ContractCall, LocalAccount, Network, WaitOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), cdp_sdk::CdpError> {
//!     let client = CdpClient::from_env()?;
//!     let owner = Arc::new(LocalAccount::from_hex(&std::env::var("OWNER_KEY").unwrap())?);
//!     let account = client
//!         .evm()
//!         .get_smart_account("0x1234567890123456789012345678901234567890", owner)?;
//!
//!     let op = account
//!         .send_user_operation(
//!             vec![ContractCall::new("0x000000000000000000000000000000000000dEaD", "0", "0x")],
//!             Network::BaseSepolia,
//!             None,
//!         )
//!         .await?;
//!     let done = account
//!         .wait_for_user_operation(op.user_op_hash, WaitOptions::default())
//!         .await?;
//!     println!("status: {:?}", done.status);
//!     Ok(())
//! }
//! ```
//!
//! # Analytics
//!
//! Each public operation records an action event, and each trackable error
//! returned from an instrumented method records one error event. Set
//! `DISABLE_CDP_USAGE_TRACKING=true` or `DISABLE_CDP_ERROR_REPORTING=true` to
//! turn either stream off. See [`analytics`] for the interception rules and
//! [`analytics::is_trackable`] for the error taxonomy. To report a different
//! set of errors, build the client with [`CdpClient::with_analytics`] and an
//! [`Analytics`] handle carrying [`Analytics::with_policy`].
//!
//! # Logging
//!
//! This crate emits debug-level logs through the [`log`](https://docs.rs/log/) facade
//! for API and client calls. Configure any compatible logger in your binary, then set
//! `RUST_LOG=debug` to inspect request flow and retry behavior.
//!
//! # Errors
//!
//! All fallible operations return [`CdpError`]:
//!
//! - Caller input problems (`UserInputValidation`)
//! - Classified service rejections (`Api`, carrying an [`HttpErrorType`])
//! - Transport failures (`Network`)
//! - Swap and polling outcomes (`InsufficientLiquidity`, `Timeout`)
pub mod analytics;
pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod crypto;
pub mod end_user;
pub mod errors;
pub mod evm;
pub mod models;
pub mod smart_account;
pub mod units;

// Re-export primary types for convenience.
pub use analytics::{instrument, is_trackable, Analytics, EventSink, MethodRegistry};
pub use client::CdpClient;
pub use config::{AnalyticsConfig, CdpConfig, Network, RetryConfig};
pub use crypto::{LocalAccount, Signer};
pub use end_user::EndUserClient;
pub use errors::{CdpError, HttpErrorType};
pub use evm::EvmClient;
pub use models::*;
pub use smart_account::EvmSmartAccount;
