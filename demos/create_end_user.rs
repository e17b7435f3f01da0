/// Create an end user with email authentication and a smart account.
///
/// Reads `CDP_API_KEY_ID` and `CDP_API_KEY_SECRET` from the environment.
use cdp_sdk::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = CdpClient::from_env()?;

    let email = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "user@example.com".to_string());

    let user = client
        .end_user()
        .create_end_user(CreateEndUserOptions {
            authentication_methods: vec![AuthenticationMethod::email(email)],
            evm_account: Some(CreateEndUserAccount {
                create_smart_account: true,
            }),
            ..Default::default()
        })
        .await?;

    println!("User id: {}", user.user_id);
    for address in &user.evm_accounts {
        println!("EVM account: {address}");
    }
    for address in &user.evm_smart_accounts {
        println!("Smart account: {address}");
    }
    Ok(())
}
