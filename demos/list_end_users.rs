/// Page through every end user, newest first.
use cdp_sdk::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = CdpClient::from_env()?;

    let mut page_token: Option<String> = None;
    let mut total = 0;
    loop {
        let page = client
            .end_user()
            .list_end_users(ListEndUsersOptions {
                page_size: Some(20),
                page_token: page_token.take(),
                sort: vec!["createdAt=desc".to_string()],
            })
            .await?;

        for user in &page.end_users {
            let emails: Vec<&str> = user
                .authentication_methods
                .iter()
                .filter_map(|method| match method {
                    AuthenticationMethod::Email { email } => Some(email.as_str()),
                    _ => None,
                })
                .collect();
            println!("{}  {}", user.user_id, emails.join(", "));
        }
        total += page.end_users.len();

        match page.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }

    println!("{total} end users");
    Ok(())
}
