/// End-user management: create, list and validate access tokens.
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use log::debug;
use uuid::Uuid;

use crate::analytics::{reentrant_error, Analytics, AsyncMethod, MethodRegistry};
use crate::api::CdpApi;
use crate::errors::CdpError;
use crate::models::*;

/// Client for end users of the developer's project.
#[derive(Debug, Clone)]
pub struct EndUserClient {
    api: Arc<CdpApi>,
    analytics: Analytics,
    methods: Arc<EndUserMethods>,
}

#[derive(Debug)]
struct EndUserMethods {
    registry: MethodRegistry<EndUserClient>,
    create_end_user: AsyncMethod<EndUserClient, (CreateEndUserOptions,), EndUser>,
    list_end_users: AsyncMethod<EndUserClient, (ListEndUsersOptions,), ListEndUsersResult>,
    validate_access_token: AsyncMethod<EndUserClient, (String,), EndUser>,
}

impl EndUserMethods {
    fn new(analytics: &Analytics) -> Result<Self, CdpError> {
        let registry = analytics.registry::<EndUserClient>("EndUserClient");
        let create_end_user = registry.async_method_with_reentry(
            "create_end_user",
            create_end_user,
            reentrant_error("create_end_user"),
        )?;
        let list_end_users = registry.async_method_with_reentry(
            "list_end_users",
            list_end_users,
            reentrant_error("list_end_users"),
        )?;
        let validate_access_token = registry.async_method_with_reentry(
            "validate_access_token",
            validate_access_token,
            reentrant_error("validate_access_token"),
        )?;
        registry.instrument();
        Ok(Self {
            registry,
            create_end_user,
            list_end_users,
            validate_access_token,
        })
    }
}

impl EndUserClient {
    pub fn new(api: Arc<CdpApi>, analytics: Analytics) -> Result<Self, CdpError> {
        let methods = Arc::new(EndUserMethods::new(&analytics)?);
        Ok(Self {
            api,
            analytics,
            methods,
        })
    }

    /// Method table backing this client.
    pub fn registry(&self) -> &MethodRegistry<EndUserClient> {
        &self.methods.registry
    }

    /// Create an end user. A UUID v4 user id is generated when none is given.
    pub async fn create_end_user(&self, options: CreateEndUserOptions) -> Result<EndUser, CdpError> {
        self.methods.create_end_user.call(self, (options,)).await
    }

    /// List end users, oldest first unless `sort` says otherwise.
    pub async fn list_end_users(
        &self,
        options: ListEndUsersOptions,
    ) -> Result<ListEndUsersResult, CdpError> {
        self.methods.list_end_users.call(self, (options,)).await
    }

    /// Validate an end user's access token and return the user it belongs to.
    pub async fn validate_access_token(
        &self,
        access_token: impl Into<String>,
    ) -> Result<EndUser, CdpError> {
        self.methods
            .validate_access_token
            .call(self, (access_token.into(),))
            .await
    }
}

fn create_end_user(
    client: &EndUserClient,
    (options,): (CreateEndUserOptions,),
) -> BoxFuture<'_, Result<EndUser, CdpError>> {
    async move {
        client.analytics.track_action("create_end_user", None, None);

        if options.authentication_methods.is_empty() {
            return Err(CdpError::UserInputValidation(
                "At least one authentication method is required".into(),
            ));
        }
        let user_id = options
            .user_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        debug!("end_user.create_end_user user_id={}", user_id);

        let request = CreateEndUserRequest {
            user_id,
            authentication_methods: options.authentication_methods,
            evm_account: options.evm_account,
            solana_account: options.solana_account,
        };
        client.api.create_end_user(&request).await
    }
    .boxed()
}

fn list_end_users(
    client: &EndUserClient,
    (options,): (ListEndUsersOptions,),
) -> BoxFuture<'_, Result<ListEndUsersResult, CdpError>> {
    async move {
        client.analytics.track_action("list_end_users", None, None);

        let response = client
            .api
            .list_end_users(
                options.page_size,
                options.page_token.as_deref(),
                &options.sort,
            )
            .await?;
        Ok(ListEndUsersResult {
            end_users: response.end_users,
            next_page_token: response.next_page_token,
        })
    }
    .boxed()
}

fn validate_access_token(
    client: &EndUserClient,
    (access_token,): (String,),
) -> BoxFuture<'_, Result<EndUser, CdpError>> {
    async move {
        client
            .analytics
            .track_action("validate_access_token", None, None);

        if access_token.trim().is_empty() {
            return Err(CdpError::UserInputValidation(
                "Access token must not be empty".into(),
            ));
        }
        client.api.validate_end_user_access_token(&access_token).await
    }
    .boxed()
}
