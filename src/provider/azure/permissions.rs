//! # Azure Permissions Client
//!
//! `PermissionLister` backed by the Azure Resource Manager authorization API:
//!
//! - `GET /subscriptions/{sub}/resourceGroups/{group}/providers/Microsoft.Authorization/permissions`
//! - `GET /subscriptions/{sub}/resourceGroups/{group}/providers/{provider}/{parent}/{type}/{name}/providers/Microsoft.Authorization/permissions`
//!
//! Every request uses the configured subscription. Pages are fetched lazily,
//! following `nextLink` until it is absent.

use super::types::{ErrorResponse, PermissionListResult};
use crate::constants::AUTHORIZATION_API_VERSION;
use crate::controller::error::PermissionsError;
use crate::controller::resource_path::ResourceRef;
use crate::observability::metrics;
use crate::provider::{PermissionLister, PermissionPage, PermissionPages};
use anyhow::{Context, Result};
use azure_core::credentials::{TokenCredential, TokenRequestOptions};
use futures::stream::{self, StreamExt};
use reqwest::{Client, StatusCode, Url};
use std::sync::Arc;
use tracing::{debug, warn};

const AUTHORIZATION_PROVIDER: &str = "Microsoft.Authorization";

/// Metric label for resource group listings
const SCOPE_RESOURCE_GROUP: &str = "resourceGroup";
/// Metric label for resource listings
const SCOPE_RESOURCE: &str = "resource";

/// Azure authorization API client scoped to one subscription
pub struct AzurePermissionsClient {
    http_client: Client,
    credential: Arc<dyn TokenCredential>,
    endpoint: Url,
    subscription_id: String,
    token_scope: String,
}

impl std::fmt::Debug for AzurePermissionsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzurePermissionsClient")
            .field("endpoint", &self.endpoint.as_str())
            .field("subscription_id", &self.subscription_id)
            .finish_non_exhaustive()
    }
}

impl AzurePermissionsClient {
    /// Create a client for `subscription_id` against the given ARM endpoint
    pub fn new(
        endpoint: &str,
        subscription_id: &str,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Self> {
        let endpoint = endpoint.trim_end_matches('/');
        let token_scope = format!("{endpoint}/.default");
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("Invalid Azure Resource Manager endpoint: {endpoint}"))?;
        let http_client = Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            credential,
            endpoint,
            subscription_id: subscription_id.to_string(),
            token_scope,
        })
    }

    fn permissions_url(&self, scope_segments: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["subscriptions", self.subscription_id.as_str()])
                .extend(scope_segments.iter().filter(|s| !s.is_empty()))
                .extend(["providers", AUTHORIZATION_PROVIDER, "permissions"]);
        }
        url.query_pairs_mut()
            .append_pair("api-version", AUTHORIZATION_API_VERSION);
        url
    }

    /// URL of the first page for a resource group listing
    pub fn resource_group_url(&self, group: &str) -> Url {
        self.permissions_url(&["resourceGroups", group])
    }

    /// URL of the first page for a resource listing
    pub fn resource_url(&self, resource: &ResourceRef) -> Url {
        let mut scope = vec![
            "resourceGroups",
            resource.group.as_str(),
            "providers",
            resource.provider.as_str(),
        ];
        scope.extend(resource.parent_path.split('/'));
        scope.push(resource.resource_type.as_str());
        scope.push(resource.resource_name.as_str());
        self.permissions_url(&scope)
    }

    async fn bearer_token(&self) -> Result<String, PermissionsError> {
        let token = self
            .credential
            .get_token(
                &[self.token_scope.as_str()],
                Some(TokenRequestOptions::default()),
            )
            .await
            .map_err(|e| PermissionsError::Authentication(e.to_string()))?;
        Ok(token.token.secret().to_string())
    }

    /// Fetch one page and return it with the URL of the next one
    async fn fetch_page(
        &self,
        url: Url,
    ) -> Result<(PermissionPage, Option<Url>), PermissionsError> {
        let token = self.bearer_token().await?;

        debug!("GET {}", url);
        let response = self
            .http_client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| PermissionsError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PermissionsError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = error_message(&body);
            return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                PermissionsError::Throttled { message }
            } else {
                PermissionsError::Api {
                    status: status.as_u16(),
                    message,
                }
            });
        }

        let result: PermissionListResult =
            serde_json::from_str(&body).map_err(|e| PermissionsError::Decode(e.to_string()))?;

        let next = match result.next_link.as_deref() {
            Some(link) if !link.is_empty() => Some(
                Url::parse(link)
                    .map_err(|e| PermissionsError::Decode(format!("invalid nextLink: {e}")))?,
            ),
            _ => None,
        };

        let mut page = PermissionPage::default();
        for permission in result.value {
            page.allowed_actions.extend(permission.actions);
            page.denied_actions.extend(permission.not_actions);
        }
        Ok((page, next))
    }

    fn pages(&self, first: Url, scope: &'static str) -> PermissionPages<'_> {
        stream::try_unfold(Some(first), move |next| async move {
            let Some(url) = next else {
                return Ok(None);
            };
            metrics::increment_azure_requests(scope);
            match self.fetch_page(url).await {
                Ok((page, next)) => Ok(Some((page, next))),
                Err(e) => {
                    warn!("Azure permissions request failed: {}", e);
                    metrics::increment_azure_request_errors(e.kind().as_str());
                    Err(e)
                }
            }
        })
        .boxed()
    }
}

/// Prefer the ARM error message; fall back to the raw body
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(envelope) if !envelope.error.message.is_empty() => {
            if envelope.error.code.is_empty() {
                envelope.error.message
            } else {
                format!("{}: {}", envelope.error.code, envelope.error.message)
            }
        }
        _ => body.trim().to_string(),
    }
}

impl PermissionLister for AzurePermissionsClient {
    fn list_for_resource_group<'a>(&'a self, group: &'a str) -> PermissionPages<'a> {
        self.pages(self.resource_group_url(group), SCOPE_RESOURCE_GROUP)
    }

    fn list_for_resource<'a>(&'a self, resource: &'a ResourceRef) -> PermissionPages<'a> {
        self.pages(self.resource_url(resource), SCOPE_RESOURCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::error::ErrorKind;
    use azure_core::credentials::{AccessToken, Secret};
    use azure_core::time::{Duration, OffsetDateTime};
    use axum::extract::{Query, State};
    use axum::http::{HeaderMap, StatusCode as HttpStatus};
    use axum::routing::get;
    use axum::{Json, Router};
    use futures::TryStreamExt;
    use std::collections::HashMap;

    const SUBSCRIPTION: &str = "01234567-89ab-cdef-fedc-ba9876543210";

    /// Returns a fixed token without contacting Azure
    #[derive(Debug)]
    struct StaticTokenCredential;

    #[async_trait::async_trait]
    impl TokenCredential for StaticTokenCredential {
        async fn get_token(
            &self,
            _scopes: &[&str],
            _options: Option<TokenRequestOptions<'_>>,
        ) -> azure_core::Result<AccessToken> {
            Ok(AccessToken::new(
                Secret::new("test-token".to_string()),
                OffsetDateTime::now_utc() + Duration::seconds(3600),
            ))
        }
    }

    fn client(endpoint: &str) -> AzurePermissionsClient {
        AzurePermissionsClient::new(endpoint, SUBSCRIPTION, Arc::new(StaticTokenCredential))
            .unwrap()
    }

    /// Serve the authorization API on an ephemeral port and return its base URL
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_resource_group_url_uses_configured_subscription() {
        let url = client("https://management.azure.com/").resource_group_url("rg-test");
        assert_eq!(
            url.as_str(),
            format!(
                "https://management.azure.com/subscriptions/{SUBSCRIPTION}/resourceGroups/rg-test/providers/Microsoft.Authorization/permissions?api-version=2015-07-01"
            )
        );
    }

    #[test]
    fn test_resource_url_with_and_without_parent() {
        let c = client("https://management.azure.com");
        let mut resource = ResourceRef {
            subscription: "other-subscription".to_string(),
            group: "rg".to_string(),
            provider: "Microsoft.Network".to_string(),
            parent_path: String::new(),
            resource_type: "virtualNetworks".to_string(),
            resource_name: "vnet1".to_string(),
        };
        assert_eq!(
            c.resource_url(&resource).path(),
            format!(
                "/subscriptions/{SUBSCRIPTION}/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet1/providers/Microsoft.Authorization/permissions"
            )
        );

        resource.parent_path = "virtualNetworks/vnet1".to_string();
        resource.resource_type = "subnets".to_string();
        resource.resource_name = "default".to_string();
        assert_eq!(
            c.resource_url(&resource).path(),
            format!(
                "/subscriptions/{SUBSCRIPTION}/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet1/subnets/default/providers/Microsoft.Authorization/permissions"
            )
        );
    }

    #[test]
    fn test_error_message_prefers_arm_envelope() {
        assert_eq!(
            error_message(r#"{"error":{"code":"AuthorizationFailed","message":"denied"}}"#),
            "AuthorizationFailed: denied"
        );
        assert_eq!(error_message(" upstream timeout \n"), "upstream timeout");
    }

    #[tokio::test]
    async fn test_follows_next_link_across_pages() {
        async fn handler(
            State(base): State<Arc<tokio::sync::OnceCell<String>>>,
            Query(query): Query<HashMap<String, String>>,
            headers: HeaderMap,
        ) -> Json<serde_json::Value> {
            assert_eq!(
                headers.get("authorization").and_then(|v| v.to_str().ok()),
                Some("Bearer test-token")
            );
            let base = base.get().cloned().unwrap_or_default();
            if query.get("page").map(String::as_str) == Some("2") {
                Json(serde_json::json!({
                    "value": [{"actions": ["C"], "notActions": []}]
                }))
            } else {
                Json(serde_json::json!({
                    "value": [{"actions": ["A", "B"], "notActions": ["D"]}],
                    "nextLink": format!(
                        "{base}/subscriptions/{SUBSCRIPTION}/resourceGroups/rg-test/providers/Microsoft.Authorization/permissions?api-version=2015-07-01&page=2"
                    )
                }))
            }
        }

        let base_cell = Arc::new(tokio::sync::OnceCell::new());
        let router = Router::new()
            .route(
                "/subscriptions/{subscription}/resourceGroups/{group}/providers/Microsoft.Authorization/permissions",
                get(handler),
            )
            .with_state(base_cell.clone());
        let base = serve(router).await;
        base_cell.set(base.clone()).unwrap();

        let c = client(&base);
        let pages: Vec<PermissionPage> = c
            .list_for_resource_group("rg-test")
            .try_collect()
            .await
            .unwrap();

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].allowed_actions, vec!["A", "B"]);
        assert_eq!(pages[0].denied_actions, vec!["D"]);
        assert_eq!(pages[1].allowed_actions, vec!["C"]);
        assert!(pages[1].denied_actions.is_empty());
    }

    #[tokio::test]
    async fn test_throttled_response_maps_to_throttled_kind() {
        let router = Router::new().route(
            "/subscriptions/{subscription}/resourceGroups/{group}/providers/Microsoft.Authorization/permissions",
            get(|| async {
                (
                    HttpStatus::TOO_MANY_REQUESTS,
                    r#"{"error":{"code":"TooManyRequests","message":"slow down"}}"#,
                )
            }),
        );
        let base = serve(router).await;

        let c = client(&base);
        let mut pages = c.list_for_resource_group("rg-test");
        let err = pages.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Throttled);
        assert!(err.to_string().contains("slow down"));
        assert!(pages.next().await.is_none());
    }

    #[tokio::test]
    async fn test_forbidden_response_maps_to_api_kind() {
        let router = Router::new().route(
            "/subscriptions/{subscription}/resourceGroups/{group}/providers/Microsoft.Authorization/permissions",
            get(|| async { (HttpStatus::FORBIDDEN, "forbidden") }),
        );
        let base = serve(router).await;

        let err = client(&base)
            .list_for_resource_group("rg-test")
            .try_collect::<Vec<_>>()
            .await
            .unwrap_err();
        assert!(matches!(err, PermissionsError::Api { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_malformed_body_maps_to_decode_kind() {
        let router = Router::new().route(
            "/subscriptions/{subscription}/resourceGroups/{group}/providers/Microsoft.Authorization/permissions",
            get(|| async { "not json" }),
        );
        let base = serve(router).await;

        let err = client(&base)
            .list_for_resource_group("rg-test")
            .try_collect::<Vec<_>>()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_maps_to_transport_kind() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{addr}"))
            .list_for_resource_group("rg-test")
            .try_collect::<Vec<_>>()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
