//! HTTP implementation of the repository facade.
//!
//! Speaks to two base URLs: a delivery endpoint for reads (bearer preview
//! key, `?depth`/`?language` query parameters, a `used-in` reverse-reference
//! listing) and a management endpoint for mutations (bearer management key,
//! codename-addressed items and variants). All vendor request/response
//! shaping lives here; nothing above this module sees a wire DTO.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::RepositoryConfig;
use crate::error::RepositoryError;
use crate::recast_reqwest_client;
use crate::types::{
    ContentTypeInfo, ElementData, ElementPayload, ItemSnapshot, ItemSystem, ManagedItem,
    ManagedVariant, MigrationItem, VariantElement,
};

#[derive(Debug, Clone)]
pub struct HttpRepository {
    http: reqwest::Client,
    config: RepositoryConfig,
}

impl HttpRepository {
    pub fn new(config: RepositoryConfig) -> Self {
        Self {
            http: recast_reqwest_client(),
            config,
        }
    }

    fn delivery_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.delivery_base_url.trim_end_matches('/'),
            self.config.environment_id,
            path
        )
    }

    fn management_url(&self, path: &str) -> String {
        format!(
            "{}/v2/projects/{}/{}",
            self.config.management_base_url.trim_end_matches('/'),
            self.config.environment_id,
            path
        )
    }

    async fn delivery_get(&self, url: &str) -> Result<reqwest::Response, RepositoryError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.config.preview_api_key)
            .send()
            .await?;
        check_status(response, url).await
    }

    async fn management_request(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, RepositoryError> {
        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(&self.config.management_api_key);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        check_status(response, url).await
    }
}

/// Maps an error-status response onto the facade taxonomy.
async fn check_status(
    response: reqwest::Response,
    resource: &str,
) -> Result<reqwest::Response, RepositoryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(RepositoryError::not_found(resource));
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        return Err(RepositoryError::RateLimited { retry_after_secs });
    }
    let body = response.text().await.unwrap_or_default();
    Err(RepositoryError::Api {
        status: status.as_u16(),
        body,
    })
}

/// Collapses a per-operation NotFound into `Ok(None)`.
fn optional<T>(result: Result<T, RepositoryError>) -> Result<Option<T>, RepositoryError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

#[derive(Deserialize)]
struct WireDeliveryItem {
    system: ItemSystem,
    #[serde(default)]
    elements: BTreeMap<String, ElementData>,
}

#[derive(Deserialize)]
struct WireDeliveryResponse {
    item: WireDeliveryItem,
    #[serde(default)]
    modular_content: BTreeMap<String, WireDeliveryItem>,
}

impl From<WireDeliveryResponse> for ItemSnapshot {
    fn from(wire: WireDeliveryResponse) -> Self {
        ItemSnapshot {
            system: wire.item.system,
            elements: wire.item.elements,
            linked_items: wire
                .modular_content
                .into_iter()
                .map(|(codename, item)| (codename, item.system))
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct WireUsedIn {
    #[serde(default)]
    items: Vec<WireUsedInItem>,
}

#[derive(Deserialize)]
struct WireUsedInItem {
    system: ItemSystem,
}

#[derive(Deserialize)]
struct WireTypeRef {
    id: String,
}

#[derive(Deserialize)]
struct WireManagedItem {
    id: String,
    name: String,
    codename: String,
    #[serde(rename = "type")]
    item_type: WireTypeRef,
}

impl From<WireManagedItem> for ManagedItem {
    fn from(wire: WireManagedItem) -> Self {
        ManagedItem {
            id: wire.id,
            name: wire.name,
            codename: wire.codename,
            type_id: wire.item_type.id,
        }
    }
}

#[derive(Deserialize)]
struct WireVariantElementRef {
    id: String,
}

#[derive(Deserialize)]
struct WireVariantElement {
    element: WireVariantElementRef,
    #[serde(default)]
    value: serde_json::Value,
}

#[derive(Deserialize)]
struct WireItemRef {
    id: String,
}

#[derive(Deserialize)]
struct WireVariant {
    item: WireItemRef,
    #[serde(default)]
    elements: Vec<WireVariantElement>,
}

impl From<WireVariant> for ManagedVariant {
    fn from(wire: WireVariant) -> Self {
        ManagedVariant {
            item_id: wire.item.id,
            elements: wire
                .elements
                .into_iter()
                .map(|e| VariantElement {
                    element_id: e.element.id,
                    value: e.value,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl super::ContentRepository for HttpRepository {
    async fn fetch_item(
        &self,
        codename: &str,
        language: Option<&str>,
        depth: u8,
    ) -> Result<Option<ItemSnapshot>, RepositoryError> {
        let mut url = self.delivery_url(&format!("items/{codename}?depth={depth}"));
        if let Some(language) = language {
            url.push_str(&format!("&language={language}"));
        }
        let result = async {
            let response = self.delivery_get(&url).await?;
            let wire: WireDeliveryResponse = response.json().await?;
            Ok(ItemSnapshot::from(wire))
        }
        .await;
        optional(result)
    }

    async fn fetch_type_schema(
        &self,
        codename: &str,
    ) -> Result<ContentTypeInfo, RepositoryError> {
        let url = self.management_url(&format!("types/codename/{codename}"));
        let response = self
            .management_request(reqwest::Method::GET, &url, None)
            .await?;
        Ok(response.json().await?)
    }

    async fn fetch_type_schema_by_id(&self, id: &str) -> Result<ContentTypeInfo, RepositoryError> {
        let url = self.management_url(&format!("types/{id}"));
        let response = self
            .management_request(reqwest::Method::GET, &url, None)
            .await?;
        Ok(response.json().await?)
    }

    async fn fetch_referenced_by(
        &self,
        codename: &str,
    ) -> Result<Vec<MigrationItem>, RepositoryError> {
        let url = self.delivery_url(&format!("items/{codename}/used-in"));
        let response = self.delivery_get(&url).await?;
        let wire: WireUsedIn = response.json().await?;
        Ok(wire
            .items
            .into_iter()
            .map(|i| MigrationItem {
                id: i.system.id,
                name: i.system.name,
                codename: i.system.codename,
                type_codename: i.system.type_codename,
            })
            .collect())
    }

    async fn view_item(&self, codename: &str) -> Result<Option<ManagedItem>, RepositoryError> {
        let url = self.management_url(&format!("items/codename/{codename}"));
        let result = async {
            let response = self
                .management_request(reqwest::Method::GET, &url, None)
                .await?;
            let wire: WireManagedItem = response.json().await?;
            Ok(ManagedItem::from(wire))
        }
        .await;
        optional(result)
    }

    async fn create_item(
        &self,
        name: &str,
        codename: Option<&str>,
        type_codename: &str,
    ) -> Result<ManagedItem, RepositoryError> {
        let url = self.management_url("items");
        let mut body = json!({
            "name": name,
            "type": { "codename": type_codename },
        });
        if let Some(codename) = codename {
            body["codename"] = json!(codename);
        }
        let response = self
            .management_request(reqwest::Method::POST, &url, Some(body))
            .await?;
        let wire: WireManagedItem = response.json().await?;
        Ok(wire.into())
    }

    async fn view_variant(
        &self,
        item_codename: &str,
        language: &str,
    ) -> Result<Option<ManagedVariant>, RepositoryError> {
        let url = self.management_url(&format!(
            "items/codename/{item_codename}/variants/codename/{language}"
        ));
        let result = async {
            let response = self
                .management_request(reqwest::Method::GET, &url, None)
                .await?;
            let wire: WireVariant = response.json().await?;
            Ok(ManagedVariant::from(wire))
        }
        .await;
        optional(result)
    }

    async fn upsert_variant(
        &self,
        item_codename: &str,
        language: &str,
        elements: &[ElementPayload],
    ) -> Result<(), RepositoryError> {
        let url = self.management_url(&format!(
            "items/codename/{item_codename}/variants/codename/{language}"
        ));
        let body = json!({ "elements": elements });
        self.management_request(reqwest::Method::PUT, &url, Some(body))
            .await?;
        Ok(())
    }

    async fn create_new_version(
        &self,
        item_codename: &str,
        language: &str,
    ) -> Result<(), RepositoryError> {
        let url = self.management_url(&format!(
            "items/codename/{item_codename}/variants/codename/{language}/new-version"
        ));
        self.management_request(reqwest::Method::PUT, &url, None)
            .await?;
        Ok(())
    }

    async fn publish(&self, item_id: &str, language: &str) -> Result<(), RepositoryError> {
        let url = self.management_url(&format!(
            "items/{item_id}/variants/codename/{language}/publish"
        ));
        self.management_request(reqwest::Method::PUT, &url, None)
            .await?;
        Ok(())
    }
}
