pub mod error;
pub mod item;

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Url;
use serde::de::DeserializeOwned;

pub use error::FirebaseClientError;
pub use item::Item;

/// Upstream source of candidate ids and item records.
///
/// Workers only see this trait so pipeline logic can be tested against scripted failures
/// without network access.
pub trait ItemSource: Send + Sync {
    /// Ids of the current top stories, in upstream rank order.
    fn list_top_identifiers(&self) -> BoxFuture<'_, Result<Vec<i64>, FirebaseClientError>>;

    /// Full record for one id. `Ok(None)` means the upstream has no such item.
    fn get_item(&self, item_id: i64) -> BoxFuture<'_, Result<Option<Item>, FirebaseClientError>>;
}

impl<T> ItemSource for Arc<T>
where
    T: ItemSource + ?Sized,
{
    fn list_top_identifiers(&self) -> BoxFuture<'_, Result<Vec<i64>, FirebaseClientError>> {
        (**self).list_top_identifiers()
    }

    fn get_item(&self, item_id: i64) -> BoxFuture<'_, Result<Option<Item>, FirebaseClientError>> {
        (**self).get_item(item_id)
    }
}

/// HTTP client for the Hacker News Firebase API.
pub struct FirebaseClient {
    client: reqwest::Client,
    base_url: String,
}

impl FirebaseClient {
    /// `timeout` bounds each individual request, not a whole ingestion run.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FirebaseClientError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(FirebaseClientError::Config("base URL cannot be empty".to_string()));
        }
        Url::parse(base_url)
            .map_err(|err| FirebaseClientError::Config(format!("invalid base URL: {err}")))?;

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    pub async fn get_top_stories(&self) -> Result<Vec<i64>, FirebaseClientError> {
        let url = format!("{}/topstories.json", self.base_url);
        self.get_json::<Option<Vec<i64>>>(&url, "topstories")
            .await
            .map(Option::unwrap_or_default)
    }

    pub async fn fetch_item(&self, item_id: i64) -> Result<Option<Item>, FirebaseClientError> {
        let url = format!("{}/item/{}.json", self.base_url, item_id);
        self.get_json(&url, &format!("item {item_id}")).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        resource: &str,
    ) -> Result<T, FirebaseClientError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FirebaseClientError::UnexpectedStatus {
                resource: resource.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.json::<T>().await.map_err(Into::into)
    }
}

impl ItemSource for FirebaseClient {
    fn list_top_identifiers(&self) -> BoxFuture<'_, Result<Vec<i64>, FirebaseClientError>> {
        Box::pin(self.get_top_stories())
    }

    fn get_item(&self, item_id: i64) -> BoxFuture<'_, Result<Option<Item>, FirebaseClientError>> {
        Box::pin(self.fetch_item(item_id))
    }
}

#[cfg(test)]
mod tests {
    use super::{FirebaseClient, FirebaseClientError};
    use std::time::Duration;

    #[test]
    fn empty_base_url_is_rejected() {
        let err = FirebaseClient::new("  ", Duration::from_secs(1))
            .err()
            .expect("empty base URL should be rejected");
        assert!(matches!(err, FirebaseClientError::Config(_)));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = FirebaseClient::new("http://localhost:1234/v0/", Duration::from_secs(1))
            .expect("valid URL should build a client");
        assert_eq!(client.base_url, "http://localhost:1234/v0");
    }
}
