//! REST client for the user service (PostgREST-style API) using a service key

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;

use crate::game::UserId;

use super::users::{StatKind, StoreError, UserRecord, UserStore};

/// Remote user record store
#[derive(Clone)]
pub struct RestUserStore {
    client: Client,
    base_url: String,
    service_key: String,
}

/// Body of the server-side increment procedure
#[derive(Debug, Serialize)]
struct IncrementStat {
    user_id: UserId,
    stat: StatKind,
}

impl RestUserStore {
    pub fn new(base_url: &str, service_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        }
    }

    /// Get the REST API URL for a table or procedure
    fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, path)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
            .header("Content-Type", "application/json")
    }

    async fn ensure_success(response: Response) -> Result<Response, StoreError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Api {
            status: status.as_u16(),
            body,
        })
    }

    /// Fetch a single user row
    pub async fn get_user(&self, user_id: UserId) -> Result<Option<UserRecord>, StoreError> {
        let url = format!("{}?id=eq.{}", self.rest_url("users"), user_id);

        let response = self
            .authed(self.client.get(&url))
            .header("Accept", "application/vnd.pgrst.object+json")
            .send()
            .await
            .map_err(StoreError::Request)?;

        if response.status() == reqwest::StatusCode::NOT_ACCEPTABLE {
            // No rows found
            return Ok(None);
        }

        let response = Self::ensure_success(response).await?;
        response.json().await.map(Some).map_err(StoreError::Parse)
    }

    /// Bump a counter through the server-side procedure, which runs the
    /// update as a single statement
    pub async fn increment_stat(&self, user_id: UserId, stat: StatKind) -> Result<(), StoreError> {
        let url = self.rest_url("rpc/increment_user_stat");

        let response = self
            .authed(self.client.post(&url))
            .json(&IncrementStat { user_id, stat })
            .send()
            .await
            .map_err(StoreError::Request)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(user_id));
        }

        Self::ensure_success(response).await.map(|_| ())
    }
}

impl UserStore for RestUserStore {
    fn find_by_id(&self, user_id: UserId) -> BoxFuture<'_, Result<Option<UserRecord>, StoreError>> {
        self.get_user(user_id).boxed()
    }

    fn increment(&self, user_id: UserId, stat: StatKind) -> BoxFuture<'_, Result<(), StoreError>> {
        self.increment_stat(user_id, stat).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_built_from_trimmed_base() {
        let store = RestUserStore::new("https://users.example.com/", "key");
        assert_eq!(
            store.rest_url("rpc/increment_user_stat"),
            "https://users.example.com/rest/v1/rpc/increment_user_stat"
        );
    }

    #[test]
    fn increment_body_names_the_column() {
        let body = serde_json::to_value(IncrementStat {
            user_id: 4,
            stat: StatKind::Loses,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"user_id": 4, "stat": "loses"}));
    }
}
