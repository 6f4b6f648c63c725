//! Low-level access to a MediaWiki Action API endpoint.

use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::error::ClientError;

/// Authentication strategy for the API.
#[derive(Clone, Debug)]
pub enum Auth {
    /// `Authorization: Bearer {token}` (OAuth 2 access token)
    Bearer(String),
    /// Anonymous requests; only reads work.
    Anonymous,
}

/// HTTP client bound to one `api.php` endpoint.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    api_url: String,
    auth: Auth,
}

impl ApiClient {
    pub fn new(api_url: impl Into<String>, auth: Auth, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("stashup/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            auth,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Auth::Bearer(token) => request.header("Authorization", format!("Bearer {}", token)),
            Auth::Anonymous => request,
        }
    }

    /// `action` and `format` travel in the query string for every request.
    fn base_query(action: &str) -> [(&'static str, String); 3] {
        [
            ("action", action.to_string()),
            ("format", "json".to_string()),
            ("formatversion", "2".to_string()),
        ]
    }

    /// GET with query parameters.
    pub async fn get(&self, action: &str, params: &[(&str, String)]) -> Result<Value, ClientError> {
        let request = self
            .client
            .get(&self.api_url)
            .query(&Self::base_query(action))
            .query(params);
        let response = self.apply_auth(request).send().await?;
        Self::parse(response).await
    }

    /// POST with a url-encoded form body.
    pub async fn post_form(
        &self,
        action: &str,
        params: &[(&str, String)],
    ) -> Result<Value, ClientError> {
        let request = self
            .client
            .post(&self.api_url)
            .query(&Self::base_query(action))
            .form(params);
        let response = self.apply_auth(request).send().await?;
        Self::parse(response).await
    }

    /// POST a multipart form (chunk uploads).
    pub async fn post_multipart(
        &self,
        action: &str,
        form: reqwest::multipart::Form,
    ) -> Result<Value, ClientError> {
        let request = self
            .client
            .post(&self.api_url)
            .query(&Self::base_query(action))
            .multipart(form);
        let response = self.apply_auth(request).send().await?;
        Self::parse(response).await
    }

    async fn parse(response: reqwest::Response) -> Result<Value, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        if let Some(error) = body.get("error") {
            let code = error
                .get("code")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            let info = error
                .get("info")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Err(ClientError::Api { code, info });
        }
        Ok(body)
    }

    /// Fetches a fresh CSRF token for write actions.
    pub async fn csrf_token(&self) -> Result<String, ClientError> {
        let body = self
            .get(
                "query",
                &[("meta", "tokens".to_string()), ("type", "csrf".to_string())],
            )
            .await?;
        body.pointer("/query/tokens/csrftoken")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ClientError::Decode("missing query.tokens.csrftoken".to_string()))
    }

    /// First page object of a `formatversion=2` query response.
    pub fn first_page(body: &Value) -> Option<&Value> {
        body.pointer("/query/pages/0")
    }
}
