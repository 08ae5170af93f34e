//! Access token endpoint
//!
//! WeCom issues application tokens from `GET /cgi-bin/gettoken` using the
//! corp id and the application's secret. The response is
//! `{errcode, errmsg, access_token, expires_in}`.
//!
//! `TokenSource` abstracts the fetch so `CredentialCache` does not care
//! whether tokens come from the platform or from a test double.

use std::future::Future;
use std::pin::Pin;

use common::Secret;
use serde::Deserialize;

use crate::api::{ApiError, call_with_retry};
use crate::constants::GETTOKEN_PATH;
use crate::error::Result;

/// Successful payload of the token endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Platform-side lifetime in seconds (informational; the cache uses its
    /// own configured interval)
    #[serde(default)]
    pub expires_in: u64,
}

/// Fetch a fresh access token with the platform retry protocol.
pub async fn fetch_token(
    client: &reqwest::Client,
    api_base: &str,
    corp_id: &str,
    corp_secret: &str,
    retry: u32,
) -> std::result::Result<TokenResponse, ApiError> {
    let url = format!("{}{GETTOKEN_PATH}", api_base.trim_end_matches('/'));
    call_with_retry("gettoken", retry, || {
        client
            .get(&url)
            .query(&[("corpid", corp_id), ("corpsecret", corp_secret)])
            .send()
    })
    .await
}

/// Source of fresh access tokens for `CredentialCache`.
///
/// Uses `Pin<Box<dyn Future>>` so the cache can hold `Arc<dyn TokenSource>`
/// and call it from its spawned refresh task.
pub trait TokenSource: Send + Sync {
    /// Obtain a new access token.
    fn fetch(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;
}

/// `TokenSource` backed by the WeCom token endpoint.
#[derive(Debug)]
pub struct CorpTokenSource {
    client: reqwest::Client,
    api_base: String,
    corp_id: String,
    corp_secret: Secret<String>,
    retry: u32,
}

impl CorpTokenSource {
    pub fn new(
        client: reqwest::Client,
        api_base: impl Into<String>,
        corp_id: impl Into<String>,
        corp_secret: Secret<String>,
        retry: u32,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into(),
            corp_id: corp_id.into(),
            corp_secret,
            retry,
        }
    }

    pub fn corp_id(&self) -> &str {
        &self.corp_id
    }
}

impl TokenSource for CorpTokenSource {
    fn fetch(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(async move {
            let response = fetch_token(
                &self.client,
                &self.api_base,
                &self.corp_id,
                self.corp_secret.expose(),
                self.retry,
            )
            .await?;
            Ok(response.access_token)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn token_response_deserializes() {
        let json = r#"{"errcode":0,"errmsg":"ok","access_token":"T1","expires_in":7200}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "T1");
        assert_eq!(token.expires_in, 7200);
    }

    #[tokio::test]
    async fn fetch_token_sends_corp_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/gettoken"))
            .and(query_param("corpid", "ww-corp"))
            .and(query_param("corpsecret", "app-secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errcode": 0,
                "errmsg": "ok",
                "access_token": "T1",
                "expires_in": 7200
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let token = fetch_token(&client, &server.uri(), "ww-corp", "app-secret", 2)
            .await
            .unwrap();
        assert_eq!(token.access_token, "T1");
    }

    #[tokio::test]
    async fn fetch_token_tolerates_trailing_slash_in_base() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/gettoken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errcode": 0,
                "access_token": "T2"
            })))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let base = format!("{}/", server.uri());
        let token = fetch_token(&client, &base, "c", "s", 0).await.unwrap();
        assert_eq!(token.access_token, "T2");
    }

    #[tokio::test]
    async fn corp_source_surfaces_platform_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/gettoken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "errcode": 40001,
                "errmsg": "invalid credential"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = CorpTokenSource::new(
            reqwest::Client::new(),
            server.uri(),
            "ww-corp",
            Secret::new("wrong".to_string()),
            3,
        );
        let err = source.fetch().await.unwrap_err();
        match err {
            Error::Api(api) => assert_eq!(api.code(), Some(40001)),
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[test]
    fn corp_source_debug_redacts_secret() {
        let source = CorpTokenSource::new(
            reqwest::Client::new(),
            "https://qyapi.weixin.qq.com",
            "ww-corp",
            Secret::new("top-secret".to_string()),
            0,
        );
        let debug = format!("{source:?}");
        assert!(debug.contains("ww-corp"));
        assert!(!debug.contains("top-secret"));
        assert_eq!(source.corp_id(), "ww-corp");
    }
}
