//! Thin HTTP helpers shared by the catalog and the resolver.

use bytes::Bytes;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{FetchError, UpdateError};

const USER_AGENT: &str = concat!("pack-formats/", env!("CARGO_PKG_VERSION"));

/// Builds the HTTP client used for catalog, descriptor and archive fetches.
///
/// ## Errors
///
/// Returns [`UpdateError::Client`] if the TLS backend cannot be initialized.
pub fn http_client() -> Result<Client, UpdateError> {
    Ok(Client::builder().user_agent(USER_AGENT).build()?)
}

/// Fetches `url` and returns the raw body.
///
/// ## Errors
///
/// - [`FetchError::Status`] on a non-success status
/// - [`FetchError::Transport`] if the request or body read fails
pub async fn fetch_bytes(client: &Client, url: &str) -> Result<Bytes, FetchError> {
    debug!("GET {url}");
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    response.bytes().await.map_err(|source| FetchError::Transport {
        url: url.to_string(),
        source,
    })
}

/// Fetches `url` and decodes the body as JSON.
///
/// ## Errors
///
/// As [`fetch_bytes`], plus [`FetchError::Decode`] if the body is not a `T`.
pub async fn fetch_json<T: DeserializeOwned>(client: &Client, url: &str) -> Result<T, FetchError> {
    let body = fetch_bytes(client, url).await?;
    serde_json::from_slice(&body).map_err(|source| FetchError::Decode {
        url: url.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_json_decodes_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let client = http_client().unwrap();
        let value: Value = fetch_json(&client, &format!("{}/doc.json", server.uri()))
            .await
            .unwrap();
        assert_eq!(value["ok"], Value::Bool(true));
    }

    #[tokio::test]
    async fn non_success_status_is_a_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = http_client().unwrap();
        let url = format!("{}/gone.jar", server.uri());
        let err = fetch_bytes(&client, &url).await.unwrap_err();
        match err {
            FetchError::Status { url: failed, status } => {
                assert_eq!(failed, url);
                assert_eq!(status, 404);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn malformed_json_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = http_client().unwrap();
        let err = fetch_json::<Value>(&client, &server.uri()).await.unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
    }
}
