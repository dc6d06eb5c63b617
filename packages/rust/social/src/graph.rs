//! Minimal Graph API transport shared by the Meta publishers.

use std::time::Duration;

use postrelay_shared::{PostRelayError, Result, TargetError};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::USER_AGENT;

/// Versioned Graph API root plus the page access token.
pub struct GraphClient {
    client: Client,
    api_root: String,
    access_token: String,
}

impl GraphClient {
    /// `api_root` is `<base>/<version>`, e.g. `https://graph.facebook.com/v19.0`.
    pub fn new(api_root: String, access_token: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| PostRelayError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_root: api_root.trim_end_matches('/').to_string(),
            access_token,
        })
    }

    /// POST to `/{path}` with parameters in the query string.
    pub async fn post(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> std::result::Result<Value, TargetError> {
        let request = self
            .client
            .post(self.url(path))
            .query(params)
            .query(&[("access_token", self.access_token.as_str())]);
        Self::send(request).await
    }

    /// GET `/{path}` with query parameters.
    pub async fn get(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> std::result::Result<Value, TargetError> {
        let request = self
            .client
            .get(self.url(path))
            .query(params)
            .query(&[("access_token", self.access_token.as_str())]);
        Self::send(request).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_root, path.trim_start_matches('/'))
    }

    async fn send(request: reqwest::RequestBuilder) -> std::result::Result<Value, TargetError> {
        let response = request
            .send()
            .await
            .map_err(|e| TargetError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TargetError::Transport(e.to_string()))?;

        if !status.is_success() {
            debug!(status = status.as_u16(), %body, "graph api error");
            return Err(TargetError::Api {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| TargetError::Transport(format!("invalid response body: {e}")))
    }
}

/// Read a string field, accepting numeric ids too.
pub(crate) fn str_field(value: &Value, field: &'static str) -> std::result::Result<String, TargetError> {
    match value.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(TargetError::MissingField(field)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn post_sends_token_and_params_in_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v19.0/123/photos"))
            .and(query_param("url", "https://h/x.jpg"))
            .and(query_param("access_token", "tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "1"})))
            .expect(1)
            .mount(&server)
            .await;

        let graph = GraphClient::new(
            format!("{}/v19.0/", server.uri()),
            "tok".into(),
            Duration::from_secs(5),
        )
        .expect("client");
        let value = graph
            .post("123/photos", &[("url", "https://h/x.jpg")])
            .await
            .expect("post");
        assert_eq!(str_field(&value, "id").expect("id"), "1");
    }

    #[tokio::test]
    async fn error_body_is_kept_verbatim() {
        let server = MockServer::start().await;
        let body = r#"{"error":{"message":"Error validating access token","code":190}}"#;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_string(body))
            .mount(&server)
            .await;

        let graph =
            GraphClient::new(server.uri(), "expired".into(), Duration::from_secs(5)).expect("client");
        match graph.get("me", &[]).await.unwrap_err() {
            TargetError::Api { status, body: got } => {
                assert_eq!(status, 400);
                assert_eq!(got, body);
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn str_field_accepts_numbers() {
        let v = serde_json::json!({"id": 17841, "empty": ""});
        assert_eq!(str_field(&v, "id").expect("id"), "17841");
        assert!(matches!(str_field(&v, "empty"), Err(TargetError::MissingField("empty"))));
        assert!(matches!(str_field(&v, "nope"), Err(TargetError::MissingField("nope"))));
    }
}
