//! HTTP front door: the CMS webhook and a liveness route.

use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use postrelay_shared::{ArticleRef, PostRelayError, PublishOutcome, Result};

use crate::pipeline::{Pipeline, PipelineError, RunReport, SilentProgress};

/// Status token for a payload that names no usable article id.
pub const MALFORMED_PAYLOAD: &str = "payload_invalido";

/// Static liveness text.
pub const LIVENESS: &str = concat!("postrelay ", env!("CARGO_PKG_VERSION"), " is running");

/// JSON body of every webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcomes: Option<Vec<PublishOutcome>>,
}

impl WebhookResponse {
    fn status(status: &'static str) -> Self {
        Self {
            status,
            stage: None,
            detail: None,
            outcomes: None,
        }
    }
}

/// Build the router. `webhook_path` is the configured POST route.
pub fn router(pipeline: Arc<Pipeline>, webhook_path: &str) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route(webhook_path, post(receive))
        .with_state(pipeline)
}

async fn liveness() -> &'static str {
    LIVENESS
}

async fn receive(State(pipeline): State<Arc<Pipeline>>, body: Bytes) -> Response {
    let article = match parse_post_id(&body) {
        Ok(article) => article,
        Err(e) => {
            warn!(error = %e, "rejected webhook payload");
            return (
                StatusCode::BAD_REQUEST,
                Json(WebhookResponse {
                    detail: Some(e.to_string()),
                    ..WebhookResponse::status(MALFORMED_PAYLOAD)
                }),
            )
                .into_response();
        }
    };

    info!(post_id = %article, "webhook received");
    let (status, response) = match pipeline.run(&article, &SilentProgress).await {
        Ok(report) => {
            let status = report.status_token();
            let outcomes = match report {
                RunReport::Completed(result) => Some(result.outcomes),
                RunReport::Duplicate => None,
            };
            (
                StatusCode::OK,
                WebhookResponse {
                    outcomes,
                    ..WebhookResponse::status(status)
                },
            )
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, error_response(e)),
    };

    (status, Json(response)).into_response()
}

fn error_response(err: PipelineError) -> WebhookResponse {
    let status = err.status_token();
    let stage = Some(err.stage().as_str());
    let detail = Some(err.to_string());
    let outcomes = match err {
        PipelineError::FanoutTotalFailure(result) => Some(result.outcomes),
        _ => None,
    };

    WebhookResponse {
        status,
        stage,
        detail,
        outcomes,
    }
}

/// Extract the article id from a webhook body.
///
/// Accepts `{"post_id": 42}`, `{"post_id": "42"}` or either wrapped in a
/// single-element array. Ids must be positive integers.
pub fn parse_post_id(body: &[u8]) -> Result<ArticleRef> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| PostRelayError::parse(format!("body is not JSON: {e}")))?;

    let object = match &value {
        Value::Array(items) => items
            .first()
            .ok_or_else(|| PostRelayError::validation("payload array is empty"))?,
        other => other,
    };

    let raw = object
        .get("post_id")
        .ok_or_else(|| PostRelayError::validation("payload has no post_id"))?;

    let id = match raw {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
    .filter(|id| *id > 0)
    .ok_or_else(|| PostRelayError::validation(format!("post_id {raw} is not a positive integer")))?;

    Ok(ArticleRef::new(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fakes;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use postrelay_shared::{FetchError, Platform, TargetError};
    use tower::ServiceExt;

    fn app(fakes: Fakes) -> Router {
        let (pipeline, _calls) = fakes.build();
        router(Arc::new(pipeline), "/webhook-receiver")
    }

    async fn post_json(app: Router, body: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook-receiver")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn post_id_shapes() {
        assert_eq!(parse_post_id(br#"{"post_id": 42}"#).unwrap().id(), "42");
        assert_eq!(parse_post_id(br#"{"post_id": " 42 "}"#).unwrap().id(), "42");
        assert_eq!(parse_post_id(br#"[{"post_id": 7}]"#).unwrap().id(), "7");
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        let bodies: [&[u8]; 10] = [
            b"not json",
            br#"[]"#,
            br#"{}"#,
            br#"{"post_id": 0}"#,
            br#"{"post_id": -3}"#,
            br#"{"post_id": 4.5}"#,
            br#"{"post_id": ""}"#,
            br#"{"post_id": "abc"}"#,
            br#"{"post_id": null}"#,
            br#"{"id": 42}"#,
        ];
        for body in bodies {
            assert!(parse_post_id(body).is_err(), "accepted {:?}", String::from_utf8_lossy(body));
        }
    }

    #[tokio::test]
    async fn example_delivery_answers_sucesso() {
        let (status, body) = post_json(app(Fakes::default()), r#"{"post_id": 42}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "sucesso");
        assert_eq!(body["outcomes"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn duplicate_delivery_answers_duplicado() {
        let (pipeline, _calls) = Fakes::default().build();
        let app = router(Arc::new(pipeline), "/webhook-receiver");

        let (_, first) = post_json(app.clone(), r#"{"post_id": 42}"#).await;
        assert_eq!(first["status"], "sucesso");

        let (status, second) = post_json(app, r#"[{"post_id": "42"}]"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second, serde_json::json!({"status": "duplicado"}));
    }

    #[tokio::test]
    async fn malformed_payload_is_400() {
        let (status, body) = post_json(app(Fakes::default()), r#"{"post": 1}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], MALFORMED_PAYLOAD);
    }

    #[tokio::test]
    async fn stage_failure_is_500_with_stage() {
        let fakes = Fakes {
            fetch: Err(FetchError::NotFound { id: "42".into() }),
            ..Fakes::default()
        };
        let (status, body) = post_json(app(fakes), r#"{"post_id": 42}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "erro_processamento_wp");
        assert_eq!(body["stage"], "content_fetch");
        assert!(body["detail"].as_str().unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn total_fanout_failure_reports_outcomes() {
        let fakes = Fakes {
            targets: vec![(
                Platform::FacebookPage,
                Some("1"),
                Err(TargetError::Api {
                    status: 400,
                    body: r#"{"error":{"code":190}}"#.into(),
                }),
            )],
            ..Fakes::default()
        };
        let (status, body) = post_json(app(fakes), r#"{"post_id": 42}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "erro_publicacao_redes");
        assert_eq!(body["outcomes"][0]["state"], "FAILED");
        assert!(body["outcomes"][0]["detail"].as_str().unwrap().contains("190"));
    }

    #[tokio::test]
    async fn liveness_route_answers_200() {
        let response = app(Fakes::default())
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes, LIVENESS.as_bytes());
    }
}
