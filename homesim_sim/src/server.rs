//! HTTP transport for the control facade.
//!
//! Routes:
//! - `GET /devices` - every entity keyed by id
//! - `GET /device/:id` - one entity
//! - `POST /device/:id/set` - shallow merge of a JSON object body
//! - `GET|POST /device/:id/turn-on`, `/turn-off`, `/toggle`
//! - `GET /healthz`

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use homesim_core::{Entity, HomeController, HomeError};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Maps facade errors onto status codes.
#[derive(Debug)]
pub struct ApiError(HomeError);

impl From<HomeError> for ApiError {
    fn from(err: HomeError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            HomeError::NotFound(_) => (StatusCode::NOT_FOUND, "Device not found".to_string()),
            HomeError::InvalidOperation { reason, .. } => (StatusCode::CONFLICT, reason.clone()),
            other => {
                error!("Request failed: {other}");
                (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Builds the router with `controller` as shared state.
pub fn router(controller: HomeController) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/devices", get(list_devices))
        .route("/device/:id", get(get_device))
        .route("/device/:id/set", axum::routing::post(set_device))
        .route("/device/:id/turn-on", get(turn_on).post(turn_on))
        .route("/device/:id/turn-off", get(turn_off).post(turn_off))
        .route("/device/:id/toggle", get(toggle).post(toggle))
        .layer(TraceLayer::new_for_http())
        .with_state(controller)
}

/// Serves `router(controller)` on `listener` until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    controller: HomeController,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!("Control surface listening on http://{addr}");

    axum::serve(listener, router(controller))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Control surface stopped");
    Ok(())
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_devices(State(controller): State<HomeController>) -> Json<BTreeMap<String, Entity>> {
    Json(controller.list_devices())
}

async fn get_device(
    State(controller): State<HomeController>,
    Path(id): Path<String>,
) -> ApiResult<Entity> {
    Ok(Json(controller.get(&id)?))
}

async fn set_device(
    State(controller): State<HomeController>,
    Path(id): Path<String>,
    Json(fields): Json<Map<String, Value>>,
) -> ApiResult<Value> {
    let device = controller.merge_update(&id, fields)?;
    Ok(Json(json!({ "message": "Device updated", "device": device })))
}

async fn turn_on(
    State(controller): State<HomeController>,
    Path(id): Path<String>,
) -> ApiResult<Entity> {
    Ok(Json(controller.activate(&id)?))
}

async fn turn_off(
    State(controller): State<HomeController>,
    Path(id): Path<String>,
) -> ApiResult<Entity> {
    Ok(Json(controller.deactivate(&id)?))
}

async fn toggle(
    State(controller): State<HomeController>,
    Path(id): Path<String>,
) -> ApiResult<Entity> {
    Ok(Json(controller.toggle(&id)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use homesim_core::{Catalog, SharedRegistry};
    use tower::ServiceExt;

    fn app() -> (Router, HomeController) {
        let registry = SharedRegistry::from_catalog(Catalog::default_home()).unwrap();
        let controller = HomeController::new(registry);
        (router(controller.clone()), controller)
    }

    async fn send(
        app: Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = app.oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_list_devices() {
        let (app, _) = app();
        let (status, body) = send(app, Method::GET, "/devices", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_object().unwrap().len(), 14);
        assert_eq!(body["heater"]["type"], "control");
        assert_eq!(body["light_sensor"]["value"], 100.0);
    }

    #[tokio::test]
    async fn test_unknown_device_is_404() {
        let (app, _) = app();
        let (status, body) = send(app, Method::GET, "/device/ghost", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "Device not found" }));
    }

    #[tokio::test]
    async fn test_set_merges_fields() {
        let (app, controller) = app();
        let (status, body) = send(
            app,
            Method::POST,
            "/device/tv/set",
            Some(json!({ "activated": true, "channel": "news" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Device updated");
        assert_eq!(body["device"]["channel"], "news");
        assert_eq!(controller.get("tv").unwrap().activated(), Some(true));
    }

    #[tokio::test]
    async fn test_set_rejects_sensor_value() {
        let (app, controller) = app();
        let (status, body) = send(
            app,
            Method::POST,
            "/device/light_sensor/set",
            Some(json!({ "value": 5 })),
        )
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].is_string());
        assert_eq!(controller.sensor_value("light_sensor").unwrap(), 100.0);
    }

    #[tokio::test]
    async fn test_turn_on_accepts_get_and_post() {
        let (app, controller) = app();

        let (status, body) = send(app.clone(), Method::GET, "/device/tv/turn-on", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["activated"], true);

        let (status, _) = send(app, Method::POST, "/device/tv/turn-off", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(controller.get("tv").unwrap().activated(), Some(false));
    }

    #[tokio::test]
    async fn test_toggle_sensor_is_409() {
        let (app, _) = app();
        let (status, _) = send(app, Method::POST, "/device/temperature_sensor/toggle", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_healthz() {
        let (app, _) = app();
        let (status, body) = send(app, Method::GET, "/healthz", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let (_, controller) = app();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let shutdown = CancellationToken::new();

        let server = tokio::spawn(serve(listener, controller, shutdown.clone()));
        shutdown.cancel();

        server.await.unwrap().unwrap();
    }
}
