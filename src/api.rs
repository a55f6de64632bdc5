use std::collections::HashMap;
use std::sync::Arc;

use shuttle_axum::axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;

use crate::model::{CanonicalUpgrade, UpgradeStatus};
use crate::store::OutputStore;

#[derive(Clone)]
pub struct AppState {
    pub output: Arc<dyn OutputStore>,
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(output: Arc<dyn OutputStore>) -> Self {
        Self {
            output,
            prometheus: None,
        }
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }
}

/// Read-only surface over the canonical feed.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/upgrades", get(list_upgrades))
        .route("/metrics", get(render_metrics))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn list_upgrades(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Result<Json<Vec<CanonicalUpgrade>>, (StatusCode, String)> {
    let project = q
        .get("project")
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty());
    let status = match q.get("status").map(|s| s.trim()).filter(|s| !s.is_empty()) {
        Some(raw) => match UpgradeStatus::from_detected(raw) {
            Some(s) => Some(s),
            None => {
                return Err((StatusCode::BAD_REQUEST, format!("unknown status '{raw}'")));
            }
        },
        None => None,
    };

    let mut rows: Vec<CanonicalUpgrade> = state
        .output
        .all()
        .await
        .into_iter()
        .filter(|r| project.as_deref().map_or(true, |p| r.project.eq_ignore_ascii_case(p)))
        .filter(|r| status.map_or(true, |s| r.status == s))
        .collect();
    rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(Json(rows))
}

async fn render_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.prometheus {
        Some(h) => (StatusCode::OK, h.render()),
        None => (StatusCode::NOT_FOUND, "metrics disabled".to_string()),
    }
}
