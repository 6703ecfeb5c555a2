//! Health check handler

use axum::{extract::State, Json};

use crate::AppState;

/// Liveness plus a database round-trip
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let database = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.db)
        .await
        .is_ok();

    Json(serde_json::json!({
        "status": database,
        "database": if database { "up" } else { "down" },
    }))
}
