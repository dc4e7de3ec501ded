use crate::error::AppResult;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let committed = state.store.committed_captures().await?;
    let pending = state.store.pending_scratch_count().await?;

    let handled = metrics.captures_received + metrics.total_failures();
    let failure_rate = if handled > 0 {
        metrics.total_failures() as f64 / handled as f64
    } else {
        0.0
    };

    Ok(HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "audio": {
            "sample_rate": config.audio.sample_rate,
            "sample_format": config.audio.sample_format,
            "channels": crate::audio::container::CHANNELS
        },
        "connections": {
            "active": metrics.active_connections,
            "total": metrics.total_connections
        },
        "captures": {
            "received": metrics.captures_received,
            "committed": metrics.captures_committed,
            "discarded": metrics.captures_discarded,
            "pending": pending,
            "stored": committed.len()
        },
        "failures": {
            "invalid_payload": metrics.invalid_payloads,
            "unexpected_message": metrics.unexpected_messages,
            "storage_failure": metrics.storage_failures,
            "commit_failure": metrics.commit_failures,
            "rate": failure_rate
        },
        "storage": {
            "output_dir": state.store.output_dir().display().to_string(),
            "scratch_dir": state.store.scratch_dir().display().to_string()
        }
    })))
}
