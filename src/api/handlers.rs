use crate::api::responses::{
    HealthErrorCode, HealthErrorResponse, HealthStatus, HealthSuccessResponse, NodeStatusResponse,
    NodesErrorCode, NodesErrorResponse, NodesSuccessResponse,
};
use crate::sim::NodeSummary;
use crate::state::{AppState, RunStatus, SimulationSnapshot};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::error;

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Debug)]
enum TimestampError {
    Format(time::error::Format),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::Format(err) => write!(f, "timestamp format error: {err}"),
        }
    }
}

pub enum NodesResponse {
    Success(NodesSuccessResponse),
    Error {
        status: StatusCode,
        body: NodesErrorResponse,
    },
}

impl IntoResponse for NodesResponse {
    fn into_response(self) -> Response {
        match self {
            NodesResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            NodesResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_nodes(State(state): State<Arc<RwLock<AppState>>>) -> impl IntoResponse {
    build_nodes_response(state, SystemTime::now())
}

pub enum HealthResponse {
    Success {
        status: StatusCode,
        body: HealthSuccessResponse,
    },
    Error {
        status: StatusCode,
        body: HealthErrorResponse,
    },
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        match self {
            HealthResponse::Success { status, body } => (status, Json(body)).into_response(),
            HealthResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_health(State(state): State<Arc<RwLock<AppState>>>) -> impl IntoResponse {
    build_health_response(state, SystemTime::now())
}

fn format_timestamp(timestamp: SystemTime) -> Result<String, TimestampError> {
    let datetime = OffsetDateTime::from(timestamp);
    datetime.format(&Rfc3339).map_err(TimestampError::Format)
}

fn fallback_timestamp() -> String {
    format_timestamp(SystemTime::now()).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format error timestamp");
        OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    })
}

fn build_nodes_response(state: Arc<RwLock<AppState>>, now: SystemTime) -> NodesResponse {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return nodes_internal_error("state lock poisoned while reading snapshot");
        }
    };
    let profile = guard.profile().map(str::to_string);
    let snapshot = guard.snapshot().cloned();
    drop(guard);

    match snapshot {
        Some(snapshot) => nodes_success_response(profile, snapshot),
        None => nodes_no_data_response(now),
    }
}

fn nodes_success_response(profile: Option<String>, snapshot: SimulationSnapshot) -> NodesResponse {
    if !snapshot.channel_busy_ratio.is_finite() {
        return nodes_internal_error("channel busy ratio is not finite");
    }
    match format_timestamp(snapshot.timestamp) {
        Ok(timestamp) => NodesResponse::Success(NodesSuccessResponse {
            profile,
            sim_time_secs: snapshot.sim_time.as_secs_f64(),
            channel_busy_ratio: snapshot.channel_busy_ratio,
            nodes: snapshot.nodes.iter().map(map_node_summary).collect(),
            timestamp,
        }),
        Err(_err) => nodes_internal_error("timestamp formatting failure"),
    }
}

fn map_node_summary(summary: &NodeSummary) -> NodeStatusResponse {
    NodeStatusResponse {
        node_id: format!("node-{}", summary.node),
        state: summary.state.clone(),
        control: summary.control.clone(),
        beacon_interval_ms: summary.beacon_interval_ms,
        mean_beacon_gap_ms: summary.mean_beacon_gap_ms,
        busy_ratio: summary.last_busy_ratio.filter(|ratio| ratio.is_finite()),
        beacons_sent: summary.beacons_sent,
        state_changes: summary.state_changes,
        anomalies: summary.anomalies,
    }
}

fn nodes_no_data_response(now: SystemTime) -> NodesResponse {
    match format_timestamp(now) {
        Ok(formatted) => NodesResponse::Error {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: NodesErrorResponse {
                error_code: NodesErrorCode::NoData,
                error_message: "No simulation snapshot available".to_string(),
                timestamp: formatted,
            },
        },
        Err(_err) => nodes_internal_error("timestamp formatting failure"),
    }
}

fn nodes_internal_error(message: &str) -> NodesResponse {
    error!(
        message = message,
        "Internal error while handling /api/nodes"
    );
    NodesResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: NodesErrorResponse {
            error_code: NodesErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: fallback_timestamp(),
        },
    }
}

fn build_health_response(state: Arc<RwLock<AppState>>, now: SystemTime) -> HealthResponse {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return health_internal_error("state lock poisoned while reading status");
        }
    };
    let run_status = guard.status();
    let status = derive_health_status(run_status, guard.snapshot());
    drop(guard);

    let timestamp = match format_timestamp(now) {
        Ok(formatted) => formatted,
        Err(_) => {
            return health_internal_error("timestamp formatting failure");
        }
    };

    let status_code = match status {
        HealthStatus::Ko => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
    };

    HealthResponse::Success {
        status: status_code,
        body: HealthSuccessResponse {
            status,
            run_status,
            timestamp,
        },
    }
}

fn derive_health_status(
    run_status: RunStatus,
    snapshot: Option<&SimulationSnapshot>,
) -> HealthStatus {
    if run_status == RunStatus::Failed {
        return HealthStatus::Ko;
    }
    let Some(snapshot) = snapshot else {
        return HealthStatus::Ko;
    };
    if snapshot.nodes.is_empty() {
        return HealthStatus::Ko;
    }
    let troubled = snapshot
        .nodes
        .iter()
        .any(|node| node.anomalies > 0 || node.rejected_notifications > 0);
    if troubled {
        HealthStatus::Degraded
    } else {
        HealthStatus::Ok
    }
}

fn health_internal_error(message: &str) -> HealthResponse {
    error!(
        message = message,
        "Internal error while handling /api/health"
    );
    HealthResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: HealthErrorResponse {
            error_code: HealthErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: fallback_timestamp(),
        },
    }
}
