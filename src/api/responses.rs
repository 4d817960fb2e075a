use crate::state::RunStatus;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct NodesSuccessResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    pub sim_time_secs: f64,
    pub channel_busy_ratio: f64,
    pub nodes: Vec<NodeStatusResponse>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct NodeStatusResponse {
    pub node_id: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beacon_interval_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_beacon_gap_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub busy_ratio: Option<f64>,
    pub beacons_sent: u64,
    pub state_changes: u64,
    pub anomalies: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct NodesErrorResponse {
    pub error_code: NodesErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Ko,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthSuccessResponse {
    pub status: HealthStatus,
    pub run_status: RunStatus,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthErrorResponse {
    pub error_code: HealthErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthErrorCode {
    InternalError,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodesErrorCode {
    NoData,
    InternalError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(control: Option<&str>) -> NodeStatusResponse {
        NodeStatusResponse {
            node_id: "node-3".to_string(),
            state: "active".to_string(),
            control: control.map(str::to_string),
            beacon_interval_ms: Some(500.0),
            mean_beacon_gap_ms: None,
            busy_ratio: Some(0.25),
            beacons_sent: 12,
            state_changes: 1,
            anomalies: 0,
        }
    }

    #[test]
    fn node_status_omits_missing_fields() {
        let value = serde_json::to_value(node(None)).expect("serialize node status");
        assert_eq!(
            value,
            json!({
                "node_id": "node-3",
                "state": "active",
                "beacon_interval_ms": 500.0,
                "busy_ratio": 0.25,
                "beacons_sent": 12,
                "state_changes": 1,
                "anomalies": 0
            })
        );
    }

    #[test]
    fn nodes_success_response_nests_nodes() {
        let response = NodesSuccessResponse {
            profile: Some("beacon_rate_3".to_string()),
            sim_time_secs: 12.5,
            channel_busy_ratio: 0.3,
            nodes: vec![node(Some("interval 500ms"))],
            timestamp: "2026-01-11T12:30:00Z".to_string(),
        };

        let value = serde_json::to_value(response).expect("serialize nodes response");
        assert_eq!(value["profile"], json!("beacon_rate_3"));
        assert_eq!(value["sim_time_secs"], json!(12.5));
        assert_eq!(value["nodes"][0]["control"], json!("interval 500ms"));
        assert_eq!(value["timestamp"], json!("2026-01-11T12:30:00Z"));
    }

    #[test]
    fn nodes_error_response_uses_screaming_snake_case_code() {
        let response = NodesErrorResponse {
            error_code: NodesErrorCode::NoData,
            error_message: "no snapshot yet".to_string(),
            timestamp: "2026-01-11T12:32:00Z".to_string(),
        };

        let value = serde_json::to_value(response).expect("serialize error response");
        assert_eq!(
            value,
            json!({
                "error_code": "NO_DATA",
                "error_message": "no snapshot yet",
                "timestamp": "2026-01-11T12:32:00Z"
            })
        );
    }

    #[test]
    fn health_success_response_serializes_statuses() {
        let response = HealthSuccessResponse {
            status: HealthStatus::Degraded,
            run_status: RunStatus::Running,
            timestamp: "2026-01-11T12:33:00Z".to_string(),
        };

        let value = serde_json::to_value(response).expect("serialize health response");
        assert_eq!(
            value,
            json!({
                "status": "degraded",
                "run_status": "running",
                "timestamp": "2026-01-11T12:33:00Z"
            })
        );
    }

    #[test]
    fn health_error_response_uses_screaming_snake_case_code() {
        let response = HealthErrorResponse {
            error_code: HealthErrorCode::InternalError,
            error_message: "boom".to_string(),
            timestamp: "2026-01-11T12:34:00Z".to_string(),
        };

        let value = serde_json::to_value(response).expect("serialize health error");
        assert_eq!(
            value,
            json!({
                "error_code": "INTERNAL_ERROR",
                "error_message": "boom",
                "timestamp": "2026-01-11T12:34:00Z"
            })
        );
    }
}
