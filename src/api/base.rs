use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::ApiState;
use crate::node::NodeState;
use crate::settings::{APP_NAME, APP_VERSION};

// basic handler that responds with a static string
pub async fn root() -> &'static str {
    "Welcome to Starling"
}

/// OK only while the node is a group member
pub async fn health(State(state): State<ApiState>) -> (StatusCode, &'static str) {
    match state.current().state {
        NodeState::InGroup => (StatusCode::OK, "OK"),
        NodeState::NotStarted | NodeState::Joining => (StatusCode::SERVICE_UNAVAILABLE, "JOINING"),
        NodeState::BootstrapFailed | NodeState::Stopped => {
            (StatusCode::SERVICE_UNAVAILABLE, "DOWN")
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct AboutResponse {
    name: String,
    version: String,
}

impl Default for AboutResponse {
    fn default() -> Self {
        Self {
            name: APP_NAME.to_string(),
            version: APP_VERSION.to_string(),
        }
    }
}

#[instrument]
pub async fn about() -> axum::Json<AboutResponse> {
    axum::Json(AboutResponse::default())
}
