use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ApiState;
use crate::membership::Tick;
use crate::node::{EngineStats, MemberView, NodeState};

pub async fn membership(State(state): State<ApiState>) -> Json<Vec<MemberView>> {
    Json(state.current().members)
}

#[derive(Clone, Debug, Serialize)]
pub struct StatusResponse {
    pub node: String,
    pub state: NodeState,
    pub tick: Tick,
    pub heartbeat: i64,
    pub live_members: usize,
    pub known_members: usize,
    pub started_at: DateTime<Utc>,
    pub stats: EngineStats,
}

pub async fn status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let view = state.current();
    Json(StatusResponse {
        live_members: view.live_members(),
        known_members: view.members.len(),
        node: view.node,
        state: view.state,
        tick: view.tick,
        heartbeat: view.heartbeat,
        started_at: state.started_at,
        stats: view.stats,
    })
}
