use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use super::AdminState;
use crate::resilience::{CircuitState, CircuitStats};

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub circuits: usize,
    pub open_circuits: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let snapshot = state.registry.snapshot();
    let open_circuits = snapshot
        .iter()
        .filter(|c| c.state != CircuitState::Closed)
        .count();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if open_circuits == 0 { "operational" } else { "degraded" },
        circuits: snapshot.len(),
        open_circuits,
    })
}

pub async fn get_circuits(State(state): State<AdminState>) -> Json<Vec<CircuitStats>> {
    Json(state.registry.snapshot())
}

pub async fn get_circuit(
    State(state): State<AdminState>,
    Path(identifier): Path<String>,
) -> Result<Json<CircuitStats>, StatusCode> {
    state
        .registry
        .find(&identifier)
        .map(|circuit| Json(circuit.stats()))
        .ok_or(StatusCode::NOT_FOUND)
}
