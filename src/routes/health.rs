use axum::Json;
use serde::Serialize;

use super::{data, Envelope};

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
}

pub async fn health_check() -> Json<Envelope<HealthStatus>> {
    data(HealthStatus { status: "ok" })
}
