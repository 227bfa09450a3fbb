use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response for diagnostics information
#[derive(Serialize, Deserialize, ToSchema)]
pub struct DiagnosticsResponse {
    pub service: String,
    pub n_hubs: u32,
    pub n_sessions: u32,
    pub n_participants: u32,
    pub n_delivered: u64,
    pub n_evicted: u64,
    pub cpu_usage: f32,
    pub memory_alloc: u64,
    pub memory_total: u64,
    pub memory_free: u64,
}
