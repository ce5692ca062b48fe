use serde::{Deserialize, Serialize};

use warehousex_infra::NewRequest;

// -------------------------
// Request DTOs
// -------------------------

/// Body of `POST /requests/inbound` and `POST /requests/outbound`.
#[derive(Debug, Deserialize)]
pub struct SubmitRequestBody {
    pub item_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub notes: Option<String>,
}

impl From<SubmitRequestBody> for NewRequest {
    fn from(body: SubmitRequestBody) -> Self {
        NewRequest {
            item_id: body.item_id,
            quantity: body.quantity,
            notes: body.notes.unwrap_or_default(),
        }
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend: &'static str,
}
