// Persistence endpoint request/response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SaveRequest {
    #[serde(rename = "serializedDocument")]
    pub serialized_document: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SaveResponse {
    pub success: bool,
    /// File name of the rotated previous copy; `None` on the first save.
    #[serde(rename = "backupFile", default)]
    pub backup_file: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn response_round_trips_wire_names() {
        let wire = json!({
            "success": true,
            "backupFile": "design-20260101T000000000Z.json",
            "timestamp": "2026-01-01T00:00:00Z"
        });
        let response: SaveResponse = serde_json::from_value(wire.clone()).unwrap();
        assert_eq!(response.backup_file.as_deref(), Some("design-20260101T000000000Z.json"));
        assert_eq!(serde_json::to_value(&response).unwrap(), wire);
    }
}
