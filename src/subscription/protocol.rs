use crate::reading::Reading;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SNAPSHOT_MESSAGE_TYPE: &str = "air_quality_update";

/// Server → Client: readings produced in one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub data: Vec<Reading>,
    pub timestamp: DateTime<Utc>,
}

impl SnapshotMessage {
    pub fn new(data: Vec<Reading>, timestamp: DateTime<Utc>) -> Self {
        Self {
            msg_type: SNAPSHOT_MESSAGE_TYPE.to_string(),
            data,
            timestamp,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
