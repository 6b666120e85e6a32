use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw row shape of the `tasks` table. Document fields hold serialized
/// JSON text; decoding to [`crate::pipeline::types::Task`] happens in
/// [`super::mapping`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub object_key: String,
    pub region: String,
    pub size: i64,
    pub last_modified: String,
    pub status: String,
    pub provider_task_id: String,
    pub result_payload: String,
    pub chapters: String,
    pub summary: String,
    pub transcript: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
