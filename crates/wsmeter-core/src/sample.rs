//! Usage sample records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// SKU of standard workspace block storage.
pub const EFS_STORAGE_SKU: &str = "EFS-STORAGE-STD";

/// One storage consumption sample for one workspace.
///
/// Serialized as `{"id", "sampledAt", "sku", "user", "workspace", "rate"}`
/// with `sampledAt` in RFC 3339.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSample {
    pub id: Uuid,
    pub sampled_at: DateTime<Utc>,
    pub sku: String,
    pub user: Option<String>,
    pub workspace: String,
    /// Bytes stored.
    pub rate: u64,
}

impl UsageSample {
    /// Builds a storage sample with a fresh id.
    pub fn storage(workspace: impl Into<String>, sampled_at: DateTime<Utc>, bytes: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            sampled_at,
            sku: EFS_STORAGE_SKU.to_string(),
            user: None,
            workspace: workspace.into(),
            rate: bytes,
        }
    }
}
