//! Response shapes shared by every provider: list envelopes and deletion
//! status.

use serde::{Deserialize, Deserializer, Serialize};

/// A page of items from a `List` call.
///
/// Deserializes from either a bare JSON array or an object envelope with a
/// `data` array and optional pagination cursors.
///
/// ```
/// use crudkit::client::ListResponse;
///
/// let bare: ListResponse<u32> = serde_json::from_str("[1, 2]").unwrap();
/// let wrapped: ListResponse<u32> =
///     serde_json::from_str(r#"{"data": [1, 2], "has_more": true, "last_id": "b"}"#).unwrap();
/// assert_eq!(bare.data, wrapped.data);
/// assert!(wrapped.has_more);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    pub has_more: bool,
    pub first_id: Option<String>,
    pub last_id: Option<String>,
}

impl<T> ListResponse<T> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<T> IntoIterator for ListResponse<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListWire<T> {
    Bare(Vec<T>),
    Envelope {
        data: Vec<T>,
        #[serde(default)]
        has_more: bool,
        #[serde(default)]
        first_id: Option<String>,
        #[serde(default)]
        last_id: Option<String>,
    },
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for ListResponse<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match ListWire::deserialize(deserializer)? {
            ListWire::Bare(data) => ListResponse {
                data,
                has_more: false,
                first_id: None,
                last_id: None,
            },
            ListWire::Envelope {
                data,
                has_more,
                first_id,
                last_id,
            } => ListResponse {
                data,
                has_more,
                first_id,
                last_id,
            },
        })
    }
}

// ── Deletion ───────────────────────────────────────────────────────

/// Tells whether a `Delete` response reports success.
pub trait DeletionStatus {
    fn is_deleted(&self) -> bool;
}

/// The common `{ "id": ..., "object": ..., "deleted": true }` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub deleted: bool,
}

impl DeletionStatus for DeleteResponse {
    fn is_deleted(&self) -> bool {
        self.deleted
    }
}

/// Untyped responses count as deleted unless they carry `"deleted": false`.
impl DeletionStatus for serde_json::Value {
    fn is_deleted(&self) -> bool {
        match self.get("deleted") {
            Some(flag) => flag.as_bool().unwrap_or(false),
            None => true,
        }
    }
}
