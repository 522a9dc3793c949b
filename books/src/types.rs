//! Wire types of the book search API

use reader_core::book::BookItem;
use serde::{Deserialize, Serialize};

/// Response of `GET /volumes`
///
/// The API omits `items` entirely when nothing matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumesResponse {
    /// Resource kind reported by the API (`books#volumes`)
    #[serde(default)]
    pub kind: String,
    /// Total number of matches on the server
    #[serde(default)]
    pub total_items: u64,
    /// Matches on this page
    #[serde(default)]
    pub items: Option<Vec<BookItem>>,
}

impl VolumesResponse {
    /// Matches on this page; an absent `items` field is an empty page
    #[must_use]
    pub fn into_items(self) -> Vec<BookItem> {
        self.items.unwrap_or_default()
    }
}
