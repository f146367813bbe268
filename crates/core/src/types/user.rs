//! User identity returned by the backend.

use serde::{Deserialize, Serialize};

use super::id::UserId;

/// Minimal user-facing profile.
///
/// Owned by the session lifecycle manager and read-only everywhere else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Stable backend identifier.
    #[serde(rename = "_id")]
    pub id: UserId,
    /// Display name.
    pub username: String,
    /// Contact email, when the backend includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}
