/// Database row types. These correspond to the SQLite schema in migrations.rs.
use chrono::{DateTime, Utc};

/// Character record in the characters table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

/// A message about to be persisted. Id and timestamp are assigned on insert.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub channel_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    pub alliance_id: Option<String>,
    pub client_token: Option<String>,
}

/// Pending friend request
#[derive(Debug, Clone)]
pub struct FriendRequestRow {
    pub id: String,
    pub from_id: String,
    pub to_id: String,
    pub created_at: DateTime<Utc>,
}
