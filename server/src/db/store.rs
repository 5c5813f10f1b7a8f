//! Persistence collaborator consumed by the relay.
//!
//! Every call hops onto the blocking pool; the relay never holds the
//! database lock across an await point.

use std::collections::HashSet;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use relay_protocol::{ChannelInfo, ChannelKind, ChatMessage};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use super::models::{Character, FriendRequestRow, NewMessage};
use super::DbPool;
use crate::error::StoreError;

#[derive(Clone)]
pub struct Store {
    db: DbPool,
}

impl Store {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Poisoned)?;
            f(&conn)
        })
        .await?
    }

    // --- Characters ---

    pub async fn character(&self, id: &str) -> Result<Option<Character>, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, is_online, last_seen FROM characters WHERE id = ?1",
                    rusqlite::params![id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, bool>(2)?,
                            row.get::<_, Option<String>>(3)?,
                        ))
                    },
                )
                .optional()?;

            row.map(|(id, name, is_online, last_seen)| {
                Ok(Character {
                    id,
                    name,
                    is_online,
                    last_seen: last_seen.as_deref().map(parse_timestamp).transpose()?,
                })
            })
            .transpose()
        })
        .await
    }

    /// Display name for a character, "Unknown" if it does not exist.
    pub async fn display_name(&self, id: &str) -> Result<String, StoreError> {
        Ok(self
            .character(id)
            .await?
            .map(|c| c.name)
            .unwrap_or_else(|| "Unknown".to_string()))
    }

    pub async fn insert_character(&self, id: &str, name: &str) -> Result<(), StoreError> {
        let (id, name) = (id.to_string(), name.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO characters (id, name, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, name, format_timestamp(&Utc::now())],
            )?;
            Ok(())
        })
        .await
    }

    /// Returns false if the character does not exist.
    pub async fn rename_character(&self, id: &str, name: &str) -> Result<bool, StoreError> {
        let (id, name) = (id.to_string(), name.to_string());
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE characters SET name = ?2 WHERE id = ?1",
                rusqlite::params![id, name],
            )?;
            Ok(updated > 0)
        })
        .await
    }

    /// Record an online/offline transition and stamp last-seen.
    pub async fn set_online(&self, id: &str, online: bool) -> Result<(), StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE characters SET is_online = ?2, last_seen = ?3 WHERE id = ?1",
                rusqlite::params![id, online, format_timestamp(&Utc::now())],
            )?;
            Ok(())
        })
        .await
    }

    // --- Alliances ---

    pub async fn add_alliance_member(
        &self,
        alliance_id: &str,
        character_id: &str,
    ) -> Result<(), StoreError> {
        let (alliance_id, character_id) = (alliance_id.to_string(), character_id.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO alliance_members (alliance_id, character_id, joined_at)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![alliance_id, character_id, format_timestamp(&Utc::now())],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn remove_alliance_member(
        &self,
        alliance_id: &str,
        character_id: &str,
    ) -> Result<(), StoreError> {
        let (alliance_id, character_id) = (alliance_id.to_string(), character_id.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM alliance_members WHERE alliance_id = ?1 AND character_id = ?2",
                rusqlite::params![alliance_id, character_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn is_alliance_member(
        &self,
        alliance_id: &str,
        character_id: &str,
    ) -> Result<bool, StoreError> {
        let (alliance_id, character_id) = (alliance_id.to_string(), character_id.to_string());
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM alliance_members WHERE alliance_id = ?1 AND character_id = ?2",
                rusqlite::params![alliance_id, character_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
    }

    /// Current members of an alliance. Always read fresh, never cached.
    pub async fn alliance_roster(&self, alliance_id: &str) -> Result<HashSet<String>, StoreError> {
        let alliance_id = alliance_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare("SELECT character_id FROM alliance_members WHERE alliance_id = ?1")?;
            let roster = stmt
                .query_map(rusqlite::params![alliance_id], |row| row.get::<_, String>(0))?
                .collect::<Result<HashSet<_>, _>>()?;
            Ok(roster)
        })
        .await
    }

    // --- Friends ---

    /// Record a mutual friendship.
    pub async fn add_friendship(&self, a: &str, b: &str) -> Result<(), StoreError> {
        let (a, b) = (a.to_string(), b.to_string());
        self.with_conn(move |conn| {
            let now = format_timestamp(&Utc::now());
            for (x, y) in [(&a, &b), (&b, &a)] {
                conn.execute(
                    "INSERT OR IGNORE INTO friendships (character_id, friend_id, created_at)
                     VALUES (?1, ?2, ?3)",
                    rusqlite::params![x, y, now],
                )?;
            }
            Ok(())
        })
        .await
    }

    pub async fn friend_roster(&self, character_id: &str) -> Result<Vec<String>, StoreError> {
        let character_id = character_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT friend_id FROM friendships WHERE character_id = ?1")?;
            let friends = stmt
                .query_map(rusqlite::params![character_id], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(friends)
        })
        .await
    }

    pub async fn create_friend_request(
        &self,
        from_id: &str,
        to_id: &str,
    ) -> Result<FriendRequestRow, StoreError> {
        let request = FriendRequestRow {
            id: Uuid::now_v7().to_string(),
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            created_at: Utc::now().trunc_subsecs(6),
        };
        let row = request.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO friend_requests (id, from_id, to_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![row.id, row.from_id, row.to_id, format_timestamp(&row.created_at)],
            )?;
            Ok(())
        })
        .await?;
        Ok(request)
    }

    // --- Channels ---

    pub async fn create_channel(
        &self,
        name: &str,
        kind: ChannelKind,
        alliance_id: Option<&str>,
    ) -> Result<ChannelInfo, StoreError> {
        let channel = ChannelInfo {
            id: Uuid::now_v7().to_string(),
            name: name.to_string(),
            kind,
            alliance_id: alliance_id.map(str::to_string),
        };
        let row = channel.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO channels (id, name, channel_type, alliance_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    row.id,
                    row.name,
                    row.kind.as_str(),
                    row.alliance_id,
                    format_timestamp(&Utc::now())
                ],
            )?;
            Ok(())
        })
        .await?;
        Ok(channel)
    }

    pub async fn channel(&self, id: &str) -> Result<Option<ChannelInfo>, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, channel_type, alliance_id FROM channels WHERE id = ?1",
                    rusqlite::params![id],
                    channel_columns,
                )
                .optional()?;
            row.map(channel_from_columns).transpose()
        })
        .await
    }

    pub async fn channels(&self) -> Result<Vec<ChannelInfo>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, channel_type, alliance_id FROM channels ORDER BY created_at, id",
            )?;
            let rows = stmt
                .query_map([], channel_columns)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(channel_from_columns).collect()
        })
        .await
    }

    pub async fn world_channel(&self) -> Result<Option<ChannelInfo>, StoreError> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, channel_type, alliance_id FROM channels
                     WHERE channel_type = 'world' ORDER BY created_at, id LIMIT 1",
                    [],
                    channel_columns,
                )
                .optional()?;
            row.map(channel_from_columns).transpose()
        })
        .await
    }

    // --- Messages ---

    /// Persist a message, assigning its canonical id and timestamp.
    pub async fn create_message(&self, message: NewMessage) -> Result<ChatMessage, StoreError> {
        let persisted = ChatMessage {
            id: Uuid::now_v7().to_string(),
            channel_id: message.channel_id,
            sender_id: message.sender_id,
            sender_name: message.sender_name,
            content: message.content,
            created_at: Utc::now().trunc_subsecs(6),
            alliance_id: message.alliance_id,
            client_token: message.client_token,
        };
        let row = persisted.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO messages (id, channel_id, sender_id, sender_name, content, alliance_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    row.id,
                    row.channel_id,
                    row.sender_id,
                    row.sender_name,
                    row.content,
                    row.alliance_id,
                    format_timestamp(&row.created_at)
                ],
            )?;
            Ok(())
        })
        .await?;
        Ok(persisted)
    }

    /// Most recent non-empty messages of a channel, oldest first.
    pub async fn recent_messages(
        &self,
        channel_id: &str,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let channel_id = channel_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, channel_id, sender_id, sender_name, content, alliance_id, created_at
                 FROM messages
                 WHERE channel_id = ?1 AND trim(content) != ''
                 ORDER BY rowid DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![channel_id, limit], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            let mut messages = rows
                .into_iter()
                .map(
                    |(id, channel_id, sender_id, sender_name, content, alliance_id, created_at)| {
                        Ok(ChatMessage {
                            id,
                            channel_id,
                            sender_id,
                            sender_name,
                            content,
                            created_at: parse_timestamp(&created_at)?,
                            alliance_id,
                            client_token: None,
                        })
                    },
                )
                .collect::<Result<Vec<_>, StoreError>>()?;
            messages.reverse();
            Ok(messages)
        })
        .await
    }
}

type ChannelColumns = (String, String, String, Option<String>);

fn channel_columns(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChannelColumns> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn channel_from_columns(
    (id, name, channel_type, alliance_id): ChannelColumns,
) -> Result<ChannelInfo, StoreError> {
    let kind = channel_type
        .parse::<ChannelKind>()
        .map_err(|e| StoreError::Corrupt(format!("channel {}: {}", id, e)))?;
    Ok(ChannelInfo {
        id,
        name,
        kind,
        alliance_id,
    })
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {:?}: {}", s, e)))
}
