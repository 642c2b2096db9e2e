//! SQLite persistence for users, chatrooms, messages and text rooms.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::{
    error::{AppErr, AppResult},
    hub::ChatroomId,
    utils::password,
};

const SCHEMA: [&str; 5] = [
    "CREATE TABLE IF NOT EXISTS users (
        id       INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS chatrooms (
        id   INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS messages (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        chatroom_id INTEGER NOT NULL,
        user_id     INTEGER NOT NULL,
        content     TEXT NOT NULL,
        timestamp   TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS messages_room_ts ON messages (chatroom_id, timestamp)",
    "CREATE TABLE IF NOT EXISTS text_rooms (
        room_id         TEXT PRIMARY KEY,
        content         TEXT NOT NULL,
        content_history TEXT NOT NULL DEFAULT '[]',
        created_at      TEXT NOT NULL,
        updated_at      TEXT NOT NULL
    )",
];

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Chatroom {
    pub id:   ChatroomId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Message {
    pub id:          i64,
    pub chatroom_id: ChatroomId,
    pub user_id:     i64,
    pub content:     String,
    pub timestamp:   DateTime<Utc>,
}

/// A replaced text-room body, kept in `content_history` newest first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextRevision {
    pub timestamp: DateTime<Utc>,
    pub content:   String,
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(url: &str) -> AppResult<Self> {
        // `sqlite::memory:` is per-connection, so keep exactly one.
        let max = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new().max_connections(max).connect(url).await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> AppResult<()> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    /* ---------------- users ---------------- */
    pub async fn register(&self, username: &str, pwd: &str) -> AppResult<i64> {
        let pwd = pwd.to_string();
        let hashed = tokio::task::spawn_blocking(move || password::hash(&pwd))
            .await
            .map_err(|e| AppErr::Internal(e.to_string()))??;

        let res = sqlx::query("INSERT INTO users (username, password) VALUES (?, ?)")
            .bind(username)
            .bind(hashed)
            .execute(&self.pool)
            .await;

        match res {
            Ok(done) => Ok(done.last_insert_rowid()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(AppErr::Bad("username already taken".into()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn authenticate(&self, username: &str, pwd: &str) -> AppResult<i64> {
        let (id, stored): (i64, String) =
            sqlx::query_as("SELECT id, password FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| AppErr::Unauthorized("user does not exist".into()))?;

        let pwd = pwd.to_string();
        let ok = tokio::task::spawn_blocking(move || password::verify(&stored, &pwd))
            .await
            .map_err(|e| AppErr::Internal(e.to_string()))?;
        if !ok {
            return Err(AppErr::Unauthorized("invalid password".into()));
        }
        Ok(id)
    }

    /* ---------------- chatrooms ---------------- */
    pub async fn create_chatroom(&self, name: &str) -> AppResult<ChatroomId> {
        let done = sqlx::query("INSERT INTO chatrooms (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(done.last_insert_rowid())
    }

    pub async fn list_chatrooms(&self) -> AppResult<Vec<Chatroom>> {
        let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, name FROM chatrooms ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id, name)| Chatroom { id, name }).collect())
    }

    pub async fn chatroom_exists(&self, id: ChatroomId) -> AppResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM chatrooms WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /* ---------------- messages ---------------- */
    pub async fn append_message(&self, room: ChatroomId, sender: i64, content: &str) -> AppResult<Message> {
        let now = Utc::now();
        let done = sqlx::query(
            "INSERT INTO messages (chatroom_id, user_id, content, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(room)
        .bind(sender)
        .bind(content)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Message {
            id: done.last_insert_rowid(),
            chatroom_id: room,
            user_id: sender,
            content: content.to_string(),
            timestamp: now,
        })
    }

    /// Most recent first.
    pub async fn recent_messages(&self, room: ChatroomId, limit: i64) -> AppResult<Vec<Message>> {
        let rows: Vec<(i64, i64, i64, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, chatroom_id, user_id, content, timestamp
             FROM messages
             WHERE chatroom_id = ?
             ORDER BY timestamp DESC, id DESC
             LIMIT ?",
        )
        .bind(room)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, chatroom_id, user_id, content, timestamp)| Message {
                id, chatroom_id, user_id, content, timestamp,
            })
            .collect())
    }

    /* ---------------- text rooms ---------------- */
    pub async fn text_room(&self, room: &str) -> AppResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT content FROM text_rooms WHERE room_id = ?")
            .bind(room)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(c,)| c))
    }

    /// Creates the room, or replaces its body and pushes the old one onto the
    /// front of `content_history`. One transaction.
    pub async fn put_text_room(&self, room: &str, content: &str) -> AppResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let current: Option<(String, DateTime<Utc>, String)> = sqlx::query_as(
            "SELECT content, updated_at, content_history FROM text_rooms WHERE room_id = ?",
        )
        .bind(room)
        .fetch_optional(&mut *tx)
        .await?;

        match current {
            None => {
                sqlx::query(
                    "INSERT INTO text_rooms (room_id, content, content_history, created_at, updated_at)
                     VALUES (?, ?, '[]', ?, ?)",
                )
                .bind(room)
                .bind(content)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
            Some((old, updated_at, history)) => {
                let mut history: Vec<TextRevision> = serde_json::from_str(&history)
                    .map_err(|e| AppErr::Internal(format!("text room {room} history: {e}")))?;
                history.insert(0, TextRevision { timestamp: updated_at, content: old });
                let history = serde_json::to_string(&history)
                    .map_err(|e| AppErr::Internal(e.to_string()))?;

                sqlx::query(
                    "UPDATE text_rooms SET content = ?, content_history = ?, updated_at = ? WHERE room_id = ?",
                )
                .bind(content)
                .bind(history)
                .bind(now)
                .bind(room)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> Store {
        Store::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn register_and_login() {
        let s = store().await;
        let id = s.register("alice", "pw").await.unwrap();
        assert_eq!(s.authenticate("alice", "pw").await.unwrap(), id);
        assert!(matches!(s.authenticate("alice", "nope").await, Err(AppErr::Unauthorized(_))));
        assert!(matches!(s.authenticate("ghost", "pw").await, Err(AppErr::Unauthorized(_))));

        let (stored,): (String,) = sqlx::query_as("SELECT password FROM users WHERE id = ?")
            .bind(id)
            .fetch_one(&s.pool)
            .await
            .unwrap();
        assert!(stored.starts_with("$2"), "not a bcrypt hash: {stored}");
    }

    #[tokio::test]
    async fn duplicate_username_is_bad_request() {
        let s = store().await;
        s.register("bob", "x").await.unwrap();
        assert!(matches!(s.register("bob", "y").await, Err(AppErr::Bad(_))));
    }

    #[tokio::test]
    async fn chatrooms_roundtrip() {
        let s = store().await;
        let a = s.create_chatroom("general").await.unwrap();
        let b = s.create_chatroom("random").await.unwrap();
        let rooms = s.list_chatrooms().await.unwrap();
        assert_eq!(rooms, vec![
            Chatroom { id: a, name: "general".into() },
            Chatroom { id: b, name: "random".into() },
        ]);
        assert!(s.chatroom_exists(a).await.unwrap());
        assert!(!s.chatroom_exists(999).await.unwrap());
    }

    #[tokio::test]
    async fn recent_messages_newest_first_and_limited() {
        let s = store().await;
        for i in 0..5 {
            s.append_message(1, 1, &format!("m{i}")).await.unwrap();
        }
        s.append_message(2, 1, "other room").await.unwrap();

        let got: Vec<String> = s.recent_messages(1, 3).await.unwrap()
            .into_iter().map(|m| m.content).collect();
        assert_eq!(got, vec!["m4", "m3", "m2"]);
    }

    #[tokio::test]
    async fn text_room_keeps_replaced_bodies_newest_first() {
        let s = store().await;
        assert_eq!(s.text_room("notes").await.unwrap(), None);

        s.put_text_room("notes", "v1").await.unwrap();
        s.put_text_room("notes", "v2").await.unwrap();
        s.put_text_room("notes", "v3").await.unwrap();
        s.put_text_room("other", "x").await.unwrap();

        assert_eq!(s.text_room("notes").await.unwrap().as_deref(), Some("v3"));

        let (raw,): (String,) = sqlx::query_as("SELECT content_history FROM text_rooms WHERE room_id = ?")
            .bind("notes")
            .fetch_one(&s.pool)
            .await
            .unwrap();
        let history: Vec<TextRevision> = serde_json::from_str(&raw).unwrap();
        let bodies: Vec<&str> = history.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(bodies, vec!["v2", "v1"]);
        assert!(history[0].timestamp >= history[1].timestamp);
    }
}
