//! Room → live connection membership.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::HubError;

pub type ChatroomId = i64;
pub type ConnId = u64;

/// Write half of one client connection.
///
/// Implementations serialise their own writes, so two broadcasts to the same
/// room never interleave bytes on one socket.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send_text(&self, text: &str) -> Result<(), HubError>;
    async fn close(&self);
}

/// Handle to a live connection as seen by the registry. Cloning is cheap and
/// does not extend the session: the owning ChatSession decides when it closes.
#[derive(Clone)]
pub struct Connection {
    id:   ConnId,
    sink: Arc<dyn FrameSink>,
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

impl Connection {
    pub fn new(sink: Arc<dyn FrameSink>) -> Self {
        Self { id: NEXT_ID.fetch_add(1, Ordering::Relaxed), sink }
    }

    pub fn id(&self) -> ConnId { self.id }

    pub async fn send_text(&self, text: &str) -> Result<(), HubError> {
        self.sink.send_text(text).await
    }

    pub async fn close(&self) { self.sink.close().await }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool { self.id == other.id }
}
impl Eq for Connection {}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("id", &self.id).finish()
    }
}

/// One reader/writer lock over the whole map. `add`/`remove` take the write
/// side, `snapshot` the read side.
#[derive(Default)]
pub struct ConnectionRegistry {
    rooms: RwLock<HashMap<ChatroomId, HashMap<ConnId, Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self { Self::default() }

    /// Idempotent: a second add of the same connection changes nothing.
    pub async fn add(&self, room: ChatroomId, conn: Connection) {
        let mut rooms = self.rooms.write().await;
        rooms.entry(room).or_default().entry(conn.id).or_insert(conn);
    }

    /// No-op when the room or the connection is absent. Empty rooms are pruned.
    /// Returns whether this call actually removed the connection.
    pub async fn remove(&self, room: ChatroomId, conn: &Connection) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(members) = rooms.get_mut(&room) else { return false };
        let removed = members.remove(&conn.id).is_some();
        if members.is_empty() {
            rooms.remove(&room);
        }
        removed
    }

    /// Copy of the current members; the lock is released before returning.
    pub async fn snapshot(&self, room: ChatroomId) -> Vec<Connection> {
        self.rooms
            .read()
            .await
            .get(&room)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn contains_room(&self, room: ChatroomId) -> bool {
        self.rooms.read().await.contains_key(&room)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use tokio::sync::Mutex;

    /// Records frames; can be told to fail every write.
    #[derive(Default)]
    pub struct MockSink {
        pub frames: Mutex<Vec<String>>,
        pub fail:   AtomicBool,
        pub closed: AtomicBool,
    }

    impl MockSink {
        pub fn failing() -> Arc<Self> {
            let s = Self::default();
            s.fail.store(true, Ordering::SeqCst);
            Arc::new(s)
        }
    }

    #[async_trait]
    impl FrameSink for MockSink {
        async fn send_text(&self, text: &str) -> Result<(), HubError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(HubError::Write("peer gone".into()));
            }
            self.frames.lock().await.push(text.to_string());
            Ok(())
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn conn() -> Connection {
        Connection::new(Arc::new(MockSink::default()))
    }

    #[tokio::test]
    async fn add_then_remove_membership() {
        let reg = ConnectionRegistry::new();
        let c = conn();

        reg.add(1, c.clone()).await;
        assert!(reg.snapshot(1).await.contains(&c));

        assert!(reg.remove(1, &c).await);
        assert!(!reg.snapshot(1).await.contains(&c));
    }

    #[tokio::test]
    async fn add_twice_is_noop() {
        let reg = ConnectionRegistry::new();
        let c = conn();
        reg.add(3, c.clone()).await;
        reg.add(3, c.clone()).await;
        assert_eq!(reg.snapshot(3).await.len(), 1);
    }

    #[tokio::test]
    async fn remove_absent_is_noop() {
        let reg = ConnectionRegistry::new();
        let c = conn();
        assert!(!reg.remove(9, &c).await);

        reg.add(9, conn()).await;
        assert!(!reg.remove(9, &c).await);
        assert_eq!(reg.snapshot(9).await.len(), 1);
    }

    #[tokio::test]
    async fn last_member_prunes_room() {
        let reg = ConnectionRegistry::new();
        let (a, b) = (conn(), conn());
        reg.add(5, a.clone()).await;
        reg.add(5, b.clone()).await;

        reg.remove(5, &a).await;
        assert!(reg.contains_room(5).await);
        reg.remove(5, &b).await;
        assert!(!reg.contains_room(5).await);
        assert_eq!(reg.room_count().await, 0);
    }

    #[tokio::test]
    async fn rooms_are_independent() {
        let reg = ConnectionRegistry::new();
        let c = conn();
        reg.add(1, c.clone()).await;
        reg.add(2, c.clone()).await;
        reg.remove(1, &c).await;
        assert!(reg.snapshot(2).await.contains(&c));
    }

    #[tokio::test]
    async fn concurrent_adds_all_land() {
        let reg = Arc::new(ConnectionRegistry::new());
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let reg = reg.clone();
            tasks.push(tokio::spawn(async move { reg.add(11, conn()).await }));
        }
        for t in tasks { t.await.unwrap(); }
        assert_eq!(reg.snapshot(11).await.len(), 32);
    }
}
