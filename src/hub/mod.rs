pub mod broadcast;
pub mod registry;

pub use broadcast::{BroadcastHub, Delivery, Envelope};
pub use registry::{ChatroomId, Connection, ConnectionRegistry, FrameSink};
