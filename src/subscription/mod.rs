// Live subscriber registry and snapshot fan-out protocol

pub mod manager;
pub mod protocol;
pub mod registry;

pub use manager::ConnectionManager;
pub use protocol::{SnapshotMessage, SNAPSHOT_MESSAGE_TYPE};
pub use registry::{BroadcastReport, ChannelSink, SnapshotSink, SubscriberId, SubscriberRegistry};
