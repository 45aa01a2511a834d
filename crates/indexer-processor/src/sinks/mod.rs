mod redis;
pub mod traits;

pub use self::redis::RedisSink;
pub use traits::{
    ActivityEvent, ActivityKind, ActivitySink, BidEventsSink, MetadataSink, WebsocketEvent,
    WebsocketEventKind, WebsocketRouter,
};
