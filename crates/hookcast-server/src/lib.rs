pub mod handlers;
pub mod registry;
pub mod server;
pub mod subscriber;

pub use registry::{ConnectionId, ConnectionRegistry, Subscriber, SubscriberError};
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
