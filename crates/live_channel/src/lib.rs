mod client_registry;
mod live_channel_server;
mod live_message;
mod session;

pub use client_registry::*;
pub use live_channel_server::*;
pub use live_message::*;
pub use session::*;
