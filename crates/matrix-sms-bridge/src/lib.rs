//! Matrix SMS Bridge - relays Acrobits softphone SMS and push traffic to Matrix.
//!
//! The bridge:
//! - Logs relay users into the homeserver and caches their sessions
//! - Sends and fetches messages in rooms mapped to SMS numbers
//! - Turns Matrix push gateway notifications into Acrobits PNM pushes

pub mod api;
pub mod bridge;
pub mod chat;
pub mod config;
pub mod error;
pub mod push;
pub mod registry;
pub mod session;

pub use bridge::MessageBridge;
pub use chat::ChatNetwork;
pub use config::Config;
pub use error::{BridgeError, BridgeResult};
pub use push::{AcrobitsPushClient, PushRelay, PushTranslator};
pub use registry::{Mapping, MappingRegistry, Store, TokenRegistration, TokenRegistry};
pub use session::SessionManager;
