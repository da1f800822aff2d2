//! Tavern Network Library
//!
//! Client side of the Tavern chat protocol.
//!
//! # Architecture
//!
//! - **Protocol**: JSON request/response bodies over HTTP, JSON text
//!   frames over a single WebSocket
//! - **Client**: authenticates against a server, fetches history, and
//!   exchanges live messages
//!
//! # Usage
//!
//! ```ignore
//! let mut client = Client::new("http://127.0.0.1:8000");
//! client.login("alice", "password").await?;
//!
//! let mut chat = client.connect().await?;
//! chat.send("hello").await?;
//!
//! while let Some(event) = chat.next_event().await {
//!     match event {
//!         ChatEvent::Message(msg) => { /* handle */ }
//!         ChatEvent::Disconnected => break,
//!     }
//! }
//! ```

pub mod client;
pub mod error;
pub mod protocol;

pub use client::{ChatConnection, ChatEvent, Client};
pub use error::{Error, Result};
pub use protocol::{
    AuthResponse, ClientFrame, Credentials, HistoryQuery, MeResponse, WireMessage, SESSION_COOKIE,
};

/// Default port for Tavern servers
pub const DEFAULT_PORT: u16 = 8000;
