//! Inbound HTTP boundary and message dispatcher.
//!
//! The WhatsApp sidecar posts inbound messages to `/whatsapp/inbound`; the
//! handler acknowledges immediately and processing runs asynchronously:
//! access-policy gate, per-chat serialization, chat service, then the reply
//! is chunked and sent back through the sidecar.

pub mod dispatch;
pub mod error;
pub mod locks;
pub mod server;
pub mod sidecar;

pub use {
    dispatch::{Dispatcher, chunk_text},
    error::{Error, Result},
    locks::ChatLocks,
    server::{AppState, build_app, serve, start_gateway},
    sidecar::SidecarClient,
};
