//! Single-threaded, non-blocking HTTP/1.1 file server.
//!
//! Every connection is a resumable state machine. When a socket would block, the connection
//! suspends in its current stage and the event loop moves on, resuming it at the same byte
//! offset once the poll reports the socket ready again.

mod config;
mod connection;
mod connections;
pub mod listing;
pub mod request;
pub mod router;
pub mod scanner;
mod response;
mod server;

pub use self::{
    config::ServerConfig,
    connection::{Body, Connection, Stage, Step},
    connections::Connections,
    request::{Method, Request, RequestError},
    response::{ResponseHead, StatusCode},
    server::{serve, Server, LISTENER_TOKEN},
};
