use std::{net::SocketAddr, path::PathBuf, time::Duration};

use ember_mio::{net::partial::CHUNK_SIZE, LoopOptions};

/// Settings of one HTTP server instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// Directory files are served from and uploaded to.
    pub root: PathBuf,
    /// Largest accepted request header, including the terminating blank line.
    pub max_header_size: usize,
    /// Size of the intermediate buffer when streaming between files and sockets.
    pub chunk_size: usize,
    /// File served for request paths without an extension.
    pub index_file: String,
    pub events_capacity: usize,
    pub poll_timeout: Option<Duration>,
}

impl ServerConfig {
    pub fn loop_options(&self) -> LoopOptions {
        LoopOptions {
            events_capacity: self.events_capacity,
            timeout: self.poll_timeout,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            root: PathBuf::from("."),
            max_header_size: 1024,
            chunk_size: CHUNK_SIZE,
            index_file: "index.html".to_string(),
            events_capacity: 100,
            poll_timeout: Some(Duration::from_secs(1)),
        }
    }
}
