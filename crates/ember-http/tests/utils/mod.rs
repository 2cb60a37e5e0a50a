use std::{
    env, fs,
    io::{Read, Write},
    net::{SocketAddr, TcpStream},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::{anyhow, bail, Context, Error};
use devutils::MockSocket;
use ember_http::{Connection, Server, ServerConfig, Step};
use ember_mio::{run_event_loop, Dispatch, Ready, Registry, Shutdown};
use uuid::Uuid;

/// Uniquely named directory that is removed on drop.
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, name: &str, contents: &[u8]) -> Result<(), Error> {
        let path = self.path.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn read(&self, name: &str) -> Result<Vec<u8>, Error> {
        fs::read(self.path.join(name)).with_context(|| format!("failed to read {}", name))
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

pub fn given_root() -> Result<ScratchDir, Error> {
    let path = env::temp_dir().join(format!("ember-test-{}", Uuid::new_v4()));
    fs::create_dir_all(&path)?;
    Ok(ScratchDir { path })
}

pub fn given_config(root: &ScratchDir) -> ServerConfig {
    ServerConfig {
        root: root.path().to_path_buf(),
        ..ServerConfig::default()
    }
}

pub fn given_connection(socket: MockSocket) -> Connection<MockSocket> {
    Connection::new(socket, SocketAddr::from(([127, 0, 0, 1], 40000)))
}

/// Keep advancing the connection as if every suspension was followed by a readiness event.
///
/// Returns the final step and how often the connection suspended.
pub fn when_driven(
    connection: &mut Connection<MockSocket>,
    config: &ServerConfig,
) -> Result<(Step, usize), Error> {
    let mut suspends = 0;

    loop {
        match connection.advance(config) {
            Step::Suspend(_) => suspends += 1,
            step => return Ok((step, suspends)),
        }

        if suspends > 100_000 {
            bail!("connection never finished");
        }
    }
}

pub struct Response {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

pub fn then_response(raw: &[u8]) -> Result<Response, Error> {
    let split = raw
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .context("response header not terminated")?;

    let head = std::str::from_utf8(&raw[..split])?;
    let body = raw[split + 4..].to_vec();

    let mut lines = head.split("\r\n");
    let status_line = lines.next().context("missing status line")?;

    let mut parts = status_line.splitn(3, ' ');
    if parts.next() != Some("HTTP/1.1") {
        bail!("unexpected status line \"{}\"", status_line);
    }
    let status = parts.next().context("missing status")?.parse()?;
    let reason = parts.next().unwrap_or_default().to_string();

    let headers = lines
        .map(|line| {
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| anyhow!("malformed header line \"{}\"", line))?;
            Ok((key.trim().to_string(), value.trim().to_string()))
        })
        .collect::<Result<Vec<_>, Error>>()?;

    Ok(Response {
        status,
        reason,
        headers,
        body,
    })
}

/// Publishes the number of open connections after every event.
struct Observed {
    server: Server,
    connections: Arc<AtomicUsize>,
}

impl Dispatch for Observed {
    fn dispatch(&mut self, registry: &Registry, ready: Ready) -> Result<(), Error> {
        let result = self.server.dispatch(registry, ready);
        self.connections
            .store(self.server.connection_count(), Ordering::SeqCst);
        result
    }

    fn shutdown(&mut self, registry: &Registry) -> Result<(), Error> {
        self.server.shutdown(registry)
    }
}

/// Server running its event loop on a background thread.
pub struct RunningServer {
    pub addr: SocketAddr,
    shutdown: Shutdown,
    connections: Arc<AtomicUsize>,
    thread: Option<JoinHandle<Result<(), Error>>>,
}

impl RunningServer {
    /// Wait until the server holds exactly `count` connections.
    pub fn wait_for_connections(&self, count: usize) -> Result<(), Error> {
        let deadline = Instant::now() + Duration::from_secs(10);

        while self.connections.load(Ordering::SeqCst) != count {
            if Instant::now() > deadline {
                bail!(
                    "expected {} connections, server holds {}",
                    count,
                    self.connections.load(Ordering::SeqCst)
                );
            }
            thread::sleep(Duration::from_millis(10));
        }

        Ok(())
    }

    pub fn stop(mut self) -> Result<(), Error> {
        self.join()
    }

    fn join(&mut self) -> Result<(), Error> {
        self.shutdown.trigger();

        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| anyhow!("server thread panicked"))?,
            None => Ok(()),
        }
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        let _ = self.join();
    }
}

pub fn given_running_server(root: &ScratchDir) -> Result<RunningServer, Error> {
    let registry = Registry::new()?;
    let config = ServerConfig {
        addr: "127.0.0.1:0".parse()?,
        poll_timeout: Some(Duration::from_millis(50)),
        ..given_config(root)
    };

    let server = Server::bind(&registry, config)?;
    let addr = server.local_addr();
    let shutdown = registry.shutdown();

    let connections = Arc::new(AtomicUsize::new(0));
    let mut observed = Observed {
        server,
        connections: connections.clone(),
    };

    let thread = thread::spawn(move || {
        let mut registry = registry;

        let options = observed.server.config().loop_options();
        run_event_loop(&mut registry, &mut observed, &options)
    });

    Ok(RunningServer {
        addr,
        shutdown,
        connections,
        thread: Some(thread),
    })
}

pub fn given_client(addr: SocketAddr) -> Result<TcpStream, Error> {
    let stream = TcpStream::connect(addr)?;
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;
    Ok(stream)
}

/// Send a full request and read the response until the server closes.
pub fn when_requested(addr: SocketAddr, request: &[u8]) -> Result<Vec<u8>, Error> {
    let mut stream = given_client(addr)?;
    stream.write_all(request)?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response)?;

    Ok(response)
}
