use std::net::SocketAddr;

use anyhow::{Context as _, Error};
use ember_mio::{
    net::{self, AcceptEnd},
    run_event_loop, Dispatch, Ready, Registry,
};
use mio::{
    net::{TcpListener, TcpStream},
    Interest, Token,
};
use tracing::{event, instrument, Level};

use crate::{Connection, Connections, ServerConfig, Step};

/// Token of the listening socket, connection tokens never reach it.
pub const LISTENER_TOKEN: Token = Token(usize::MAX);

/// HTTP server driven by the ember event loop.
///
/// The server is the only place connections are registered with the poll, and the only place
/// they are torn down.
pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    connections: Connections<TcpStream>,
}

impl Server {
    /// Bind the listening socket and register it for readiness.
    #[instrument("Server::bind", skip_all)]
    pub fn bind(registry: &Registry, config: ServerConfig) -> Result<Self, Error> {
        let mut listener = TcpListener::bind(config.addr)
            .with_context(|| format!("failed to bind {}", config.addr))?;
        let local_addr = listener.local_addr()?;

        registry.register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;
        event!(Level::INFO, addr = %local_addr, root = ?config.root, "listening");

        Ok(Self {
            config,
            listener,
            local_addr,
            connections: Connections::default(),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    #[instrument("Server::accept", level = "debug", skip_all)]
    fn accept_pending(&mut self, registry: &Registry) {
        let listener = &self.listener;
        let connections = &mut self.connections;

        // Accept until the listener runs out, readiness is only reported on changes
        let end = net::accept_pending(
            || listener.accept(),
            |(stream, client_addr)| admit(registry, connections, stream, client_addr),
        );

        if let AcceptEnd::Failed(error) = end {
            event!(Level::ERROR, ?error, "failed to accept connection");

            // Re-arming makes the poll report connections that are still queued
            let result =
                registry.reregister(&mut self.listener, LISTENER_TOKEN, Interest::READABLE);
            if let Err(error) = result {
                event!(Level::ERROR, ?error, "failed to re-arm listener");
            }
        }
    }

    #[instrument("Server::connection", level = "debug", skip_all, fields(token = ready.token.0))]
    fn on_connection_ready(&mut self, registry: &Registry, ready: Ready) {
        let token = ready.token;

        let Some(connection) = self.connections.get_mut(token) else {
            event!(Level::TRACE, "ready event for removed connection");
            return;
        };

        // Nothing can be delivered anymore, drop whatever is in flight
        if ready.error || ready.hangup {
            self.teardown(registry, token, "hangup");
            return;
        }

        match connection.advance(&self.config) {
            Step::Suspend(interest) => self.await_readiness(registry, token, interest),
            Step::Complete => self.teardown(registry, token, "complete"),
            Step::Failed => self.teardown(registry, token, "failed"),
        }
    }

    fn await_readiness(&mut self, registry: &Registry, token: Token, interest: Interest) {
        if self.connections.interest(token) == Some(interest) {
            return;
        }

        let Some(connection) = self.connections.get_mut(token) else {
            return;
        };

        match registry.reregister(connection.stream_mut(), token, interest) {
            Ok(()) => self.connections.set_interest(token, interest),
            Err(error) => {
                event!(Level::WARN, ?error, "failed to change connection interest");
                self.teardown(registry, token, "reregister failed");
            }
        }
    }

    /// Remove a connection, deregister it and close its socket.
    ///
    /// This is the only way connections are released, doing nothing if already removed.
    fn teardown(&mut self, registry: &Registry, token: Token, reason: &'static str) {
        let Some(mut connection) = self.connections.remove(token) else {
            return;
        };

        if let Err(error) = registry.deregister(connection.stream_mut()) {
            event!(Level::WARN, ?error, "failed to deregister connection");
        }

        event!(
            Level::DEBUG,
            client = %connection.client_addr(),
            reason,
            "closing connection"
        );

        // Dropping closes the socket and releases the buffers
        drop(connection);
    }
}

fn admit(
    registry: &Registry,
    connections: &mut Connections<TcpStream>,
    stream: TcpStream,
    client_addr: SocketAddr,
) {
    let connection = Connection::new(stream, client_addr);
    let token = connections.insert(connection, Interest::READABLE);

    let result = match connections.get_mut(token) {
        Some(connection) => registry.register(connection.stream_mut(), token, Interest::READABLE),
        None => return,
    };

    match result {
        Ok(()) => event!(Level::DEBUG, client = %client_addr, ?token, "accepted"),
        Err(error) => {
            event!(Level::ERROR, ?error, "failed to register connection");
            connections.remove(token);
        }
    }
}

impl Dispatch for Server {
    fn dispatch(&mut self, registry: &Registry, ready: Ready) -> Result<(), Error> {
        if ready.token == LISTENER_TOKEN {
            self.accept_pending(registry);
        } else {
            self.on_connection_ready(registry, ready);
        }

        Ok(())
    }

    #[instrument("Server::shutdown", skip_all)]
    fn shutdown(&mut self, registry: &Registry) -> Result<(), Error> {
        event!(Level::INFO, open = self.connections.len(), "shutting down");

        for token in self.connections.tokens() {
            self.teardown(registry, token, "shutdown");
        }

        registry
            .deregister(&mut self.listener)
            .context("failed to deregister listener")?;

        Ok(())
    }
}

/// Run a server with the given configuration until the registry's shutdown is triggered.
pub fn serve(registry: &mut Registry, config: ServerConfig) -> Result<(), Error> {
    let mut server = Server::bind(registry, config)?;

    let options = server.config().loop_options();
    run_event_loop(registry, &mut server, &options)
}
