use std::{
    fs::File,
    io::{Read, Write},
    net::SocketAddr,
};

use bytes::{Bytes, BytesMut};
use ember_mio::net::{
    partial::{self, Outcome, Partial},
    CloseWrite,
};
use mio::Interest;
use tracing::{event, Level};

use crate::{
    request,
    router::{self, Route},
    scanner::{self, ScanOutcome},
    Method, Request, RequestError, ResponseHead, ServerConfig, StatusCode,
};

/// Most unread request bytes discarded after an early response before closing anyway.
const DRAIN_LIMIT: usize = 64 * 1024;

/// Processing stage of a connection.
///
/// Progress within a stage lives in the stage itself, so it starts at zero with every
/// transition.
#[derive(Debug)]
pub enum Stage {
    /// Receiving the request header. Progress is the header buffer length.
    ReadingHeader,
    Routing,
    SendingResponseHeader {
        head: ResponseHead,
        sent: usize,
        /// Body to transfer once the header is sent.
        then: Option<Body>,
    },
    TransferringBody { body: Body, done: usize },
    /// Response sent and the sending half closed, discarding request bytes that were never
    /// read. Closing a socket with unread input resets it, losing the response in flight.
    Draining { discarded: usize, limit: usize },
    Done,
    Failed,
}

/// Payload transferred in the body stage.
#[derive(Debug)]
pub enum Body {
    /// File contents sent to the client.
    File { file: File, len: usize },
    /// In-memory contents sent to the client.
    Memory(Bytes),
    /// Request body received from the client into a file.
    Upload { file: File, len: usize },
}

impl Body {
    fn len(&self) -> usize {
        match self {
            Body::File { len, .. } | Body::Upload { len, .. } => *len,
            Body::Memory(bytes) => bytes.len(),
        }
    }

    fn interest(&self) -> Interest {
        match self {
            Body::Upload { .. } => Interest::READABLE,
            _ => Interest::WRITABLE,
        }
    }
}

/// Result of advancing a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Waiting for the given readiness before the connection can continue.
    Suspend(Interest),
    /// The response was fully sent, the connection can be closed.
    Complete,
    /// The connection can't continue, it should be closed without further response.
    Failed,
}

enum Flow {
    /// Move on to the next stage immediately.
    Next(Stage),
    /// Stay in this stage, resuming when the readiness is reported.
    Suspend(Stage, Interest),
}

/// One accepted client connection and its request/response progress.
pub struct Connection<S> {
    stream: S,
    client_addr: SocketAddr,
    stage: Stage,
    request_header: BytesMut,
    /// Formatted once per response, so a resumed write continues on the same bytes.
    response_header: Bytes,
    request: Option<Request>,
    /// Request bytes left unread by an early response, discarded before closing.
    unread: Option<usize>,
}

impl<S> Connection<S>
where
    S: Read + Write + CloseWrite,
{
    pub fn new(stream: S, client_addr: SocketAddr) -> Self {
        Self {
            stream,
            client_addr,
            stage: Stage::ReadingHeader,
            request_header: BytesMut::new(),
            response_header: Bytes::new(),
            request: None,
            unread: None,
        }
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    /// The parsed request, available once the header was fully read.
    pub fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }

    /// Run stages until the connection has to wait for readiness, or is finished.
    ///
    /// Calling this again after a suspension resumes exactly where the previous call stopped.
    pub fn advance(&mut self, config: &ServerConfig) -> Step {
        loop {
            let stage = std::mem::replace(&mut self.stage, Stage::Failed);

            let flow = match stage {
                Stage::ReadingHeader => self.read_header(config),
                Stage::Routing => self.route(config),
                Stage::SendingResponseHeader { head, sent, then } => {
                    self.send_response_header(head, sent, then)
                }
                Stage::TransferringBody { body, done } => self.transfer_body(body, done, config),
                Stage::Draining { discarded, limit } => self.drain(discarded, limit),
                Stage::Done => {
                    self.stage = Stage::Done;
                    return Step::Complete;
                }
                Stage::Failed => return Step::Failed,
            };

            match flow {
                Flow::Next(next) => {
                    event!(Level::TRACE, stage = stage_name(&next), "stage transition");
                    self.stage = next;
                }
                Flow::Suspend(stage, interest) => {
                    self.stage = stage;
                    return Step::Suspend(interest);
                }
            }
        }
    }

    fn read_header(&mut self, config: &ServerConfig) -> Flow {
        let scan = scanner::scan_header(
            &mut self.stream,
            &mut self.request_header,
            config.max_header_size,
        );

        match scan.outcome {
            ScanOutcome::Terminated => {}
            ScanOutcome::WouldBlock => {
                event!(Level::TRACE, consumed = scan.consumed, "header incomplete");
                return Flow::Suspend(Stage::ReadingHeader, Interest::READABLE);
            }
            ScanOutcome::TooLarge => {
                let error = RequestError::HeaderTooLarge(config.max_header_size);
                return self.reject(error);
            }
            ScanOutcome::PeerClosed => {
                event!(Level::DEBUG, consumed = scan.consumed, "peer closed during header");
                return Flow::Next(Stage::Failed);
            }
            ScanOutcome::Error(error) => {
                event!(Level::WARN, ?error, "failed to read header");
                return Flow::Next(Stage::Failed);
            }
        }

        match request::parse(&self.request_header) {
            Ok(request) => {
                event!(
                    Level::DEBUG,
                    method = request.method.as_str(),
                    path = %request.path,
                    "received request"
                );
                self.request = Some(request);
                Flow::Next(Stage::Routing)
            }
            Err(error) => self.reject(error),
        }
    }

    fn reject(&mut self, error: RequestError) -> Flow {
        event!(Level::WARN, client = %self.client_addr, %error, "rejecting request");

        // Where the request ends is unknown
        self.unread = Some(DRAIN_LIMIT);
        Flow::Next(respond(error.status()))
    }

    fn route(&mut self, config: &ServerConfig) -> Flow {
        let Some(request) = &self.request else {
            event!(Level::ERROR, "routing without parsed request");
            return Flow::Next(Stage::Failed);
        };

        let route = match router::route(request, config) {
            Ok(route) => route,
            Err(error) => {
                event!(Level::ERROR, ?error, "failed to route request");
                return Flow::Next(Stage::Failed);
            }
        };

        let next = match route {
            Route::Status(status) => {
                if status != StatusCode::OK {
                    event!(Level::WARN, status = status.0, path = %request.path, "error response");
                }
                self.unread = match request.content_length {
                    Some(0) => None,
                    Some(len) => Some(len.min(DRAIN_LIMIT)),
                    // An upload body may follow even without a declared length
                    None if request.method == Method::Put => Some(DRAIN_LIMIT),
                    None => None,
                };
                respond(status)
            }
            Route::File {
                file,
                len,
                head_only,
            } => Stage::SendingResponseHeader {
                head: ResponseHead::ok(len),
                sent: 0,
                then: (!head_only).then_some(Body::File { file, len }),
            },
            Route::Listing { body, head_only } => Stage::SendingResponseHeader {
                head: ResponseHead::ok(body.len()).with_content_type("text/html"),
                sent: 0,
                then: (!head_only).then_some(Body::Memory(body)),
            },
            // The upload is answered once the body is stored
            Route::Upload { file, len } => Stage::TransferringBody {
                body: Body::Upload { file, len },
                done: 0,
            },
        };

        Flow::Next(next)
    }

    fn send_response_header(
        &mut self,
        head: ResponseHead,
        sent: usize,
        then: Option<Body>,
    ) -> Flow {
        if self.response_header.is_empty() {
            self.response_header = head.build();
        }

        let result = partial::write_all(&mut self.stream, &self.response_header[sent..]);
        let sent = sent + result.count;

        match result.outcome {
            Outcome::Complete => {
                event!(Level::DEBUG, status = head.status.0, "response header sent");
                match then {
                    Some(body) => Flow::Next(Stage::TransferringBody { body, done: 0 }),
                    None => Flow::Next(self.finish()),
                }
            }
            Outcome::WouldBlock => {
                let stage = Stage::SendingResponseHeader { head, sent, then };
                Flow::Suspend(stage, Interest::WRITABLE)
            }
            outcome => self.abort("response header", outcome),
        }
    }

    fn transfer_body(&mut self, mut body: Body, done: usize, config: &ServerConfig) -> Flow {
        let remaining = body.len() - done;

        let result: Partial = match &mut body {
            Body::File { file, .. } => partial::stream_file_to_socket(
                file,
                &mut self.stream,
                remaining,
                done,
                config.chunk_size,
            ),
            Body::Memory(bytes) => partial::write_all(&mut self.stream, &bytes[done..]),
            Body::Upload { file, .. } => partial::stream_socket_to_file(
                &mut self.stream,
                file,
                remaining,
                done,
                config.chunk_size,
            ),
        };
        let done = done + result.count;

        match result.outcome {
            Outcome::Complete => {
                event!(Level::DEBUG, bytes = done, "body transferred");
                match body {
                    Body::Upload { .. } => Flow::Next(respond(StatusCode::OK)),
                    _ => Flow::Next(self.finish()),
                }
            }
            Outcome::WouldBlock => {
                event!(Level::TRACE, done, total = body.len(), "body transfer suspended");
                let interest = body.interest();
                Flow::Suspend(Stage::TransferringBody { body, done }, interest)
            }
            outcome => self.abort("body", outcome),
        }
    }

    /// Stage after the response is fully sent.
    fn finish(&mut self) -> Stage {
        let Some(limit) = self.unread.take() else {
            return Stage::Done;
        };

        if let Err(error) = self.stream.close_write() {
            event!(Level::DEBUG, ?error, "failed to close sending half");
            return Stage::Done;
        }

        Stage::Draining {
            discarded: 0,
            limit,
        }
    }

    fn drain(&mut self, mut discarded: usize, limit: usize) -> Flow {
        let mut scratch = [0; 1024];

        while discarded < limit {
            let len = scratch.len().min(limit - discarded);
            let result = partial::read_all(&mut self.stream, &mut scratch[..len]);
            discarded += result.count;

            match result.outcome {
                Outcome::Complete => {}
                Outcome::WouldBlock => {
                    let stage = Stage::Draining { discarded, limit };
                    return Flow::Suspend(stage, Interest::READABLE);
                }
                Outcome::PeerClosed => break,
                Outcome::Error(error) => {
                    // The response is already out, nothing left to fail
                    event!(Level::DEBUG, ?error, "failed to drain request");
                    break;
                }
            }
        }

        event!(Level::TRACE, discarded, "request drained");
        Flow::Next(Stage::Done)
    }

    fn abort(&self, what: &str, outcome: Outcome) -> Flow {
        match outcome {
            Outcome::PeerClosed => {
                event!(Level::DEBUG, client = %self.client_addr, what, "peer closed mid-transfer")
            }
            Outcome::Error(error) => {
                event!(Level::WARN, client = %self.client_addr, what, ?error, "transfer failed")
            }
            Outcome::Complete | Outcome::WouldBlock => {}
        }

        Flow::Next(Stage::Failed)
    }
}

fn respond(status: StatusCode) -> Stage {
    Stage::SendingResponseHeader {
        head: ResponseHead::empty(status),
        sent: 0,
        then: None,
    }
}

fn stage_name(stage: &Stage) -> &'static str {
    match stage {
        Stage::ReadingHeader => "reading-header",
        Stage::Routing => "routing",
        Stage::SendingResponseHeader { .. } => "sending-response-header",
        Stage::TransferringBody { .. } => "transferring-body",
        Stage::Draining { .. } => "draining",
        Stage::Done => "done",
        Stage::Failed => "failed",
    }
}
