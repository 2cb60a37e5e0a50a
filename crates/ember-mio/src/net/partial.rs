//! Resumable transfers over non-blocking sockets.
//!
//! Every primitive runs until its byte count is reached or the peer can't currently take or
//! produce more data. Interrupted calls are retried internally. The primitives never fail with
//! `Err`, instead they report how far they got and why they stopped, so a caller can suspend and
//! later resume at exactly that point.

use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};

use tracing::{event, Level};

/// Default size of the intermediate buffer used when streaming between a file and a socket.
pub const CHUNK_SIZE: usize = 8096;

/// Why a transfer stopped.
#[derive(Debug)]
pub enum Outcome {
    /// The full requested count was transferred.
    Complete,
    /// The socket can't currently transfer more, retry on the next readiness event.
    WouldBlock,
    /// The peer closed the connection, or a read produced zero bytes.
    PeerClosed,
    /// A non-retryable error.
    Error(io::Error),
}

/// Result of a partial transfer.
#[derive(Debug)]
pub struct Partial {
    /// Bytes transferred by this call, regardless of the outcome.
    pub count: usize,
    pub outcome: Outcome,
}

impl Partial {
    fn new(count: usize, outcome: Outcome) -> Self {
        Self { count, outcome }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.outcome, Outcome::Complete)
    }
}

enum Classified {
    Retry,
    Stop(Outcome),
}

fn classify(error: io::Error) -> Classified {
    match error.kind() {
        ErrorKind::Interrupted => Classified::Retry,
        ErrorKind::WouldBlock => Classified::Stop(Outcome::WouldBlock),
        ErrorKind::BrokenPipe
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::WriteZero => Classified::Stop(Outcome::PeerClosed),
        _ => Classified::Stop(Outcome::Error(error)),
    }
}

/// Write all of `buffer` to `socket`.
pub fn write_all<W>(socket: &mut W, buffer: &[u8]) -> Partial
where
    W: Write + ?Sized,
{
    let mut progress = 0;

    while progress < buffer.len() {
        match socket.write(&buffer[progress..]) {
            // A zero-length write means the peer can't accept anything anymore
            Ok(0) => return Partial::new(progress, Outcome::PeerClosed),
            Ok(written) => progress += written,
            Err(error) => match classify(error) {
                Classified::Retry => continue,
                Classified::Stop(outcome) => return Partial::new(progress, outcome),
            },
        }
    }

    Partial::new(progress, Outcome::Complete)
}

/// Fill all of `buffer` from `socket`.
pub fn read_all<R>(socket: &mut R, buffer: &mut [u8]) -> Partial
where
    R: Read + ?Sized,
{
    let mut progress = 0;

    while progress < buffer.len() {
        match socket.read(&mut buffer[progress..]) {
            // Read of zero means the stream has been closed
            Ok(0) => return Partial::new(progress, Outcome::PeerClosed),
            Ok(read) => progress += read,
            Err(error) => match classify(error) {
                Classified::Retry => continue,
                Classified::Stop(outcome) => return Partial::new(progress, outcome),
            },
        }
    }

    Partial::new(progress, Outcome::Complete)
}

/// Stream `count` bytes of `file`, starting at `offset`, to `socket`.
///
/// The file is seeked before every chunk, so a previous partial transfer can be resumed by
/// passing the already sent amount as offset.
pub fn stream_file_to_socket<F, W>(
    file: &mut F,
    socket: &mut W,
    count: usize,
    offset: usize,
    chunk_size: usize,
) -> Partial
where
    F: Read + Seek + ?Sized,
    W: Write + ?Sized,
{
    let mut buffer = vec![0; chunk_size.min(count).max(1)];
    let mut progress = 0;

    while progress < count {
        let wanted = (count - progress).min(buffer.len());

        let position = (offset + progress) as u64;
        if let Err(error) = file.seek(SeekFrom::Start(position)) {
            return Partial::new(progress, Outcome::Error(error));
        }

        let filled = match read_file(file, &mut buffer[..wanted]) {
            Ok(filled) => filled,
            Err(error) => return Partial::new(progress, Outcome::Error(error)),
        };

        // The file is shorter than declared, the size must have changed under us
        if filled == 0 {
            event!(Level::ERROR, position, "file exhausted before declared size");
            let error = io::Error::new(ErrorKind::UnexpectedEof, "file exhausted mid-transfer");
            return Partial::new(progress, Outcome::Error(error));
        }

        let sent = write_all(socket, &buffer[..filled]);
        progress += sent.count;
        event!(Level::TRACE, count = sent.count, progress, "sent file chunk");

        if !sent.is_complete() {
            return Partial::new(progress, sent.outcome);
        }
    }

    Partial::new(progress, Outcome::Complete)
}

/// Stream `count` bytes from `socket` into `file`, writing at `offset` onwards.
///
/// Like `stream_file_to_socket`, the file is seeked before every chunk written.
pub fn stream_socket_to_file<R, F>(
    socket: &mut R,
    file: &mut F,
    count: usize,
    offset: usize,
    chunk_size: usize,
) -> Partial
where
    R: Read + ?Sized,
    F: Write + Seek + ?Sized,
{
    let mut buffer = vec![0; chunk_size.min(count).max(1)];
    let mut progress = 0;

    while progress < count {
        let wanted = (count - progress).min(buffer.len());

        let received = match socket.read(&mut buffer[..wanted]) {
            Ok(0) => return Partial::new(progress, Outcome::PeerClosed),
            Ok(received) => received,
            Err(error) => match classify(error) {
                Classified::Retry => continue,
                Classified::Stop(outcome) => return Partial::new(progress, outcome),
            },
        };

        let position = (offset + progress) as u64;
        let result = file
            .seek(SeekFrom::Start(position))
            .and_then(|_| file.write_all(&buffer[..received]));
        if let Err(error) = result {
            return Partial::new(progress, Outcome::Error(error));
        }

        progress += received;
        event!(Level::TRACE, count = received, progress, "stored socket chunk");
    }

    Partial::new(progress, Outcome::Complete)
}

fn read_file<F>(file: &mut F, buffer: &mut [u8]) -> io::Result<usize>
where
    F: Read + ?Sized,
{
    loop {
        match file.read(buffer) {
            Err(error) if error.kind() == ErrorKind::Interrupted => continue,
            result => return result,
        }
    }
}
