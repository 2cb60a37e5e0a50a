use std::io::{self, Read};

use bytes::{BufMut, BytesMut};
use ember_mio::net::partial::{self, Outcome};

/// Why the header scanner stopped.
#[derive(Debug)]
pub enum ScanOutcome {
    /// The buffer ends with a blank line.
    Terminated,
    /// The buffer reached the maximum size without a terminator.
    TooLarge,
    WouldBlock,
    PeerClosed,
    Error(io::Error),
}

/// Result of a header scan.
#[derive(Debug)]
pub struct Scan {
    /// Total bytes in the header buffer, including those from earlier scans.
    pub consumed: usize,
    pub outcome: ScanOutcome,
}

/// Read a request header from `socket` into `buffer`, one byte at a time.
///
/// Reading stops right after the header terminator, so no body bytes are consumed from the
/// socket. Only the tail of `buffer` is inspected, a terminator split over several calls is
/// still detected. A scan that would block can be resumed by calling this again with the same
/// buffer.
pub fn scan_header<R>(socket: &mut R, buffer: &mut BytesMut, max_size: usize) -> Scan
where
    R: Read + ?Sized,
{
    let outcome = loop {
        if is_terminated(buffer) {
            break ScanOutcome::Terminated;
        }

        if buffer.len() >= max_size {
            break ScanOutcome::TooLarge;
        }

        let mut byte = [0; 1];
        let result = partial::read_all(socket, &mut byte);

        match result.outcome {
            Outcome::Complete => buffer.put_u8(byte[0]),
            Outcome::WouldBlock => break ScanOutcome::WouldBlock,
            Outcome::PeerClosed => break ScanOutcome::PeerClosed,
            Outcome::Error(error) => break ScanOutcome::Error(error),
        }
    };

    Scan {
        consumed: buffer.len(),
        outcome,
    }
}

fn is_terminated(buffer: &[u8]) -> bool {
    buffer.ends_with(b"\n\n") || buffer.ends_with(b"\r\n\r\n")
}
