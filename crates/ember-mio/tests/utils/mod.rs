use std::io::Cursor;

use devutils::MockSocket;
use ember_mio::net::partial::{self, Outcome, Partial};

/// Deterministic payload that makes offset mistakes visible.
pub fn given_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Keep resuming a file to socket stream until it completes, like a connection would on every
/// writable readiness event.
pub fn when_file_streamed(
    file: &mut Cursor<Vec<u8>>,
    socket: &mut MockSocket,
    chunk_size: usize,
) -> usize {
    let total = file.get_ref().len();
    let mut done = 0;
    let mut resumes = 0;

    loop {
        let result = partial::stream_file_to_socket(file, socket, total - done, done, chunk_size);
        done += result.count;

        match result.outcome {
            Outcome::Complete => return resumes,
            Outcome::WouldBlock => resumes += 1,
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}

/// Keep resuming a socket to file stream until `total` bytes are stored.
pub fn when_socket_stored(
    socket: &mut MockSocket,
    file: &mut Cursor<Vec<u8>>,
    total: usize,
    chunk_size: usize,
) -> usize {
    let mut done = 0;
    let mut resumes = 0;

    loop {
        let result = partial::stream_socket_to_file(socket, file, total - done, done, chunk_size);
        done += result.count;

        match result.outcome {
            Outcome::Complete => return resumes,
            Outcome::WouldBlock => resumes += 1,
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}

pub fn then_complete(partial: &Partial, count: usize) {
    assert!(partial.is_complete(), "expected complete, got {:?}", partial.outcome);
    assert_eq!(partial.count, count);
}
