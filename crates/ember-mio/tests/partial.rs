mod utils;

use std::io::Cursor;

use anyhow::Error;
use devutils::MockSocket;
use ember_mio::net::partial::{self, Outcome};
use tracing_test::traced_test;

use crate::utils::{given_payload, then_complete, when_file_streamed, when_socket_stored};

#[test]
#[traced_test]
fn write_all_retries_interrupts_and_short_writes() -> Result<(), Error> {
    let mut socket = MockSocket::new(Vec::new())
        .with_interrupts()
        .with_max_per_call(3);

    let result = partial::write_all(&mut socket, b"hello world");

    then_complete(&result, 11);
    assert_eq!(socket.output(), b"hello world");

    Ok(())
}

#[test]
#[traced_test]
fn write_all_reports_progress_on_would_block() -> Result<(), Error> {
    let mut socket = MockSocket::new(Vec::new()).with_write_blocks([4]);

    let first = partial::write_all(&mut socket, b"abcdefgh");
    assert!(matches!(first.outcome, Outcome::WouldBlock));
    assert_eq!(first.count, 4);

    // Resume with only the unsent suffix
    let second = partial::write_all(&mut socket, &b"abcdefgh"[first.count..]);
    then_complete(&second, 4);
    assert_eq!(socket.output(), b"abcdefgh");

    Ok(())
}

#[test]
#[traced_test]
fn write_all_broken_pipe_is_peer_closed() -> Result<(), Error> {
    let mut socket = MockSocket::new(Vec::new()).with_broken_pipe();

    let result = partial::write_all(&mut socket, b"data");

    assert!(matches!(result.outcome, Outcome::PeerClosed));
    assert_eq!(result.count, 0);

    Ok(())
}

#[test]
#[traced_test]
fn read_all_distinguishes_exhaustion_from_would_block() -> Result<(), Error> {
    let mut buffer = [0; 8];

    let mut open = MockSocket::new(&b"abc"[..]);
    let result = partial::read_all(&mut open, &mut buffer);
    assert!(matches!(result.outcome, Outcome::WouldBlock));
    assert_eq!(result.count, 3);

    let mut closed = MockSocket::new(&b"abc"[..]).with_eof();
    let result = partial::read_all(&mut closed, &mut buffer);
    assert!(matches!(result.outcome, Outcome::PeerClosed));
    assert_eq!(result.count, 3);

    Ok(())
}

#[test]
#[traced_test]
fn file_to_socket_resumes_at_offset() -> Result<(), Error> {
    let payload = given_payload(50_000);

    for chunk_size in [1, 7, 512, partial::CHUNK_SIZE] {
        for max_per_call in [1, 100, 4096, usize::MAX] {
            // Skip the slowest combination, it adds nothing over the others
            if chunk_size == 1 && max_per_call == 1 {
                continue;
            }

            let mut file = Cursor::new(payload.clone());
            let mut socket = MockSocket::new(Vec::new())
                .with_write_blocks([0, 1, 999, 8096, 8097, 33_333, 49_999])
                .with_max_per_call(max_per_call)
                .with_interrupts();

            let resumes = when_file_streamed(&mut file, &mut socket, chunk_size);

            assert_eq!(resumes, 7);
            assert_eq!(socket.output(), &payload[..]);
        }
    }

    Ok(())
}

#[test]
#[traced_test]
fn file_to_socket_from_offset_sends_suffix() -> Result<(), Error> {
    let payload = given_payload(100);
    let mut file = Cursor::new(payload.clone());
    let mut socket = MockSocket::new(Vec::new());

    let result = partial::stream_file_to_socket(&mut file, &mut socket, 40, 60, 16);

    then_complete(&result, 40);
    assert_eq!(socket.output(), &payload[60..]);

    Ok(())
}

#[test]
#[traced_test]
fn file_exhausted_early_is_an_error() -> Result<(), Error> {
    let mut file = Cursor::new(given_payload(10));
    let mut socket = MockSocket::new(Vec::new());

    let result = partial::stream_file_to_socket(&mut file, &mut socket, 20, 0, 8);

    assert!(matches!(result.outcome, Outcome::Error(_)));
    assert_eq!(result.count, 10);

    Ok(())
}

#[test]
#[traced_test]
fn socket_to_file_resumes_at_offset() -> Result<(), Error> {
    let payload = given_payload(20_000);

    for chunk_size in [3, 1024, partial::CHUNK_SIZE] {
        let mut socket = MockSocket::new(payload.clone())
            .with_read_blocks([0, 5, 8096, 19_999])
            .with_max_per_call(777)
            .with_interrupts();
        let mut file = Cursor::new(Vec::new());

        let resumes = when_socket_stored(&mut socket, &mut file, payload.len(), chunk_size);

        assert_eq!(resumes, 4);
        assert_eq!(file.get_ref(), &payload);
    }

    Ok(())
}

#[test]
#[traced_test]
fn socket_to_file_overwrites_at_offset() -> Result<(), Error> {
    let mut file = Cursor::new(b"xxxxxxxxxx".to_vec());
    let mut socket = MockSocket::new(&b"abc"[..]);

    let result = partial::stream_socket_to_file(&mut socket, &mut file, 3, 4, 8);

    then_complete(&result, 3);
    assert_eq!(file.get_ref(), b"xxxxabcxxx");

    Ok(())
}

#[test]
#[traced_test]
fn socket_closed_before_declared_size() -> Result<(), Error> {
    let mut socket = MockSocket::new(&b"short"[..]).with_eof();
    let mut file = Cursor::new(Vec::new());

    let result = partial::stream_socket_to_file(&mut socket, &mut file, 100, 0, 8);

    assert!(matches!(result.outcome, Outcome::PeerClosed));
    assert_eq!(result.count, 5);
    assert_eq!(file.get_ref(), b"short");

    Ok(())
}

#[test]
#[traced_test]
fn zero_count_is_complete_without_io() -> Result<(), Error> {
    let mut socket = MockSocket::new(Vec::new());
    let mut file = Cursor::new(Vec::new());

    let result = partial::stream_file_to_socket(&mut file, &mut socket, 0, 0, 8);
    then_complete(&result, 0);
    assert_eq!(socket.write_calls, 0);

    Ok(())
}
