//! Inbound side of the gossip exchange: one receiver loop
//! per accepted connection, reconstructing frames from the
//! byte stream and admitting them into the message pool.

use std::{
    io::{self, Read},
    net::TcpStream,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use tracing::{debug, warn};

use super::{pool::MessagePool, GossipMessage};

pub(crate) const READ_CHUNK_SIZE: usize = 32;

/// Drives one inbound connection until the node shuts down
/// or the peer closes its end of the stream.
///
/// Bytes are read in fixed-size chunks into an accumulating
/// buffer; every complete newline-terminated frame is split
/// off, decoded and admitted into the pool. Malformed frames
/// are logged and dropped without touching the pool.
///
/// The caller is expected to have set a read timeout on the
/// stream, so the shutdown flag is observed even on an
/// otherwise silent connection.
pub(crate) fn handle_inbound_stream(
    mut stream: TcpStream,
    pool: Arc<Mutex<MessagePool>>,
    shutdown: Arc<AtomicBool>,
) {
    let mut buffer: Vec<u8> = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    while !shutdown.load(Ordering::Relaxed) {
        let read = match stream.read(&mut chunk) {
            Ok(0) => {
                debug!("peer closed the inbound connection");
                break;
            }
            Ok(read) => read,
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                continue;
            }
            Err(err) => {
                warn!("failed to read from the inbound connection: {}", err);
                break;
            }
        };

        buffer.extend_from_slice(&chunk[..read]);

        while let Some(frame) = split_frame(&mut buffer) {
            admit_frame(&frame, &pool);
        }
    }
}

/// Splits the first complete newline-terminated frame off
/// `buffer`, retaining the remainder as the new buffer
/// prefix. Returns `None` while no terminator has arrived.
fn split_frame(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let terminator = buffer.iter().position(|byte| *byte == b'\n')?;

    let mut frame: Vec<u8> = buffer.drain(..=terminator).collect();
    frame.pop(); // Drops the terminator.

    Some(frame)
}

/// Decodes one reconstructed frame and admits it into the
/// pool; a known identifier is ignored, so its counter is
/// never reset by a duplicate.
fn admit_frame(frame: &[u8], pool: &Arc<Mutex<MessagePool>>) {
    let frame = match std::str::from_utf8(frame) {
        Ok(frame) => frame,
        Err(_) => {
            warn!("dropped an inbound frame: not valid UTF-8");
            return;
        }
    };

    let message = match GossipMessage::parse(frame) {
        Ok(message) => message,
        Err(err) => {
            warn!("dropped an inbound frame: {}", err);
            return;
        }
    };

    let identifier = message.get_identifier().to_string();
    let origin = message.get_origin().to_string();

    let mut pool_lock = pool.lock().unwrap();

    if pool_lock.admit(message) {
        debug!("admitted message [{}] from [{}]", identifier, origin);
    }
}

#[cfg(test)]
mod inbound_stream_test {
    use std::{
        io::Write,
        net::{TcpListener, TcpStream},
        sync::{atomic::AtomicBool, Arc, Mutex},
        thread,
    };

    use super::super::pool::MessagePool;
    use super::{handle_inbound_stream, split_frame};

    #[test]
    fn split_frame_test() {
        let mut buffer = b"ABCD|1.2.3.4:9000|hello\nEFGH|5.6".to_vec();

        assert_eq!(
            split_frame(&mut buffer),
            Some(b"ABCD|1.2.3.4:9000|hello".to_vec())
        );
        // The incomplete tail stays buffered.
        assert_eq!(split_frame(&mut buffer), None);
        assert_eq!(buffer, b"EFGH|5.6".to_vec());
    }

    #[test]
    fn split_frame_drains_back_to_back_frames_test() {
        let mut buffer = b"first\nsecond\n".to_vec();

        assert_eq!(split_frame(&mut buffer), Some(b"first".to_vec()));
        assert_eq!(split_frame(&mut buffer), Some(b"second".to_vec()));
        assert_eq!(split_frame(&mut buffer), None);
        assert!(buffer.is_empty());
    }

    #[test]
    fn inbound_stream_admission_test() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let listener_addr = listener.local_addr().unwrap();

        let pool = Arc::new(Mutex::new(MessagePool::new(5)));
        let shutdown = Arc::new(AtomicBool::new(false));

        let receiver = {
            let pool = Arc::clone(&pool);
            let shutdown = Arc::clone(&shutdown);

            thread::spawn(move || {
                let (stream, _) = listener.accept().unwrap();
                handle_inbound_stream(stream, pool, shutdown);
            })
        };

        let mut sender = TcpStream::connect(listener_addr).unwrap();

        // One frame split across two writes, one malformed frame
        // (short identifier) and one duplicate of the first frame.
        sender.write_all(b"ABCD|1.2.3.4:9000|he").unwrap();
        sender.write_all(b"llo\nXY|bad|frame\n").unwrap();
        sender
            .write_all(b"EFGH|5.6.7.8:9000|world\nABCD|1.2.3.4:9000|hello\n")
            .unwrap();
        drop(sender);

        // The receiver loop exits once the peer closes its end.
        receiver.join().unwrap();

        let pool_lock = pool.lock().unwrap();
        assert_eq!(pool_lock.counter_of("ABCD"), Some(5));
        assert_eq!(pool_lock.counter_of("EFGH"), Some(5));
        assert_eq!(pool_lock.counter_of("XY"), None);
    }
}
