//! Wire-level invariants of the ClientHello fragmenter.

use simurgh::{FragmentSettings, FragmentingStream, RngService};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// A ClientHello large enough to exercise every fragmentation stage.
fn client_hello() -> Vec<u8> {
    let mut hello = vec![
        0x16, 0x03, 0x01, 0x00, 0x00, // record header, length patched below
        0x01, 0x00, 0x00, 0x00, // handshake header
        0x03, 0x03, // client version
    ];
    hello.extend(std::iter::repeat(0xAB).take(32)); // random
    hello.push(0x00); // session id length
    hello.extend([0x00, 0x06, 0x13, 0x01, 0x13, 0x02, 0x13, 0x03]); // ciphers
    hello.extend([0x01, 0x00]); // compression
    hello.extend([0x00, 0x20]); // extensions length
    // SNI extension for "internal.example"
    hello.extend([0x00, 0x00, 0x00, 0x15, 0x00, 0x13, 0x00, 0x00, 0x10]);
    hello.extend(b"internal.example");
    // trailing extension filler
    hello.extend([0x00, 0x17, 0x00, 0x00, 0x00, 0x2b, 0x00, 0x00]);

    let payload_len = (hello.len() - 5) as u16;
    hello[3] = (payload_len >> 8) as u8;
    hello[4] = payload_len as u8;
    hello
}

#[tokio::test]
async fn fragmented_hello_reassembles_byte_identical() {
    let (client, mut server) = tokio::io::duplex(64 * 1024);
    let settings = FragmentSettings {
        fragment_size: 4,
        delay: Duration::from_millis(1),
    };
    let mut stream = FragmentingStream::new(client, settings, RngService::with_seed(101));

    let hello = client_hello();
    stream.write_all(&hello).await.unwrap();
    stream.flush().await.unwrap();

    assert!(
        stream.fragments_used() >= 3,
        "expected header + SNI chunks + tail, got {}",
        stream.fragments_used()
    );

    let mut received = vec![0u8; hello.len()];
    server.read_exact(&mut received).await.unwrap();
    assert_eq!(received, hello);
}

#[tokio::test]
async fn only_the_first_write_may_be_segmented() {
    let (client, mut server) = tokio::io::duplex(64 * 1024);
    let settings = FragmentSettings {
        fragment_size: 3,
        delay: Duration::ZERO,
    };
    let mut stream = FragmentingStream::new(client, settings, RngService::with_seed(102));

    let hello = client_hello();
    stream.write_all(&hello).await.unwrap();
    let after_first = stream.fragments_used();
    assert!(after_first > 1);

    // Later writes, handshake-shaped or not, pass through untouched.
    let later: [&[u8]; 3] = [
        &hello,
        b"application data",
        &[0x16, 0x03, 0x01, 0x00, 0x05, 0xFF],
    ];
    for payload in later {
        stream.write_all(payload).await.unwrap();
        stream.flush().await.unwrap();
        assert_eq!(stream.fragments_used(), after_first);

        let mut received = vec![0u8; payload.len()];
        // The first write is still buffered ahead of us on the first loop
        // iteration; drain the hello first.
        if payload == &hello[..] {
            let mut first = vec![0u8; hello.len()];
            server.read_exact(&mut first).await.unwrap();
            assert_eq!(first, hello);
        }
        server.read_exact(&mut received).await.unwrap();
        assert_eq!(received, payload);
    }
}

#[tokio::test]
async fn disabled_wrapper_never_touches_traffic() {
    let (client, mut server) = tokio::io::duplex(64 * 1024);
    let mut stream = FragmentingStream::disabled(client);

    let hello = client_hello();
    stream.write_all(&hello).await.unwrap();
    stream.flush().await.unwrap();
    assert_eq!(stream.fragments_used(), 0);

    let mut received = vec![0u8; hello.len()];
    server.read_exact(&mut received).await.unwrap();
    assert_eq!(received, hello);
}

#[tokio::test]
async fn inter_chunk_delay_spreads_the_hello_over_time() {
    let (client, mut server) = tokio::io::duplex(64 * 1024);
    let settings = FragmentSettings {
        fragment_size: 3,
        delay: Duration::from_millis(2),
    };
    let mut stream = FragmentingStream::new(client, settings, RngService::with_seed(103));

    let hello = client_hello();
    let started = std::time::Instant::now();
    let reader = tokio::spawn(async move {
        let mut received = vec![0u8; hello.len()];
        server.read_exact(&mut received).await.unwrap();
        received
    });

    let hello = client_hello();
    stream.write_all(&hello).await.unwrap();
    stream.flush().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(reader.await.unwrap(), hello);
    // With at least a few chunks and >= 1 ms floors, the write cannot have
    // been instantaneous.
    assert!(elapsed >= Duration::from_millis(3), "write finished in {elapsed:?}");
}
