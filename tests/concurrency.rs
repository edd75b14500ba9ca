#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Concurrency tests for the hand-off queue and the shared packet cipher

use gamewire::utils::crypto::{KeyPair, PacketCipher, Role, SessionCrypto};
use gamewire::{BlockingQueue, Packet};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

// ============================================================================
// QUEUE HAND-OFF
// ============================================================================

#[test]
fn test_queue_handoff_between_io_and_game_thread() {
    let queue = Arc::new(BlockingQueue::new());

    let producer = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            for i in 0..1000u32 {
                queue.push_back(i);
            }
        })
    };

    let mut received = Vec::with_capacity(1000);
    while received.len() < 1000 {
        match queue.pop_front_timeout(Duration::from_secs(5)) {
            Some(value) => received.push(value),
            None => panic!("queue starved"),
        }
    }
    producer.join().expect("producer");

    // Single producer, single consumer: order is exact.
    for (i, value) in received.into_iter().enumerate() {
        assert_eq!(value, i as u32);
    }
}

#[test]
fn test_wake_releases_every_blocked_consumer() {
    let queue: Arc<BlockingQueue<u32>> = Arc::new(BlockingQueue::new());

    let consumers: Vec<_> = (0..4)
        .map(|_| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop_front())
        })
        .collect();

    thread::sleep(Duration::from_millis(50));
    queue.wake();

    for consumer in consumers {
        assert_eq!(consumer.join().expect("join"), None);
    }
}

#[test]
fn test_wake_drains_remaining_items_before_none() {
    let queue: Arc<BlockingQueue<u32>> = Arc::new(BlockingQueue::new());
    queue.push_back(1);
    queue.push_back(2);
    queue.wake();

    assert_eq!(queue.pop_front(), Some(1));
    assert_eq!(queue.pop_front(), Some(2));
    assert_eq!(queue.pop_front(), None);
}

// ============================================================================
// SHARED CIPHER
// ============================================================================

fn session_pair() -> (SessionCrypto, SessionCrypto) {
    let server_keys = KeyPair::generate();
    let client_keys = KeyPair::generate();
    let server = SessionCrypto::new(&server_keys, &client_keys.public_bytes(), Role::Server)
        .expect("server session");
    let client = SessionCrypto::new(&client_keys, &server_keys.public_bytes(), Role::Client)
        .expect("client session");
    (server, client)
}

#[test]
fn test_cipher_shared_across_threads() {
    let (server, client) = session_pair();
    let seal = Arc::new(PacketCipher::Session(server));
    let open = Arc::new(PacketCipher::Session(client));

    let handles: Vec<_> = (0..8u64)
        .map(|t| {
            let seal = Arc::clone(&seal);
            let open = Arc::clone(&open);
            thread::spawn(move || {
                for i in 0..200u64 {
                    let value = t * 1_000 + i;
                    let mut packet = Packet::with(1u32, value);
                    seal.encrypt(&mut packet).expect("encrypt");
                    assert!(packet.header.is_encrypted());
                    open.decrypt(&mut packet).expect("decrypt");
                    assert_eq!(packet.pop::<u64>().expect("pop"), value);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker");
    }
}

#[test]
fn test_ciphers_from_unrelated_handshakes_do_not_interoperate() {
    let (server_a, _client_a) = session_pair();
    let (_server_b, client_b) = session_pair();

    let mut packet = Packet::with(1u32, 42u32);
    server_a.encrypt(&mut packet).expect("encrypt");
    assert!(client_b.decrypt(&mut packet).is_err());
}
