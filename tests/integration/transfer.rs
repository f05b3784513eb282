//! End-to-end transfer tests: real key exchange, fetch in both transport
//! modes, assembly under both integrity policies, and one run over an actual
//! TCP connection.

use base64::{prelude::BASE64_STANDARD, Engine as _};
use bytes::Bytes;
use ember_client::{fetch_all, HttpChannel, ServerChannel};
use ember_core::fraction::Fraction;
use ember_core::{assemble, IntegrityPolicy, KeyPair};
use rand::rngs::OsRng;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use sha2::Sha256;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use crate::{exchange_key, fractionate, seal_fraction, InMemoryServer, TEST_KEY};

#[tokio::test]
async fn count_mode_round_trips_a_permuted_payload() {
    let payload: Vec<u8> = (0u8..=255).cycle().take(1024).collect();
    let mut bodies = fractionate(&TEST_KEY, &payload, &[128; 8]);
    // Serve in the order 5 2 7 0 3 6 1 4.
    let order = [5usize, 2, 7, 0, 3, 6, 1, 4];
    bodies = order.iter().map(|&i| bodies[i].clone()).collect();

    let mut server = InMemoryServer::new(bodies);
    let key = exchange_key(&mut server).await;
    let fractions = fetch_all(&mut server).await.unwrap();
    let assembled = assemble(fractions, &key, IntegrityPolicy::Explicit).unwrap();

    assert_eq!(assembled.as_bytes(), &payload[..]);
}

#[tokio::test]
async fn locator_mode_round_trips() {
    let payload = b"locator mode carries the same fractions under names".to_vec();
    let bodies = fractionate(&TEST_KEY, &payload, &[13, 13, 13, 12]);

    let mut server = InMemoryServer::new(bodies);
    server.locator_mode = true;
    let key = exchange_key(&mut server).await;
    let fractions = fetch_all(&mut server).await.unwrap();
    let assembled = assemble(fractions, &key, IntegrityPolicy::Explicit).unwrap();

    assert_eq!(assembled.as_bytes(), &payload[..]);
}

#[tokio::test]
async fn uneven_fractions_out_of_order_reassemble_exactly() {
    // 32-byte payload split 10/10/12, served as 2, 0, 1.
    let payload: Vec<u8> = (1u8..=32).collect();
    let bodies = fractionate(&TEST_KEY, &payload, &[10, 10, 12]);
    let served = vec![bodies[2].clone(), bodies[0].clone(), bodies[1].clone()];

    let mut server = InMemoryServer::new(served);
    let key = exchange_key(&mut server).await;
    let fractions = fetch_all(&mut server).await.unwrap();
    let assembled = assemble(fractions, &key, IntegrityPolicy::Explicit).unwrap();

    assert_eq!(assembled.len(), 32);
    assert_eq!(assembled.as_bytes(), &payload[..]);
}

#[tokio::test]
async fn implicit_policy_never_reads_the_digest() {
    let payload = b"digest field is dead weight under the implicit policy".to_vec();
    let bodies: Vec<Vec<u8>> = fractionate(&TEST_KEY, &payload, &[27, 26])
        .into_iter()
        .map(|body| {
            // Zero the digest; only the AEAD tag protects the ciphertext.
            let f = Fraction::parse(&body).unwrap();
            Fraction::new(f.index(), *f.nonce(), [0u8; 32], Bytes::copy_from_slice(f.ciphertext()))
                .encode()
        })
        .collect();

    let mut server = InMemoryServer::new(bodies);
    let key = exchange_key(&mut server).await;
    let fractions = fetch_all(&mut server).await.unwrap();
    let assembled = assemble(fractions, &key, IntegrityPolicy::Implicit).unwrap();

    assert_eq!(assembled.as_bytes(), &payload[..]);
}

// ── Over a real socket ────────────────────────────────────────────────────────

/// Serve the wire protocol on a loopback listener for exactly one client:
/// POST `/` wraps the test key under the transmitted public key, GET `/size`
/// reports the count, GET `/stream` hands out the bodies in order.
async fn spawn_protocol_server(bodies: Vec<Vec<u8>>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut reader = BufReader::new(stream);
        let mut served = 0usize;
        loop {
            // Request head
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap() == 0 {
                return;
            }
            let mut parts = line.split_whitespace();
            let method = parts.next().unwrap().to_string();
            let path = parts.next().unwrap().to_string();
            let mut content_length = 0usize;
            loop {
                line.clear();
                reader.read_line(&mut line).await.unwrap();
                if line == "\r\n" || line == "\n" {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).await.unwrap();

            let response: Vec<u8> = match (method.as_str(), path.as_str()) {
                ("POST", "/") => {
                    let pem = String::from_utf8(body).unwrap();
                    let public = RsaPublicKey::from_public_key_pem(&pem).unwrap();
                    let wrapped = public
                        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &TEST_KEY)
                        .unwrap();
                    BASE64_STANDARD.encode(wrapped).into_bytes()
                }
                ("GET", "/size") => bodies.len().to_string().into_bytes(),
                ("GET", "/stream") => {
                    let body = bodies[served].clone();
                    served += 1;
                    body
                }
                _ => {
                    let head = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n";
                    reader.get_mut().write_all(head.as_bytes()).await.unwrap();
                    continue;
                }
            };
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n",
                response.len()
            );
            let stream = reader.get_mut();
            stream.write_all(head.as_bytes()).await.unwrap();
            stream.write_all(&response).await.unwrap();
        }
    });
    port
}

#[tokio::test]
async fn full_run_over_tcp() {
    let payload: Vec<u8> = (0u8..200).collect();
    let bodies = vec![
        seal_fraction(&TEST_KEY, 1, &payload[80..160]),
        seal_fraction(&TEST_KEY, 2, &payload[160..]),
        seal_fraction(&TEST_KEY, 0, &payload[..80]),
    ];
    let port = spawn_protocol_server(bodies).await;

    let mut channel = HttpChannel::connect("127.0.0.1", port, Duration::from_secs(5))
        .await
        .unwrap();
    let keypair = KeyPair::generate().unwrap();
    let pem = keypair.public_key_pem().unwrap();
    let encoded = channel.negotiate_key(&pem).await.unwrap();
    let key = keypair.recover_symmetric_key(&encoded).unwrap();

    let fractions = fetch_all(&mut channel).await.unwrap();
    let assembled = assemble(fractions, &key, IntegrityPolicy::Explicit).unwrap();

    assert_eq!(assembled.as_bytes(), &payload[..]);
}
