//! Failure-path tests: incomplete or tampered fraction sets, transport
//! failures mid-fetch, and a server answering with the wrong key. Every case
//! must abort without the payload becoming observable.

use base64::{prelude::BASE64_STANDARD, Engine as _};
use bytes::Bytes;
use ember_client::{fetch_all, FetchError};
use ember_core::fraction::Fraction;
use ember_core::{assemble, AssembleError, IntegrityError, IntegrityPolicy, SymmetricKey};

use crate::{fractionate, seal_fraction, InMemoryServer, TEST_KEY};

fn test_key() -> SymmetricKey {
    SymmetricKey::new(TEST_KEY.to_vec())
}

#[tokio::test]
async fn missing_fraction_is_an_integrity_error() {
    // Indices {0, 1, 3} — the set is incomplete no matter the order.
    let bodies = vec![
        seal_fraction(&TEST_KEY, 0, b"aaaaaaaa"),
        seal_fraction(&TEST_KEY, 1, b"bbbbbbbb"),
        seal_fraction(&TEST_KEY, 3, b"dddddddd"),
    ];
    let mut server = InMemoryServer::new(bodies);

    let fractions = fetch_all(&mut server).await.unwrap();
    let err = assemble(fractions, &test_key(), IntegrityPolicy::Explicit).unwrap_err();
    assert!(matches!(
        err,
        AssembleError::Integrity(IntegrityError::MissingIndex(2))
    ));
}

#[tokio::test]
async fn duplicate_fraction_is_an_integrity_error() {
    let dup = seal_fraction(&TEST_KEY, 1, b"bbbbbbbb");
    let bodies = vec![seal_fraction(&TEST_KEY, 0, b"aaaaaaaa"), dup.clone(), dup];
    let mut server = InMemoryServer::new(bodies);

    let fractions = fetch_all(&mut server).await.unwrap();
    let err = assemble(fractions, &test_key(), IntegrityPolicy::Explicit).unwrap_err();
    assert!(matches!(
        err,
        AssembleError::Integrity(IntegrityError::DuplicateIndex(1))
    ));
}

#[tokio::test]
async fn tampered_ciphertext_fails_the_checksum_first() {
    let mut bodies = fractionate(&TEST_KEY, b"thirty-two bytes of payload data", &[16, 16]);
    // Flip one ciphertext byte of fraction 1 without touching its digest.
    let last = bodies[1].len() - 1;
    bodies[1][last] ^= 0x80;
    let mut server = InMemoryServer::new(bodies);

    let fractions = fetch_all(&mut server).await.unwrap();
    let err = assemble(fractions, &test_key(), IntegrityPolicy::Explicit).unwrap_err();
    assert!(matches!(
        err,
        AssembleError::Integrity(IntegrityError::ChecksumMismatch(1))
    ));
}

#[tokio::test]
async fn tampering_under_implicit_policy_is_a_decryption_failure() {
    let bodies: Vec<Vec<u8>> = fractionate(&TEST_KEY, b"thirty-two bytes of payload data", &[16, 16])
        .into_iter()
        .enumerate()
        .map(|(i, body)| {
            if i != 1 {
                return body;
            }
            // Re-encode with a corrupted ciphertext and a matching digest, so
            // only the AEAD tag can catch it.
            let f = Fraction::parse(&body).unwrap();
            let mut ciphertext = f.ciphertext().to_vec();
            ciphertext[0] ^= 0x01;
            let digest = *blake3::hash(&ciphertext).as_bytes();
            Fraction::new(f.index(), *f.nonce(), digest, Bytes::from(ciphertext)).encode()
        })
        .collect();
    let mut server = InMemoryServer::new(bodies);

    let fractions = fetch_all(&mut server).await.unwrap();
    let err = assemble(fractions, &test_key(), IntegrityPolicy::Implicit).unwrap_err();
    assert!(matches!(err, AssembleError::Decryption(1)));
}

#[tokio::test]
async fn transport_failure_mid_fetch_yields_no_fractions() {
    let bodies = fractionate(&TEST_KEY, b"thirty-two bytes of payload data", &[8, 8, 8, 8]);
    let mut server = InMemoryServer::new(bodies);
    server.fail_at = Some(2);

    let err = fetch_all(&mut server).await.unwrap_err();
    assert!(matches!(err, FetchError::Channel(_)));
}

#[tokio::test]
async fn server_answering_with_the_wrong_key_fails_opaquely() {
    let wrong_key = [0xEE; 32];
    let bodies = fractionate(&wrong_key, b"sealed under a key we never negotiated!!", &[20, 20]);
    let mut server = InMemoryServer::new(bodies);

    let fractions = fetch_all(&mut server).await.unwrap();
    let err = assemble(fractions, &test_key(), IntegrityPolicy::Implicit).unwrap_err();
    // The first fraction fails and the error names nothing but its index.
    assert!(matches!(err, AssembleError::Decryption(0)));
    assert_eq!(err.to_string(), "fraction 0 failed to decrypt");
}

#[tokio::test]
async fn garbage_fraction_body_aborts_the_fetch() {
    let bodies = vec![
        seal_fraction(&TEST_KEY, 0, b"good fraction"),
        b"\xDE\xAD\xBE\xEFnot long enough".to_vec(),
    ];
    let mut server = InMemoryServer::new(bodies);

    let err = fetch_all(&mut server).await.unwrap_err();
    assert!(matches!(err, FetchError::Malformed(_)));
}

#[tokio::test]
async fn base64_garbage_from_key_exchange_is_rejected() {
    use ember_core::{KeyExchangeError, KeyPair};

    let keypair = KeyPair::generate().unwrap();
    let err = keypair.recover_symmetric_key("@@@not base64@@@").unwrap_err();
    assert!(matches!(err, KeyExchangeError::Encoding(_)));
    // And well-formed base64 of garbage bytes fails opaquely.
    let keypair = KeyPair::generate().unwrap();
    let garbage = BASE64_STANDARD.encode([0x42u8; 256]);
    let err = keypair.recover_symmetric_key(&garbage).unwrap_err();
    assert!(matches!(err, KeyExchangeError::Decryption));
}
