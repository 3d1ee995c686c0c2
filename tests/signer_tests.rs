/// Unit tests for request signing.
///
/// Covers the HMAC-SHA256 signer against published vectors and the
/// properties every signer must have (deterministic, hex, keyed).
use binance_service::signer::{HmacSigner, Signer};

#[test]
fn test_rfc4231_vector() {
    let signer = HmacSigner::new("Jefe");
    assert_eq!(
        signer.sign(b"what do ya want for nothing?"),
        "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
    );
}

#[test]
fn test_exchange_documentation_vector() {
    let signer =
        HmacSigner::new("NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j");
    let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1\
                 &recvWindow=5000&timestamp=1499827319559";
    assert_eq!(
        signer.sign(query.as_bytes()),
        "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
    );
}

#[test]
fn test_signature_is_deterministic_lowercase_hex() {
    let signer = HmacSigner::new("secret");
    let a = signer.sign(b"symbol=BTCUSDT&limit=5");
    let b = signer.sign(b"symbol=BTCUSDT&limit=5");

    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
    assert!(a
        .chars()
        .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
}

#[test]
fn test_signature_depends_on_secret_and_payload() {
    let one = HmacSigner::new("secret-one");
    let two = HmacSigner::new("secret-two");

    assert_ne!(one.sign(b"payload"), two.sign(b"payload"));
    assert_ne!(one.sign(b"payload"), one.sign(b"payload2"));
}

#[test]
fn test_empty_payload_signs() {
    let signer = HmacSigner::new("secret");
    assert_eq!(signer.sign(b"").len(), 64);
}

#[test]
fn test_verify_round_trip() {
    let signer = HmacSigner::new("secret");
    let sig = signer.sign(b"timestamp=1");

    assert!(signer.verify(b"timestamp=1", &sig));
    assert!(!signer.verify(b"timestamp=2", &sig));
    assert!(!signer.verify(b"timestamp=1", "not-hex"));
}

#[test]
fn test_debug_redacts_secret() {
    let signer = HmacSigner::new("super-secret-value");
    let shown = format!("{signer:?}");
    assert!(!shown.contains("super-secret-value"));
    assert!(shown.contains("redacted"));
}
