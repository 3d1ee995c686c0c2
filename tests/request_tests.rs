/// Unit tests for request assembly and signing.
///
/// Checks that the query which is signed is byte-identical to the prefix of
/// the query which is sent, and that credentials are attached only where a
/// request asks for them.
use std::collections::HashMap;
use std::sync::Arc;

use binance_service::errors::BinanceError;
use binance_service::request::{
    OutgoingRequest, Params, RequestBuilder, API_KEY_HEADER, SIGNATURE_PARAM,
};
use binance_service::signer::{HmacSigner, Signer};
use reqwest::{Client, Method};

const BASE: &str = "https://api.binance.com";

fn signed_builder() -> (RequestBuilder, HmacSigner) {
    let signer = HmacSigner::new("test-secret");
    let builder = RequestBuilder::new(BASE, "test-key", Some(Arc::new(signer.clone()))).unwrap();
    (builder, signer)
}

fn depth_params() -> Params {
    let mut params = Params::new();
    params.push("symbol", "BTCUSDT").push("limit", 5);
    params
}

#[test]
fn test_signature_appended_after_signed_prefix() {
    let (builder, signer) = signed_builder();
    let request = OutgoingRequest::new(Method::GET, "api/v3/depth")
        .params(depth_params())
        .with_api_key()
        .signed();

    let encoded = builder.encode(&request).unwrap();
    let expected_sig = signer.sign(b"symbol=BTCUSDT&limit=5");

    assert_eq!(encoded.payload, "symbol=BTCUSDT&limit=5");
    assert_eq!(encoded.signature.as_deref(), Some(expected_sig.as_str()));
    assert_eq!(
        encoded.query,
        format!("symbol=BTCUSDT&limit=5&signature={expected_sig}")
    );
}

#[test]
fn test_signature_on_empty_params_has_no_leading_separator() {
    let (builder, signer) = signed_builder();
    let request = OutgoingRequest::new(Method::POST, "api/v3/userDataStream")
        .with_api_key()
        .signed();

    let encoded = builder.encode(&request).unwrap();
    assert_eq!(encoded.payload, "");
    assert_eq!(encoded.query, format!("signature={}", signer.sign(b"")));
}

#[test]
fn test_unsigned_request_has_no_signature() {
    let (builder, _) = signed_builder();
    let request = OutgoingRequest::new(Method::GET, "api/v3/depth").params(depth_params());

    let encoded = builder.encode(&request).unwrap();
    assert_eq!(encoded.signature, None);
    assert_eq!(encoded.query, "symbol=BTCUSDT&limit=5");
    assert!(!encoded.query.contains(SIGNATURE_PARAM));
}

#[tokio::test]
async fn test_built_url_carries_exactly_the_signed_bytes() {
    let (builder, signer) = signed_builder();
    let mut params = Params::new();
    params
        .push("symbol", "BTCUSDT")
        .push("newClientOrderId", "my order/1")
        .push("price", "0.00010000");
    let request = OutgoingRequest::new(Method::POST, "api/v3/order")
        .params(params)
        .with_api_key()
        .signed();

    let encoded = builder.encode(&request).unwrap();
    let http = builder.build(&Client::new(), &request).unwrap();
    let sent = http.url().query().unwrap();

    assert_eq!(sent, encoded.query);
    let (prefix, signature) = sent.rsplit_once("&signature=").unwrap();
    assert_eq!(prefix, encoded.payload);
    assert!(signer.verify(prefix.as_bytes(), signature));
    assert_eq!(http.url().path(), "/api/v3/order");
    assert_eq!(http.method(), Method::POST);
}

#[tokio::test]
async fn test_hash_map_params_sign_and_send_in_the_same_order() {
    let (builder, signer) = signed_builder();
    let source: HashMap<&str, String> = (0..16)
        .map(|i| (["a", "b", "c", "d", "e", "f", "g", "h"][i % 8], i.to_string()))
        .collect();
    let params: Params = source.into_iter().collect();
    let request = OutgoingRequest::new(Method::GET, "api/v3/account")
        .params(params)
        .with_api_key()
        .signed();

    let http = builder.build(&Client::new(), &request).unwrap();
    let sent = http.url().query().unwrap();
    let (prefix, signature) = sent.rsplit_once("&signature=").unwrap();

    assert_eq!(signature, signer.sign(prefix.as_bytes()));
}

#[tokio::test]
async fn test_api_key_header_only_when_required() {
    let (builder, _) = signed_builder();
    let client = Client::new();

    let public = OutgoingRequest::new(Method::GET, "api/v3/ping");
    let http = builder.build(&client, &public).unwrap();
    assert!(http.headers().get(API_KEY_HEADER).is_none());

    let keyed = OutgoingRequest::new(Method::GET, "api/v3/ping").with_api_key();
    let http = builder.build(&client, &keyed).unwrap();
    assert_eq!(http.headers().get(API_KEY_HEADER).unwrap(), "test-key");
}

#[tokio::test]
async fn test_missing_api_key_is_construction_error() {
    let signer: Arc<dyn Signer> = Arc::new(HmacSigner::new("secret"));
    let builder = RequestBuilder::new(BASE, "", Some(signer)).unwrap();
    let request = OutgoingRequest::new(Method::GET, "api/v3/account")
        .with_api_key()
        .signed();

    let err = builder.build(&Client::new(), &request).unwrap_err();
    assert!(matches!(err, BinanceError::Construction(_)), "got {err:?}");
}

#[test]
fn test_missing_signer_is_construction_error() {
    let builder = RequestBuilder::new(BASE, "key", None).unwrap();
    let request = OutgoingRequest::new(Method::GET, "api/v3/account")
        .with_api_key()
        .signed();

    let err = builder.encode(&request).unwrap_err();
    assert!(matches!(err, BinanceError::Construction(_)), "got {err:?}");
}

#[test]
fn test_caller_supplied_signature_is_rejected() {
    let (builder, _) = signed_builder();
    let params = Params::new().with("symbol", "BTCUSDT").with("signature", "forged");
    let request = OutgoingRequest::new(Method::GET, "api/v3/order")
        .params(params)
        .with_api_key()
        .signed();

    assert!(matches!(
        builder.encode(&request),
        Err(BinanceError::Construction(_))
    ));
}

#[test]
fn test_endpoint_with_query_is_rejected() {
    let (builder, _) = signed_builder();
    assert!(builder.url("api/v3/depth?symbol=BTCUSDT").is_err());
    assert!(builder.url("api/v3/depth#frag").is_err());
}

#[test]
fn test_url_join_handles_slashes() {
    let builder = RequestBuilder::new("https://api.binance.com/", "", None).unwrap();
    assert_eq!(
        builder.url("/api/v3/time").unwrap().as_str(),
        "https://api.binance.com/api/v3/time"
    );

    let prefixed = RequestBuilder::new("http://127.0.0.1:8080/proxy", "", None).unwrap();
    assert_eq!(
        prefixed.url("api/v3/time").unwrap().as_str(),
        "http://127.0.0.1:8080/proxy/api/v3/time"
    );
}

#[test]
fn test_invalid_base_url_is_construction_error() {
    let err = RequestBuilder::new("not a url", "", None).unwrap_err();
    assert!(matches!(err, BinanceError::Construction(_)));

    let err = RequestBuilder::new("mailto:ops@example.com", "", None).unwrap_err();
    assert!(matches!(err, BinanceError::Construction(_)));
}

#[test]
fn test_params_preserve_insertion_order_and_encode() {
    let mut params = Params::new();
    params
        .push("z", "last-alphabetically")
        .push("a", "first")
        .push_opt("skipped", None::<u32>)
        .push_opt("m", Some("x y"));

    assert_eq!(params.len(), 3);
    assert_eq!(params.get("m"), Some("x y"));
    assert!(!params.contains_key("skipped"));
    assert_eq!(params.encode(), "z=last-alphabetically&a=first&m=x+y");
}

#[test]
fn test_debug_redacts_api_key() {
    let builder = RequestBuilder::new(BASE, "very-secret-key", None).unwrap();
    assert!(!format!("{builder:?}").contains("very-secret-key"));
}
