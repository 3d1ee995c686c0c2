/// Authenticated request construction.
///
/// Turns an [`OutgoingRequest`] into a `reqwest::Request`:
///
/// 1. join base URL and endpoint path
/// 2. form-urlencode the parameters in [`Params`] order
/// 3. attach the `X-MBX-APIKEY` header when the request needs the API key
/// 4. when the request is signed, sign the encoded parameters and append
///    `signature` after them without re-encoding the signed prefix
///
/// [`RequestBuilder::encode`] exposes step 2 and 4 on their own so the exact
/// bytes that were signed can be compared with the bytes that are sent.
use std::fmt;
use std::sync::Arc;

use log::debug;
use reqwest::header::HeaderValue;
use reqwest::{Client, Method};
use url::{form_urlencoded, Url};

use crate::errors::BinanceError;
use crate::signer::Signer;

/// Header carrying the API key on authenticated requests.
pub const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Query parameter carrying the request signature.
pub const SIGNATURE_PARAM: &str = "signature";

/// Insertion-ordered query parameters.
///
/// Encoding always follows insertion order, so the string that is signed and
/// the string that is sent are produced by the same rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    pairs: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter.
    pub fn push(&mut self, key: impl Into<String>, value: impl ToString) -> &mut Self {
        self.pairs.push((key.into(), value.to_string()));
        self
    }

    /// Append a parameter only when `value` is present.
    pub fn push_opt<V: ToString>(&mut self, key: impl Into<String>, value: Option<V>) -> &mut Self {
        if let Some(value) = value {
            self.push(key, value);
        }
        self
    }

    /// Builder-style [`Params::push`].
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.push(key, value);
        self
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The canonical `application/x-www-form-urlencoded` form.
    pub fn encode(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.pairs {
            serializer.append_pair(key, value);
        }
        serializer.finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// One REST call, before it is turned into HTTP.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: Method,
    /// Path relative to the base URL, e.g. `api/v3/depth`.
    pub endpoint: String,
    pub params: Params,
    pub requires_api_key: bool,
    pub requires_signature: bool,
}

impl OutgoingRequest {
    /// A request with neither API key nor signature.
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            params: Params::new(),
            requires_api_key: false,
            requires_signature: false,
        }
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_api_key(mut self) -> Self {
        self.requires_api_key = true;
        self
    }

    pub fn signed(mut self) -> Self {
        self.requires_signature = true;
        self
    }
}

/// The encoded query of a request, split into what was signed and what is sent.
///
/// For signed requests `query == payload + "&signature=" + signature`
/// (without the `&` when `payload` is empty). Unsigned requests have
/// `query == payload` and no signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedQuery {
    pub payload: String,
    pub signature: Option<String>,
    pub query: String,
}

/// Assembles outbound requests against one base URL with one set of credentials.
#[derive(Clone)]
pub struct RequestBuilder {
    base_url: Url,
    api_key: String,
    signer: Option<Arc<dyn Signer>>,
}

impl RequestBuilder {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        signer: Option<Arc<dyn Signer>>,
    ) -> Result<Self, BinanceError> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(BinanceError::Construction(format!(
                "base URL cannot carry a path: {base_url}"
            )));
        }
        Ok(Self {
            base_url,
            api_key: api_key.into(),
            signer,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Join the base URL and an endpoint path.
    pub fn url(&self, endpoint: &str) -> Result<Url, BinanceError> {
        if endpoint.contains(['?', '#']) {
            return Err(BinanceError::Construction(format!(
                "endpoint must be a plain path: {endpoint}"
            )));
        }
        let joined = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        );
        Ok(Url::parse(&joined)?)
    }

    /// Encode the request's parameters and sign them if required.
    pub fn encode(&self, request: &OutgoingRequest) -> Result<SignedQuery, BinanceError> {
        let payload = request.params.encode();
        if !request.requires_signature {
            return Ok(SignedQuery {
                query: payload.clone(),
                payload,
                signature: None,
            });
        }

        if request.params.contains_key(SIGNATURE_PARAM) {
            return Err(BinanceError::Construction(format!(
                "`{SIGNATURE_PARAM}` is reserved on signed requests"
            )));
        }
        let signer = self.signer.as_ref().ok_or_else(|| {
            BinanceError::Construction(format!(
                "{} requires a signature but no signer is configured",
                request.endpoint
            ))
        })?;

        debug!("request.sign endpoint={} payload={}", request.endpoint, payload);
        let signature = signer.sign(payload.as_bytes());
        // for_suffix keeps the existing bytes and only appends `&signature=..`.
        let query = form_urlencoded::Serializer::for_suffix(payload.clone(), 0)
            .append_pair(SIGNATURE_PARAM, &signature)
            .finish();

        Ok(SignedQuery {
            payload,
            signature: Some(signature),
            query,
        })
    }

    /// Build the HTTP request without sending it.
    pub fn build(
        &self,
        client: &Client,
        request: &OutgoingRequest,
    ) -> Result<reqwest::Request, BinanceError> {
        let mut url = self.url(&request.endpoint)?;
        let encoded = self.encode(request)?;
        if encoded.query.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(&encoded.query));
        }

        let mut builder = client.request(request.method.clone(), url);
        if request.requires_api_key {
            if self.api_key.is_empty() {
                return Err(BinanceError::Construction(format!(
                    "{} requires an API key but none is configured",
                    request.endpoint
                )));
            }
            let value = HeaderValue::from_str(&self.api_key)
                .map_err(|e| BinanceError::Construction(format!("invalid API key header: {e}")))?;
            builder = builder.header(API_KEY_HEADER, value);
        }

        debug!(
            "request.build method={} endpoint={} params={} api_key={} signed={}",
            request.method,
            request.endpoint,
            request.params.len(),
            request.requires_api_key,
            request.requires_signature
        );
        Ok(builder.build()?)
    }
}

impl fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"<redacted>")
            .field("signer", &self.signer)
            .finish()
    }
}
