/// Error types for the Binance service layer.
///
/// Every fallible call returns a single [`BinanceError`]. The variants follow
/// the layer that failed: request assembly, the network, the exchange's
/// response, or payload decoding.
use thiserror::Error;

/// Exchange error codes that indicate a transient condition.
const RETRYABLE_CODES: [i64; 4] = [
    -1000, // UNKNOWN
    -1001, // DISCONNECTED
    -1003, // TOO_MANY_REQUESTS
    -1007, // TIMEOUT
];

/// The primary error type for this crate.
#[derive(Error, Debug)]
pub enum BinanceError {
    /// The request could not be assembled (bad base URL, endpoint or parameters).
    #[error("Invalid request: {0}")]
    Construction(String),

    /// DNS, connect, timeout or any other failure below HTTP.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The service-wide cancellation token fired while the call was in flight.
    #[error("Request canceled")]
    Canceled,

    /// Non-2xx response. `code` and `message` come from the exchange's error
    /// payload when one was present, otherwise `message` holds the raw body.
    #[error("API error (HTTP {status}, code {code:?}): {message}")]
    Protocol {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    /// The body or frame did not match the expected schema.
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Error payload returned by the exchange on non-2xx responses.
#[derive(Debug, Clone, serde::Deserialize)]
pub(crate) struct ApiErrorPayload {
    pub code: i64,
    pub msg: String,
}

impl BinanceError {
    /// Build a protocol error from a status code and raw response body.
    ///
    /// Decodes `{"code": .., "msg": ..}` when the body carries it.
    pub fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ApiErrorPayload>(body) {
            Ok(payload) => BinanceError::Protocol {
                status,
                code: Some(payload.code),
                message: payload.msg,
            },
            Err(_) => BinanceError::Protocol {
                status,
                code: None,
                message: body.chars().take(500).collect(),
            },
        }
    }

    /// Returns the exchange error code if this is a coded API error.
    pub fn api_code(&self) -> Option<i64> {
        match self {
            BinanceError::Protocol { code, .. } => *code,
            _ => None,
        }
    }

    /// Returns the HTTP status for protocol errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            BinanceError::Protocol { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for failures below HTTP, including cancellation.
    pub fn is_transport(&self) -> bool {
        matches!(self, BinanceError::Transport(_) | BinanceError::Canceled)
    }

    /// True when the exchange answered with a non-2xx status.
    pub fn is_protocol(&self) -> bool {
        matches!(self, BinanceError::Protocol { .. })
    }

    /// Returns true if this error suggests retrying with backoff.
    ///
    /// The service itself never retries; this is a hint for callers.
    pub fn is_retryable(&self) -> bool {
        match self {
            BinanceError::Transport(_) => true,
            BinanceError::Protocol { status, code, .. } => {
                matches!(status, 418 | 429 | 500..=599)
                    || code.is_some_and(|c| RETRYABLE_CODES.contains(&c))
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for BinanceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            BinanceError::Construction(err.to_string())
        } else if err.is_decode() {
            BinanceError::Decode(err.to_string())
        } else {
            BinanceError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BinanceError {
    fn from(err: serde_json::Error) -> Self {
        BinanceError::Decode(err.to_string())
    }
}

impl From<url::ParseError> for BinanceError {
    fn from(err: url::ParseError) -> Self {
        BinanceError::Construction(format!("URL parse error: {err}"))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BinanceError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        BinanceError::WebSocket(err.to_string())
    }
}
