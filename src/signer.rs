/// Request signing.
///
/// A [`Signer`] turns the canonical query string of a request into the value
/// sent as the `signature` parameter. [`HmacSigner`] implements the exchange's
/// HMAC-SHA256 scheme; other implementations (KMS, HSM, test doubles) plug in
/// through the trait.
use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::errors::BinanceError;

type HmacSha256 = Hmac<Sha256>;

/// Environment variable read by [`HmacSigner::from_env`].
pub const SECRET_KEY_ENV: &str = "BINANCE_SECRET_KEY";

/// Produces a signature over an arbitrary byte string.
///
/// Implementations must be deterministic for a given secret and input, and
/// must hold no mutable state: one signer is shared by every in-flight request.
pub trait Signer: Send + Sync + fmt::Debug {
    /// Sign `payload`, returning the value to send as `signature`.
    fn sign(&self, payload: &[u8]) -> String;
}

/// HMAC-SHA256 signer returning a lowercase hex digest.
#[derive(Clone)]
pub struct HmacSigner {
    secret: Vec<u8>,
}

impl HmacSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Load the secret from `BINANCE_SECRET_KEY`.
    pub fn from_env() -> Result<Self, BinanceError> {
        let secret = std::env::var(SECRET_KEY_ENV)
            .map_err(|_| BinanceError::Config(format!("{SECRET_KEY_ENV} is not set")))?;
        if secret.is_empty() {
            return Err(BinanceError::Config(format!("{SECRET_KEY_ENV} is empty")));
        }
        Ok(Self::new(secret))
    }

    /// Check a signature produced by this signer.
    pub fn verify(&self, payload: &[u8], signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        // HMAC accepts keys of any length, so this cannot fail.
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.secret) else {
            return false;
        };
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    }
}

impl Signer for HmacSigner {
    fn sign(&self, payload: &[u8]) -> String {
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC accepts keys of any length"),
        };
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }
}

// Never print the secret.
impl fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacSigner")
            .field("secret", &"<redacted>")
            .finish()
    }
}
