//! RSA public key materialization from JWK components
//!
//! Providers publish the modulus and exponent as unpadded base64url. The
//! exponent is read through an 8-byte big-endian carrier: shorter encodings
//! are left-padded with zeros, so `AQAB` and `AAEAAQ` both yield 65537.
//!
//! No range checks are applied here. A key with a nonsensical modulus or
//! exponent still materializes; it simply never verifies a signature.

use base64::Engine;
use base64::alphabet;
use base64::engine::{GeneralPurpose, GeneralPurposeConfig};
use rsa::{BigUint, RsaPublicKey};

use super::Key;
use crate::error::{Result, VerifyError};

/// URL-safe alphabet, padding required after we pad, trailing bits tolerated
const URL_SAFE_PADDED: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Width of the exponent carrier in bytes
const EXPONENT_WIDTH: usize = 8;

/// Decode base64url text, padding it to a multiple of four first
///
/// # Errors
///
/// Returns [`VerifyError::Decode`] on characters outside the URL-safe
/// alphabet or an impossible length.
pub fn decode_base64url(input: &str) -> Result<Vec<u8>> {
    let remainder = input.len() % 4;
    let decoded = if remainder == 0 {
        URL_SAFE_PADDED.decode(input)
    } else {
        let mut padded = String::with_capacity(input.len() + 4 - remainder);
        padded.push_str(input);
        padded.extend(std::iter::repeat_n('=', 4 - remainder));
        URL_SAFE_PADDED.decode(padded)
    };
    decoded.map_err(|e| VerifyError::Decode(format!("invalid base64url: {e}")))
}

/// Decode the RSA modulus as a big-endian unsigned integer
///
/// # Errors
///
/// Returns [`VerifyError::Decode`] if `encoded` is not base64url.
pub fn decode_modulus(encoded: &str) -> Result<BigUint> {
    Ok(BigUint::from_bytes_be(&decode_base64url(encoded)?))
}

/// Decode the RSA exponent through the 8-byte big-endian carrier
///
/// Encodings longer than eight bytes are truncated to their first eight.
///
/// # Errors
///
/// Returns [`VerifyError::Decode`] if `encoded` is not base64url.
pub fn decode_exponent(encoded: &str) -> Result<u64> {
    let bytes = decode_base64url(encoded)?;
    let mut carrier = [0u8; EXPONENT_WIDTH];
    if bytes.len() < EXPONENT_WIDTH {
        carrier[EXPONENT_WIDTH - bytes.len()..].copy_from_slice(&bytes);
    } else {
        carrier.copy_from_slice(&bytes[..EXPONENT_WIDTH]);
    }
    Ok(u64::from_be_bytes(carrier))
}

/// Build the RSA public key for `key` without touching its memo
pub(crate) fn materialize(key: &Key) -> Result<RsaPublicKey> {
    let n = decode_modulus(&key.n)?;
    let e = decode_exponent(&key.e)?;
    Ok(RsaPublicKey::new_unchecked(n, BigUint::from(e)))
}
