use base64::{engine::general_purpose, Engine as _};
use ghsm_core::{error::KeyFetchError, model::PublicKeyMaterial};

/// Decode a store public key delivered as standard base64.
pub fn decode_public_key(
    encoded: &str,
    key_id: impl Into<String>,
) -> Result<PublicKeyMaterial, KeyFetchError> {
    let bytes = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| KeyFetchError::InvalidKeyMaterial {
            reason: format!("public key is not valid base64: {e}"),
        })?;

    Ok(PublicKeyMaterial::new(&bytes, key_id)?)
}

/// Base64 form of a key, as the store publishes it.
pub fn encode_public_key(key: &[u8]) -> String {
    general_purpose::STANDARD.encode(key)
}

/// Base64 form of sealed bytes, as the store expects them.
pub fn encode_ciphertext(ciphertext: &[u8]) -> String {
    general_purpose::STANDARD.encode(ciphertext)
}
