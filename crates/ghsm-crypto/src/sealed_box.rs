use crypto_box::PublicKey;
use ghsm_core::{
    error::SealError,
    model::{EncryptedPayload, PublicKeyMaterial, PUBLIC_KEY_LEN},
    store::Encryptor,
};
use rand::rngs::OsRng;

/// Bytes added to every plaintext: the ephemeral public key plus the Poly1305 tag.
pub const SEAL_OVERHEAD: usize = PUBLIC_KEY_LEN + 16;

/// Anonymously seal `plaintext` for the holder of `public_key`'s private key.
///
/// A fresh ephemeral keypair is generated per call, so sealing the same input
/// twice yields different ciphertexts. The key length is checked before the
/// plaintext is touched.
pub fn seal(public_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, SealError> {
    let bytes: [u8; PUBLIC_KEY_LEN] =
        public_key
            .try_into()
            .map_err(|_| SealError::InvalidKeyMaterial {
                len: public_key.len(),
            })?;

    PublicKey::from(bytes)
        .seal(&mut OsRng, plaintext)
        .map_err(|e| SealError::Encryption {
            reason: e.to_string(),
        })
}

/// [`Encryptor`] backed by [`seal`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SealedBoxEncryptor;

impl Encryptor for SealedBoxEncryptor {
    fn seal(
        &self,
        key: &PublicKeyMaterial,
        plaintext: &[u8],
    ) -> Result<EncryptedPayload, SealError> {
        let ciphertext = seal(key.key(), plaintext)?;
        Ok(EncryptedPayload {
            key_id: key.key_id().to_string(),
            ciphertext,
        })
    }
}
