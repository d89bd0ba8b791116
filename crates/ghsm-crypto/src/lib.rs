//! Sealed-box encryption of secret values for the remote store.
//! Output is byte-compatible with libsodium's `crypto_box_seal`.

pub mod key;
pub mod sealed_box;
