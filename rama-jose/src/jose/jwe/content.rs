//! Content encryption (`enc`), [`rfc7518, section 5`].
//!
//! [`rfc7518, section 5`]: https://datatracker.ietf.org/doc/html/rfc7518#section-5

use aws_lc_rs::hmac;
use zeroize::Zeroizing;

use crate::{JoseError, jose::ContentEncryptionAlgorithm, primitives};

fn check_lengths(
    enc: ContentEncryptionAlgorithm,
    cek: &[u8],
    iv: &[u8],
) -> Result<(), JoseError> {
    if cek.len() != enc.cek_len() {
        return Err(JoseError::invalid_key("Invalid Content Encryption Key length"));
    }
    if iv.len() != enc.iv_len() {
        return Err(JoseError::invalid_key("Invalid Initialization Vector length"));
    }
    Ok(())
}

/// Encrypt `plaintext`, returns the ciphertext and the authentication tag.
pub(crate) fn encrypt(
    enc: ContentEncryptionAlgorithm,
    cek: &[u8],
    iv: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), JoseError> {
    check_lengths(enc, cek, iv)?;
    match enc {
        ContentEncryptionAlgorithm::A128Gcm | ContentEncryptionAlgorithm::A256Gcm => {
            primitives::aes_gcm_seal(cek, iv, aad, plaintext)
        }
        ContentEncryptionAlgorithm::A128CbcHs256 | ContentEncryptionAlgorithm::A256CbcHs512 => {
            let (mac_key, enc_key) = cek.split_at(cek.len() / 2);
            let ciphertext = primitives::aes_cbc_encrypt(enc_key, iv, plaintext)?;
            let tag = cbc_hmac_tag(enc, mac_key, aad, iv, &ciphertext);
            Ok((ciphertext, tag))
        }
    }
}

/// Decrypt and authenticate, every failure is [`JoseError::decryption_failed`].
pub(crate) fn decrypt(
    enc: ContentEncryptionAlgorithm,
    cek: &[u8],
    iv: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    check_lengths(enc, cek, iv).map_err(|err| {
        tracing::debug!("JWE content decryption rejected: {err}");
        JoseError::decryption_failed()
    })?;
    match enc {
        ContentEncryptionAlgorithm::A128Gcm | ContentEncryptionAlgorithm::A256Gcm => {
            primitives::aes_gcm_open(cek, iv, aad, ciphertext, tag)
        }
        ContentEncryptionAlgorithm::A128CbcHs256 | ContentEncryptionAlgorithm::A256CbcHs512 => {
            let (mac_key, enc_key) = cek.split_at(cek.len() / 2);
            let expected = cbc_hmac_tag(enc, mac_key, aad, iv, ciphertext);
            // tag first, the padding is never looked at for forged input
            if !primitives::constant_time_eq(&expected, tag) {
                tracing::debug!("JWE authentication tag mismatch");
                return Err(JoseError::decryption_failed());
            }
            primitives::aes_cbc_decrypt(enc_key, iv, ciphertext)
                .map_err(|_err| JoseError::decryption_failed())
        }
    }
}

/// `HMAC(MAC_KEY, A || IV || E || AL)` truncated to half, [`rfc7518, section 5.2.2.1`].
///
/// [`rfc7518, section 5.2.2.1`]: https://datatracker.ietf.org/doc/html/rfc7518#section-5.2.2.1
fn cbc_hmac_tag(
    enc: ContentEncryptionAlgorithm,
    mac_key: &[u8],
    aad: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Vec<u8> {
    let algorithm = match enc {
        ContentEncryptionAlgorithm::A256CbcHs512 => hmac::HMAC_SHA512,
        _ => hmac::HMAC_SHA256,
    };
    let al = u64::try_from(aad.len())
        .unwrap_or(u64::MAX)
        .saturating_mul(8)
        .to_be_bytes();

    let mut input = Vec::with_capacity(aad.len() + iv.len() + ciphertext.len() + al.len());
    input.extend_from_slice(aad);
    input.extend_from_slice(iv);
    input.extend_from_slice(ciphertext);
    input.extend_from_slice(&al);

    let mut tag = primitives::hmac_sign(algorithm, mac_key, &input);
    tag.truncate(mac_key.len());
    tag
}
