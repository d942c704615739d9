//! Thin wrappers around the `aws-lc-rs` primitives the engine needs.
//!
//! Everything in here takes prepared key bytes and buffers. Algorithm
//! selection, header handling and error uniformity live in the callers.

use std::num::NonZeroU32;

use aws_lc_rs::{
    aead, agreement, cipher, constant_time, digest, hmac,
    iv::FixedLength,
    key_wrap::{self, AesKek, KeyWrap as _},
    pbkdf2,
    rand::{SecureRandom as _, SystemRandom},
    rsa, signature,
};
use zeroize::Zeroizing;

use crate::{ErrorKind, JoseError, key::EllipticCurve};

pub(crate) const AES_BLOCK_LEN: usize = 16;
pub(crate) const GCM_TAG_LEN: usize = 16;
pub(crate) const KEY_WRAP_OVERHEAD: usize = 8;

fn provider_error(
    message: &'static str,
    source: impl std::error::Error + Send + Sync + 'static,
) -> JoseError {
    JoseError::invalid_key(message).with_source(source)
}

/// Fill `buf` from the system CSPRNG.
pub(crate) fn fill_random(buf: &mut [u8]) -> Result<(), JoseError> {
    SystemRandom::new().fill(buf).map_err(|err| {
        JoseError::new(ErrorKind::Configuration, "system randomness unavailable").with_source(err)
    })
}

pub(crate) fn random_bytes(len: usize) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let mut buf = Zeroizing::new(vec![0; len]);
    fill_random(&mut buf)?;
    Ok(buf)
}

/// One-shot SHA-256, used for JWK thumbprints.
pub(crate) fn sha256(data: &[u8]) -> digest::Digest {
    digest::digest(&digest::SHA256, data)
}

/// Incremental SHA-256, used by the Concat KDF.
pub(crate) fn sha256_context() -> digest::Context {
    digest::Context::new(&digest::SHA256)
}

fn aead_algorithm(key: &[u8]) -> Result<&'static aead::Algorithm, JoseError> {
    match key.len() {
        16 => Ok(&aead::AES_128_GCM),
        32 => Ok(&aead::AES_256_GCM),
        len => Err(JoseError::invalid_key(format!(
            "invalid AES-GCM key length: {len} bytes"
        ))),
    }
}

/// AES-GCM encryption, returns the ciphertext and the detached tag.
pub(crate) fn aes_gcm_seal(
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), JoseError> {
    let key = aead::LessSafeKey::new(
        aead::UnboundKey::new(aead_algorithm(key)?, key)
            .map_err(|err| provider_error("reject AES-GCM key", err))?,
    );
    let nonce = aead::Nonce::try_assume_unique_for_key(iv)
        .map_err(|err| provider_error("invalid AES-GCM iv", err))?;

    let mut in_out = plaintext.to_vec();
    let tag = key
        .seal_in_place_separate_tag(nonce, aead::Aad::from(aad), &mut in_out)
        .map_err(|err| provider_error("AES-GCM seal", err))?;
    Ok((in_out, tag.as_ref().to_vec()))
}

/// AES-GCM decryption of a ciphertext with its detached tag.
pub(crate) fn aes_gcm_open(
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    if tag.len() != GCM_TAG_LEN {
        return Err(JoseError::decryption_failed());
    }
    let key = aead::LessSafeKey::new(
        aead::UnboundKey::new(aead_algorithm(key)?, key)
            .map_err(|err| provider_error("reject AES-GCM key", err))?,
    );
    let nonce = aead::Nonce::try_assume_unique_for_key(iv)
        .map_err(|_err| JoseError::decryption_failed())?;

    let mut in_out = Zeroizing::new([ciphertext, tag].concat());
    let len = key
        .open_in_place(nonce, aead::Aad::from(aad), &mut in_out)
        .map_err(|_err| JoseError::decryption_failed())?
        .len();
    in_out.truncate(len);
    Ok(in_out)
}

fn cbc_algorithm(key: &[u8]) -> Result<&'static cipher::Algorithm, JoseError> {
    match key.len() {
        16 => Ok(&cipher::AES_128),
        32 => Ok(&cipher::AES_256),
        len => Err(JoseError::invalid_key(format!(
            "invalid AES-CBC key length: {len} bytes"
        ))),
    }
}

fn cbc_iv(iv: &[u8]) -> Result<FixedLength<AES_BLOCK_LEN>, JoseError> {
    let iv: [u8; AES_BLOCK_LEN] = iv
        .try_into()
        .map_err(|_err| JoseError::invalid_key("AES-CBC iv must be 16 bytes"))?;
    Ok(FixedLength::from(iv))
}

/// AES-CBC encryption with PKCS#7 padding.
pub(crate) fn aes_cbc_encrypt(
    key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, JoseError> {
    let key = cipher::PaddedBlockEncryptingKey::cbc_pkcs7(
        cipher::UnboundCipherKey::new(cbc_algorithm(key)?, key)
            .map_err(|err| provider_error("reject AES-CBC key", err))?,
    )
    .map_err(|err| provider_error("reject AES-CBC key", err))?;

    let mut in_out = plaintext.to_vec();
    key.less_safe_encrypt(&mut in_out, cipher::EncryptionContext::Iv128(cbc_iv(iv)?))
        .map_err(|err| provider_error("AES-CBC encrypt", err))?;
    Ok(in_out)
}

/// AES-CBC decryption with PKCS#7 padding.
pub(crate) fn aes_cbc_decrypt(
    key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let key = cipher::PaddedBlockDecryptingKey::cbc_pkcs7(
        cipher::UnboundCipherKey::new(cbc_algorithm(key)?, key)
            .map_err(|err| provider_error("reject AES-CBC key", err))?,
    )
    .map_err(|err| provider_error("reject AES-CBC key", err))?;

    let mut in_out = Zeroizing::new(ciphertext.to_vec());
    let len = key
        .decrypt(&mut in_out, cipher::DecryptionContext::Iv128(cbc_iv(iv)?))
        .map_err(|_err| JoseError::decryption_failed())?
        .len();
    in_out.truncate(len);
    Ok(in_out)
}

pub(crate) fn hmac_sign(algorithm: hmac::Algorithm, key: &[u8], data: &[u8]) -> Vec<u8> {
    let key = hmac::Key::new(algorithm, key);
    hmac::sign(&key, data).as_ref().to_vec()
}

pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    constant_time::verify_slices_are_equal(a, b).is_ok()
}

fn kek_cipher(kek: &[u8]) -> Result<&'static key_wrap::AesBlockCipher, JoseError> {
    match kek.len() {
        16 => Ok(&key_wrap::AES_128),
        32 => Ok(&key_wrap::AES_256),
        len => Err(JoseError::invalid_key(format!(
            "invalid AES key wrap key length: {len} bytes"
        ))),
    }
}

/// AES key wrap (RFC 3394).
pub(crate) fn aes_kw_wrap(kek: &[u8], cek: &[u8]) -> Result<Vec<u8>, JoseError> {
    let aes_kek = AesKek::new(kek_cipher(kek)?, kek)
        .map_err(|err| provider_error("reject AES key wrap key", err))?;
    let mut out = vec![0; cek.len() + KEY_WRAP_OVERHEAD];
    let len = aes_kek
        .wrap(cek, &mut out)
        .map_err(|err| provider_error("AES key wrap", err))?
        .len();
    out.truncate(len);
    Ok(out)
}

/// AES key unwrap (RFC 3394).
pub(crate) fn aes_kw_unwrap(kek: &[u8], wrapped: &[u8]) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let aes_kek =
        AesKek::new(kek_cipher(kek)?, kek).map_err(|_err| JoseError::decryption_failed())?;
    let out_len = wrapped
        .len()
        .checked_sub(KEY_WRAP_OVERHEAD)
        .ok_or_else(JoseError::decryption_failed)?;
    let mut out = Zeroizing::new(vec![0; out_len]);
    let len = aes_kek
        .unwrap(wrapped, &mut out)
        .map_err(|_err| JoseError::decryption_failed())?
        .len();
    out.truncate(len);
    Ok(out)
}

pub(crate) fn pbkdf2_derive(
    algorithm: pbkdf2::Algorithm,
    iterations: NonZeroU32,
    salt: &[u8],
    password: &[u8],
    len: usize,
) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(vec![0; len]);
    pbkdf2::derive(algorithm, iterations, salt, password, &mut out);
    out
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum RsaPadding {
    Pkcs1,
    Oaep(&'static rsa::OaepAlgorithm),
}

pub(crate) fn rsa_encrypt(
    padding: RsaPadding,
    spki: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, JoseError> {
    let public_key = rsa::PublicEncryptingKey::from_der(spki)
        .map_err(|err| provider_error("reject RSA public key", err))?;
    match padding {
        RsaPadding::Pkcs1 => {
            let key = rsa::Pkcs1PublicEncryptingKey::new(public_key)
                .map_err(|err| provider_error("reject RSA public key", err))?;
            let mut out = vec![0; key.ciphertext_size()];
            let len = key
                .encrypt(plaintext, &mut out)
                .map_err(|err| provider_error("RSA encrypt", err))?
                .len();
            out.truncate(len);
            Ok(out)
        }
        RsaPadding::Oaep(algorithm) => {
            let key = rsa::OaepPublicEncryptingKey::new(public_key)
                .map_err(|err| provider_error("reject RSA public key", err))?;
            let mut out = vec![0; key.ciphertext_size()];
            let len = key
                .encrypt(algorithm, plaintext, &mut out, None)
                .map_err(|err| provider_error("RSA encrypt", err))?
                .len();
            out.truncate(len);
            Ok(out)
        }
    }
}

pub(crate) fn rsa_decrypt(
    padding: RsaPadding,
    pkcs8: &[u8],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let private_key = rsa::PrivateDecryptingKey::from_pkcs8(pkcs8)
        .map_err(|_err| JoseError::decryption_failed())?;
    match padding {
        RsaPadding::Pkcs1 => {
            let key = rsa::Pkcs1PrivateDecryptingKey::new(private_key)
                .map_err(|_err| JoseError::decryption_failed())?;
            let mut out = Zeroizing::new(vec![0; key.min_output_size()]);
            let len = key
                .decrypt(ciphertext, &mut out)
                .map_err(|_err| JoseError::decryption_failed())?
                .len();
            out.truncate(len);
            Ok(out)
        }
        RsaPadding::Oaep(algorithm) => {
            let key = rsa::OaepPrivateDecryptingKey::new(private_key)
                .map_err(|_err| JoseError::decryption_failed())?;
            let mut out = Zeroizing::new(vec![0; key.min_output_size()]);
            let len = key
                .decrypt(algorithm, ciphertext, &mut out, None)
                .map_err(|_err| JoseError::decryption_failed())?
                .len();
            out.truncate(len);
            Ok(out)
        }
    }
}

fn agreement_algorithm(curve: EllipticCurve) -> Result<&'static agreement::Algorithm, JoseError> {
    match curve {
        EllipticCurve::P256 => Ok(&agreement::ECDH_P256),
        EllipticCurve::P384 => Ok(&agreement::ECDH_P384),
        EllipticCurve::P521 => Ok(&agreement::ECDH_P521),
        EllipticCurve::X25519 => Ok(&agreement::X25519),
        EllipticCurve::Ed25519 => Err(JoseError::unsupported_curve(
            "Ed25519 keys cannot be used for key agreement",
        )),
    }
}

/// A single-use key pair for ECDH-ES.
pub(crate) struct EphemeralKeyPair {
    private: agreement::PrivateKey,
    public: Vec<u8>,
}

impl EphemeralKeyPair {
    pub(crate) fn generate(curve: EllipticCurve) -> Result<Self, JoseError> {
        let private = agreement::PrivateKey::generate(agreement_algorithm(curve)?)
            .map_err(|err| provider_error("generate ephemeral key", err))?;
        let public = private
            .compute_public_key()
            .map_err(|err| provider_error("compute ephemeral public key", err))?
            .as_ref()
            .to_vec();
        Ok(Self { private, public })
    }

    pub(crate) fn public_key(&self) -> &[u8] {
        &self.public
    }

    /// Consume the ephemeral key, it is never used twice.
    pub(crate) fn agree(
        self,
        curve: EllipticCurve,
        peer_public: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, JoseError> {
        agree(&self.private, curve, peer_public)
            .map_err(|err| JoseError::invalid_key("ECDH key agreement failed").with_source(err))
    }
}

fn agree(
    private: &agreement::PrivateKey,
    curve: EllipticCurve,
    peer_public: &[u8],
) -> Result<Zeroizing<Vec<u8>>, aws_lc_rs::error::Unspecified> {
    let algorithm = agreement_algorithm(curve).map_err(|_err| aws_lc_rs::error::Unspecified)?;
    agreement::agree(
        private,
        &agreement::UnparsedPublicKey::new(algorithm, peer_public),
        aws_lc_rs::error::Unspecified,
        |shared| Ok(Zeroizing::new(shared.to_vec())),
    )
}

/// Static-side key agreement with the private scalar `d`.
pub(crate) fn ecdh_static(
    curve: EllipticCurve,
    d: &[u8],
    peer_public: &[u8],
) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let private = agreement::PrivateKey::from_private_key(agreement_algorithm(curve)?, d)
        .map_err(|_err| JoseError::decryption_failed())?;
    agree(&private, curve, peer_public).map_err(|_err| JoseError::decryption_failed())
}

/// Public key (uncompressed point, or raw `x` for the Edwards/Montgomery curves) for `d`.
pub(crate) fn public_from_private(curve: EllipticCurve, d: &[u8]) -> Result<Vec<u8>, JoseError> {
    match curve {
        EllipticCurve::Ed25519 => {
            let key_pair = signature::Ed25519KeyPair::from_seed_unchecked(d)
                .map_err(|err| provider_error("reject Ed25519 seed", err))?;
            Ok(signature::KeyPair::public_key(&key_pair).as_ref().to_vec())
        }
        _ => {
            let private = agreement::PrivateKey::from_private_key(agreement_algorithm(curve)?, d)
                .map_err(|err| provider_error("reject private key", err))?;
            Ok(private
                .compute_public_key()
                .map_err(|err| provider_error("compute public key", err))?
                .as_ref()
                .to_vec())
        }
    }
}

fn ecdsa_signing(
    curve: EllipticCurve,
) -> Result<&'static signature::EcdsaSigningAlgorithm, JoseError> {
    match curve {
        EllipticCurve::P256 => Ok(&signature::ECDSA_P256_SHA256_FIXED_SIGNING),
        EllipticCurve::P384 => Ok(&signature::ECDSA_P384_SHA384_FIXED_SIGNING),
        EllipticCurve::P521 => Ok(&signature::ECDSA_P521_SHA512_FIXED_SIGNING),
        EllipticCurve::X25519 | EllipticCurve::Ed25519 => Err(JoseError::unsupported_curve(
            format!("{curve} cannot be used for ECDSA"),
        )),
    }
}

pub(crate) fn ecdsa_sign(
    curve: EllipticCurve,
    d: &[u8],
    public: &[u8],
    message: &[u8],
) -> Result<Vec<u8>, JoseError> {
    let key_pair =
        signature::EcdsaKeyPair::from_private_key_and_public_key(ecdsa_signing(curve)?, d, public)
            .map_err(|err| provider_error("reject ECDSA key", err))?;
    let signature = key_pair
        .sign(&SystemRandom::new(), message)
        .map_err(|err| provider_error("ECDSA sign", err))?;
    Ok(signature.as_ref().to_vec())
}

pub(crate) fn ecdsa_verify(
    curve: EllipticCurve,
    public: &[u8],
    message: &[u8],
    signature: &[u8],
) -> bool {
    let algorithm: &'static signature::EcdsaVerificationAlgorithm = match curve {
        EllipticCurve::P256 => &signature::ECDSA_P256_SHA256_FIXED,
        EllipticCurve::P384 => &signature::ECDSA_P384_SHA384_FIXED,
        EllipticCurve::P521 => &signature::ECDSA_P521_SHA512_FIXED,
        EllipticCurve::X25519 | EllipticCurve::Ed25519 => return false,
    };
    signature::UnparsedPublicKey::new(algorithm, public)
        .verify(message, signature)
        .is_ok()
}

pub(crate) fn ed25519_sign(seed: &[u8], message: &[u8]) -> Result<Vec<u8>, JoseError> {
    let key_pair = signature::Ed25519KeyPair::from_seed_unchecked(seed)
        .map_err(|err| provider_error("reject Ed25519 seed", err))?;
    Ok(key_pair.sign(message).as_ref().to_vec())
}

pub(crate) fn ed25519_verify(public: &[u8], message: &[u8], signature: &[u8]) -> bool {
    signature::UnparsedPublicKey::new(&signature::ED25519, public)
        .verify(message, signature)
        .is_ok()
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum RsaSignaturePadding {
    Pkcs1,
    Pss,
}

pub(crate) fn rsa_sign(
    padding: RsaSignaturePadding,
    hash_bits: usize,
    pkcs8: &[u8],
    message: &[u8],
) -> Result<Vec<u8>, JoseError> {
    let encoding: &'static dyn signature::RsaEncoding = match (padding, hash_bits) {
        (RsaSignaturePadding::Pkcs1, 256) => &signature::RSA_PKCS1_SHA256,
        (RsaSignaturePadding::Pkcs1, 384) => &signature::RSA_PKCS1_SHA384,
        (RsaSignaturePadding::Pkcs1, 512) => &signature::RSA_PKCS1_SHA512,
        (RsaSignaturePadding::Pss, 256) => &signature::RSA_PSS_SHA256,
        (RsaSignaturePadding::Pss, 384) => &signature::RSA_PSS_SHA384,
        (RsaSignaturePadding::Pss, 512) => &signature::RSA_PSS_SHA512,
        _ => {
            return Err(JoseError::unsupported_algorithm(format!(
                "unsupported RSA signature hash: SHA-{hash_bits}"
            )));
        }
    };
    let key_pair = signature::RsaKeyPair::from_pkcs8(pkcs8)
        .map_err(|err| provider_error("reject RSA private key", err))?;
    let mut out = vec![0; key_pair.public_modulus_len()];
    key_pair
        .sign(encoding, &SystemRandom::new(), message, &mut out)
        .map_err(|err| provider_error("RSA sign", err))?;
    Ok(out)
}

/// `rsa_public_key` is the PKCS#1 `RSAPublicKey` (the SPKI bit string contents).
pub(crate) fn rsa_verify(
    padding: RsaSignaturePadding,
    hash_bits: usize,
    rsa_public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> bool {
    let parameters: &'static signature::RsaParameters = match (padding, hash_bits) {
        (RsaSignaturePadding::Pkcs1, 256) => &signature::RSA_PKCS1_2048_8192_SHA256,
        (RsaSignaturePadding::Pkcs1, 384) => &signature::RSA_PKCS1_2048_8192_SHA384,
        (RsaSignaturePadding::Pkcs1, 512) => &signature::RSA_PKCS1_2048_8192_SHA512,
        (RsaSignaturePadding::Pss, 256) => &signature::RSA_PSS_2048_8192_SHA256,
        (RsaSignaturePadding::Pss, 384) => &signature::RSA_PSS_2048_8192_SHA384,
        (RsaSignaturePadding::Pss, 512) => &signature::RSA_PSS_2048_8192_SHA512,
        _ => return false,
    };
    signature::UnparsedPublicKey::new(parameters, rsa_public_key)
        .verify(message, signature)
        .is_ok()
}
