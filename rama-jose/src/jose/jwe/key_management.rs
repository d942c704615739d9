//! Key management (`alg`): producing the content encryption key when
//! encrypting and recovering it when decrypting, [`rfc7518, section 4`].
//!
//! Every algorithm belongs to a [`KeyManagementFamily`], the dispatch below is
//! exhaustive over the families. What a family needs to carry in the JOSE
//! header is a [`KeyManagementParameters`] variant.
//!
//! [`rfc7518, section 4`]: https://datatracker.ietf.org/doc/html/rfc7518#section-4

use std::{fmt, num::NonZeroU32};

use aws_lc_rs::{pbkdf2, rsa};
use base64::{Engine as _, prelude::BASE64_URL_SAFE_NO_PAD};
use serde_json::{Map, Value};
use zeroize::Zeroizing;

use crate::{
    Envelope, JoseError,
    jose::{ContentEncryptionAlgorithm, Headers, JWK, KeyManagementAlgorithm, KeyManagementFamily},
    key::{EcPrivateKey, EcPublicKey, JoseKey, PrivateKey, PublicKey, RsaPrivateKey, RsaPublicKey, SecretKey},
    primitives::{self, EphemeralKeyPair, RsaPadding},
};

use super::ecdh::{concat_kdf, ensure_agreement_capable};

/// Default PBES2 iteration count when encrypting.
pub const DEFAULT_PBES2_COUNT: u32 = 2048;
/// Length of the random PBES2 salt input when encrypting.
pub const DEFAULT_PBES2_SALT_LEN: usize = 16;
/// Shortest PBES2 salt input accepted, [`rfc7518, section 4.8.1.1`].
///
/// [`rfc7518, section 4.8.1.1`]: https://datatracker.ietf.org/doc/html/rfc7518#section-4.8.1.1
pub const MIN_PBES2_SALT_LEN: usize = 8;

const GCM_KW_IV_LEN: usize = 12;

#[derive(Clone, PartialEq, Eq)]
/// Header parameters owned by a key management family.
pub enum KeyManagementParameters {
    /// `dir`, RSA and AES key wrap carry nothing.
    None,
    /// `ECDH-ES` and `ECDH-ES+A*KW`: `epk`, `apu`, `apv`
    Agreement {
        epk: EcPublicKey,
        apu: Option<Vec<u8>>,
        apv: Option<Vec<u8>>,
    },
    /// `PBES2-*`: `p2s`, `p2c`
    Pbes2 { p2s: Vec<u8>, p2c: u32 },
    /// `A*GCMKW`: `iv`, `tag`
    AesGcmKw { iv: Vec<u8>, tag: Vec<u8> },
}

impl fmt::Debug for KeyManagementParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Agreement { epk, apu, apv } => f
                .debug_struct("Agreement")
                .field("epk", &epk.curve())
                .field("apu", &apu.as_ref().map(Vec::len))
                .field("apv", &apv.as_ref().map(Vec::len))
                .finish(),
            Self::Pbes2 { p2s, p2c } => f
                .debug_struct("Pbes2")
                .field("p2s", &p2s.len())
                .field("p2c", p2c)
                .finish(),
            Self::AesGcmKw { .. } => f.debug_struct("AesGcmKw").finish_non_exhaustive(),
        }
    }
}

fn invalid(message: impl Into<std::borrow::Cow<'static, str>>) -> JoseError {
    JoseError::invalid_header(Envelope::Jwe, message)
}

fn header_bytes(
    merged: &Map<String, Value>,
    name: &'static str,
    description: &'static str,
) -> Result<Option<Vec<u8>>, JoseError> {
    match merged.get(name) {
        None => Ok(None),
        Some(Value::String(encoded)) => BASE64_URL_SAFE_NO_PAD
            .decode(encoded)
            .map(Some)
            .map_err(|_err| invalid(format!("Failed to base64url decode the {name}"))),
        Some(_) => Err(invalid(format!(
            "JOSE Header \"{name}\" ({description}) invalid"
        ))),
    }
}

fn required_bytes(
    merged: &Map<String, Value>,
    name: &'static str,
    description: &'static str,
) -> Result<Vec<u8>, JoseError> {
    header_bytes(merged, name, description)?.ok_or_else(|| {
        invalid(format!(
            "JOSE Header \"{name}\" ({description}) missing or invalid"
        ))
    })
}

impl KeyManagementParameters {
    /// Write these parameters into a header set.
    pub(crate) fn write_to(&self, headers: &mut Headers) -> Result<(), JoseError> {
        match self {
            Self::None => {}
            Self::Agreement { epk, apu, apv } => {
                headers.try_set_header("epk", JWK::from_public_key(&PublicKey::Ec(epk.clone()))?)?;
                if let Some(apu) = apu {
                    headers.try_set_header("apu", BASE64_URL_SAFE_NO_PAD.encode(apu))?;
                }
                if let Some(apv) = apv {
                    headers.try_set_header("apv", BASE64_URL_SAFE_NO_PAD.encode(apv))?;
                }
            }
            Self::Pbes2 { p2s, p2c } => {
                headers.try_set_header("p2s", BASE64_URL_SAFE_NO_PAD.encode(p2s))?;
                headers.try_set_header("p2c", p2c)?;
            }
            Self::AesGcmKw { iv, tag } => {
                headers.try_set_header("iv", BASE64_URL_SAFE_NO_PAD.encode(iv))?;
                headers.try_set_header("tag", BASE64_URL_SAFE_NO_PAD.encode(tag))?;
            }
        }
        Ok(())
    }

    /// Read the parameters `alg` needs from the merged JOSE header.
    ///
    /// Malformed parameters are header errors, they are visible to anyone.
    pub(crate) fn read_from(
        alg: KeyManagementAlgorithm,
        merged: &Map<String, Value>,
        max_pbes2_count: u32,
    ) -> Result<Self, JoseError> {
        match alg.family() {
            KeyManagementFamily::Direct
            | KeyManagementFamily::RsaKeyWrap
            | KeyManagementFamily::AesKeyWrap => Ok(Self::None),
            KeyManagementFamily::KeyAgreement | KeyManagementFamily::KeyAgreementWithKeyWrap => {
                let missing = || invalid("JOSE Header \"epk\" (Ephemeral Public Key) missing or invalid");
                let epk = merged.get("epk").filter(|epk| epk.is_object()).ok_or_else(missing)?;
                let epk: JWK = serde_json::from_value(epk.clone()).map_err(|_err| missing())?;
                let epk = match epk.to_public_key() {
                    Ok(PublicKey::Ec(epk)) => epk,
                    _ => return Err(missing()),
                };
                ensure_agreement_capable(epk.curve())?;

                Ok(Self::Agreement {
                    epk,
                    apu: header_bytes(merged, "apu", "Agreement PartyUInfo")?,
                    apv: header_bytes(merged, "apv", "Agreement PartyVInfo")?,
                })
            }
            KeyManagementFamily::Pbes2 => {
                let p2c = merged
                    .get("p2c")
                    .and_then(Value::as_u64)
                    .filter(|p2c| *p2c > 0)
                    .ok_or_else(|| invalid("JOSE Header \"p2c\" (PBES2 Count) missing or invalid"))?;
                if p2c > u64::from(max_pbes2_count) {
                    return Err(invalid(
                        "JOSE Header \"p2c\" (PBES2 Count) out is of acceptable bounds",
                    ));
                }
                let p2s = required_bytes(merged, "p2s", "PBES2 Salt")?;
                if p2s.len() < MIN_PBES2_SALT_LEN {
                    return Err(invalid(
                        "PBES2 Salt Input must be 8 or more octets",
                    ));
                }
                Ok(Self::Pbes2 {
                    p2s,
                    // bounded by max_pbes2_count
                    p2c: u32::try_from(p2c).unwrap_or(max_pbes2_count),
                })
            }
            KeyManagementFamily::AesGcmKeyWrap => Ok(Self::AesGcmKw {
                iv: required_bytes(merged, "iv", "Initialization Vector")?,
                tag: required_bytes(merged, "tag", "Authentication Tag")?,
            }),
        }
    }
}

#[derive(Debug, Clone, Default)]
/// Sender side inputs for key management, per recipient.
pub struct KeyManagementOptions {
    apu: Option<Vec<u8>>,
    apv: Option<Vec<u8>>,
    p2c: Option<u32>,
    p2s: Option<Vec<u8>>,
    iv: Option<Vec<u8>>,
}

macro_rules! bytes_option {
    ($(#[$doc:meta])* $field:ident, $with:ident, $set:ident) => {
        #[must_use]
        $(#[$doc])*
        pub fn $with(mut self, value: impl Into<Vec<u8>>) -> Self {
            self.$set(value);
            self
        }

        $(#[$doc])*
        pub fn $set(&mut self, value: impl Into<Vec<u8>>) -> &mut Self {
            self.$field = Some(value.into());
            self
        }
    };
}

impl KeyManagementOptions {
    /// Create empty options: random salts and IVs, default PBES2 count.
    pub fn new() -> Self {
        Self::default()
    }

    bytes_option!(
        /// Agreement PartyUInfo for ECDH-ES.
        apu, with_apu, set_apu
    );

    bytes_option!(
        /// Agreement PartyVInfo for ECDH-ES.
        apv, with_apv, set_apv
    );

    bytes_option!(
        /// PBES2 salt input, instead of a random one.
        p2s, with_p2s, set_p2s
    );

    bytes_option!(
        /// AES-GCM key wrap IV, instead of a random one.
        iv, with_iv, set_iv
    );

    #[must_use]
    /// PBES2 iteration count.
    pub fn with_p2c(mut self, p2c: u32) -> Self {
        self.set_p2c(p2c);
        self
    }

    /// PBES2 iteration count.
    pub fn set_p2c(&mut self, p2c: u32) -> &mut Self {
        self.p2c = Some(p2c);
        self
    }
}

/// The content encryption key with what a recipient needs to recover it.
pub struct ProducedCek {
    cek: Zeroizing<Vec<u8>>,
    encrypted_key: Option<Vec<u8>>,
    parameters: KeyManagementParameters,
}

impl ProducedCek {
    /// The content encryption key.
    pub fn cek(&self) -> &[u8] {
        &self.cek
    }

    /// The JWE Encrypted Key, absent for direct algorithms.
    pub fn encrypted_key(&self) -> Option<&[u8]> {
        self.encrypted_key.as_deref()
    }

    /// Header parameters to send along.
    pub fn parameters(&self) -> &KeyManagementParameters {
        &self.parameters
    }

    pub(crate) fn into_parts(
        self,
    ) -> (Zeroizing<Vec<u8>>, Option<Vec<u8>>, KeyManagementParameters) {
        (self.cek, self.encrypted_key, self.parameters)
    }
}

impl fmt::Debug for ProducedCek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducedCek")
            .field("encrypted_key", &self.encrypted_key.as_ref().map(Vec::len))
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

fn key_mismatch(alg: KeyManagementAlgorithm, key: &JoseKey) -> JoseError {
    JoseError::invalid_key(format!("{} can not be used with {alg}", key.describe()))
}

fn secret_key(
    alg: KeyManagementAlgorithm,
    key: &JoseKey,
    required_len: Option<usize>,
) -> Result<&SecretKey, JoseError> {
    let JoseKey::Secret(secret) = key else {
        return Err(key_mismatch(alg, key));
    };
    match required_len {
        Some(len) if secret.len() != len => Err(JoseError::invalid_key(format!(
            "{alg} requires a {len} byte key, got {}",
            secret.len()
        ))),
        _ if secret.is_empty() => Err(JoseError::invalid_key("symmetric keys can not be empty")),
        _ => Ok(secret),
    }
}

fn rsa_public_key(alg: KeyManagementAlgorithm, key: &JoseKey) -> Result<&RsaPublicKey, JoseError> {
    match key {
        JoseKey::Public(PublicKey::Rsa(key)) => Ok(key),
        JoseKey::Private(PrivateKey::Rsa(key)) => Ok(key.public_key()),
        key => Err(key_mismatch(alg, key)),
    }
}

fn rsa_private_key(alg: KeyManagementAlgorithm, key: &JoseKey) -> Result<&RsaPrivateKey, JoseError> {
    match key {
        JoseKey::Private(PrivateKey::Rsa(key)) => Ok(key),
        key => Err(key_mismatch(alg, key)),
    }
}

fn ec_public_key(alg: KeyManagementAlgorithm, key: &JoseKey) -> Result<&EcPublicKey, JoseError> {
    match key {
        JoseKey::Public(PublicKey::Ec(key)) => Ok(key),
        JoseKey::Private(PrivateKey::Ec(key)) => Ok(key.public_key()),
        key => Err(key_mismatch(alg, key)),
    }
}

fn ec_private_key(alg: KeyManagementAlgorithm, key: &JoseKey) -> Result<&EcPrivateKey, JoseError> {
    match key {
        JoseKey::Private(PrivateKey::Ec(key)) => Ok(key),
        key => Err(key_mismatch(alg, key)),
    }
}

fn rsa_padding(alg: KeyManagementAlgorithm) -> RsaPadding {
    match alg {
        KeyManagementAlgorithm::RsaOaep => RsaPadding::Oaep(&rsa::OAEP_SHA1_MGF1SHA1),
        KeyManagementAlgorithm::RsaOaep256 => RsaPadding::Oaep(&rsa::OAEP_SHA256_MGF1SHA256),
        KeyManagementAlgorithm::RsaOaep384 => RsaPadding::Oaep(&rsa::OAEP_SHA384_MGF1SHA384),
        KeyManagementAlgorithm::RsaOaep512 => RsaPadding::Oaep(&rsa::OAEP_SHA512_MGF1SHA512),
        _ => RsaPadding::Pkcs1,
    }
}

fn wrap_key_len(alg: KeyManagementAlgorithm) -> Result<usize, JoseError> {
    alg.wrap_key_len().ok_or_else(|| {
        JoseError::unsupported_algorithm(format!("{alg} does not wrap with AES"))
    })
}

fn pbes2_kek(
    alg: KeyManagementAlgorithm,
    password: &[u8],
    p2s: &[u8],
    p2c: NonZeroU32,
) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let prf = match alg {
        KeyManagementAlgorithm::Pbes2Hs512A256Kw => pbkdf2::PBKDF2_HMAC_SHA512,
        _ => pbkdf2::PBKDF2_HMAC_SHA256,
    };
    // salt = UTF8(alg) || 0x00 || p2s
    let mut salt = Vec::with_capacity(alg.as_str().len() + 1 + p2s.len());
    salt.extend_from_slice(alg.as_str().as_bytes());
    salt.push(0x00);
    salt.extend_from_slice(p2s);
    Ok(primitives::pbkdf2_derive(
        prf,
        p2c,
        &salt,
        password,
        wrap_key_len(alg)?,
    ))
}

fn agreement_kdf(
    alg: KeyManagementAlgorithm,
    enc: ContentEncryptionAlgorithm,
    shared_secret: &[u8],
    apu: Option<&[u8]>,
    apv: Option<&[u8]>,
) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let (algorithm_id, key_len) = match alg.family() {
        KeyManagementFamily::KeyAgreement => (enc.as_str(), enc.cek_len()),
        _ => (alg.as_str(), wrap_key_len(alg)?),
    };
    Ok(concat_kdf(
        shared_secret,
        algorithm_id,
        key_len,
        apu.unwrap_or_default(),
        apv.unwrap_or_default(),
    ))
}

/// Produce the content encryption key for one recipient.
///
/// `cek` is the key shared between all recipients. It must be `None` for
/// `dir` and `ECDH-ES`, which make the CEK themselves, and is generated
/// when `None` for any other algorithm.
pub fn produce_cek(
    alg: KeyManagementAlgorithm,
    enc: ContentEncryptionAlgorithm,
    key: &JoseKey,
    cek: Option<&[u8]>,
    options: &KeyManagementOptions,
) -> Result<ProducedCek, JoseError> {
    tracing::trace!("JWE key management: producing {enc} CEK with {alg}");

    if alg.is_direct() && cek.is_some() {
        return Err(JoseError::configuration(format!(
            "{alg} derives the Content Encryption Key and can not use a provided one"
        )));
    }
    let shared_cek = || -> Result<Zeroizing<Vec<u8>>, JoseError> {
        match cek {
            Some(cek) if cek.len() != enc.cek_len() => Err(JoseError::invalid_key(
                "Invalid Content Encryption Key length",
            )),
            Some(cek) => Ok(Zeroizing::new(cek.to_vec())),
            None => primitives::random_bytes(enc.cek_len()),
        }
    };

    let produced = match alg.family() {
        KeyManagementFamily::Direct => {
            let secret = secret_key(alg, key, Some(enc.cek_len()))?;
            ProducedCek {
                cek: Zeroizing::new(secret.as_bytes().to_vec()),
                encrypted_key: None,
                parameters: KeyManagementParameters::None,
            }
        }
        KeyManagementFamily::RsaKeyWrap => {
            let public = rsa_public_key(alg, key)?;
            let cek = shared_cek()?;
            let encrypted_key =
                primitives::rsa_encrypt(rsa_padding(alg), public.spki().as_ref(), &cek)?;
            ProducedCek {
                cek,
                encrypted_key: Some(encrypted_key),
                parameters: KeyManagementParameters::None,
            }
        }
        KeyManagementFamily::AesKeyWrap => {
            let kek = secret_key(alg, key, Some(wrap_key_len(alg)?))?;
            let cek = shared_cek()?;
            let encrypted_key = primitives::aes_kw_wrap(kek.as_bytes(), &cek)?;
            ProducedCek {
                cek,
                encrypted_key: Some(encrypted_key),
                parameters: KeyManagementParameters::None,
            }
        }
        KeyManagementFamily::KeyAgreement | KeyManagementFamily::KeyAgreementWithKeyWrap => {
            let peer = ec_public_key(alg, key)?;
            let curve = peer.curve();
            ensure_agreement_capable(curve)?;

            let ephemeral = EphemeralKeyPair::generate(curve)?;
            let epk = EcPublicKey::new(curve, ephemeral.public_key().to_vec())?;
            let shared_secret = ephemeral.agree(curve, peer.point())?;
            let derived = agreement_kdf(
                alg,
                enc,
                &shared_secret,
                options.apu.as_deref(),
                options.apv.as_deref(),
            )?;
            let parameters = KeyManagementParameters::Agreement {
                epk,
                apu: options.apu.clone(),
                apv: options.apv.clone(),
            };

            if alg.family() == KeyManagementFamily::KeyAgreement {
                ProducedCek {
                    cek: derived,
                    encrypted_key: None,
                    parameters,
                }
            } else {
                let cek = shared_cek()?;
                let encrypted_key = primitives::aes_kw_wrap(&derived, &cek)?;
                ProducedCek {
                    cek,
                    encrypted_key: Some(encrypted_key),
                    parameters,
                }
            }
        }
        KeyManagementFamily::Pbes2 => {
            let password = secret_key(alg, key, None)?;
            let p2c = NonZeroU32::new(options.p2c.unwrap_or(DEFAULT_PBES2_COUNT))
                .ok_or_else(|| JoseError::configuration("PBES2 Count (p2c) must be positive"))?;
            let p2s = match &options.p2s {
                Some(p2s) if p2s.len() < MIN_PBES2_SALT_LEN => {
                    return Err(JoseError::configuration(
                        "PBES2 Salt Input must be 8 or more octets",
                    ));
                }
                Some(p2s) => p2s.clone(),
                None => primitives::random_bytes(DEFAULT_PBES2_SALT_LEN)?.to_vec(),
            };
            let kek = pbes2_kek(alg, password.as_bytes(), &p2s, p2c)?;
            let cek = shared_cek()?;
            let encrypted_key = primitives::aes_kw_wrap(&kek, &cek)?;
            ProducedCek {
                cek,
                encrypted_key: Some(encrypted_key),
                parameters: KeyManagementParameters::Pbes2 {
                    p2s,
                    p2c: p2c.get(),
                },
            }
        }
        KeyManagementFamily::AesGcmKeyWrap => {
            let kek = secret_key(alg, key, Some(wrap_key_len(alg)?))?;
            let iv = match &options.iv {
                Some(iv) if iv.len() != GCM_KW_IV_LEN => {
                    return Err(JoseError::configuration(
                        "AES GCM key wrap Initialization Vector must be 12 octets",
                    ));
                }
                Some(iv) => iv.clone(),
                None => primitives::random_bytes(GCM_KW_IV_LEN)?.to_vec(),
            };
            let cek = shared_cek()?;
            let (encrypted_key, tag) = primitives::aes_gcm_seal(kek.as_bytes(), &iv, &[], &cek)?;
            ProducedCek {
                cek,
                encrypted_key: Some(encrypted_key),
                parameters: KeyManagementParameters::AesGcmKw { iv, tag },
            }
        }
    };

    Ok(produced)
}

/// Recover the content encryption key for one recipient.
///
/// Any failure, whether a wrong key type, a failed unwrap or a bad
/// agreement, is the same [`ErrorKind::DecryptionFailed`](crate::ErrorKind::DecryptionFailed).
pub fn recover_cek(
    alg: KeyManagementAlgorithm,
    enc: ContentEncryptionAlgorithm,
    key: &JoseKey,
    encrypted_key: Option<&[u8]>,
    parameters: &KeyManagementParameters,
) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    tracing::trace!("JWE key management: recovering {enc} CEK with {alg}");
    recover(alg, enc, key, encrypted_key, parameters).map_err(|err| {
        tracing::debug!("JWE key management with {alg} failed: {err:?}");
        JoseError::decryption_failed()
    })
}

fn recover(
    alg: KeyManagementAlgorithm,
    enc: ContentEncryptionAlgorithm,
    key: &JoseKey,
    encrypted_key: Option<&[u8]>,
    parameters: &KeyManagementParameters,
) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let wrapped = || {
        encrypted_key
            .filter(|wrapped| !wrapped.is_empty())
            .ok_or_else(|| invalid("JWE Encrypted Key missing"))
    };

    match (alg.family(), parameters) {
        (KeyManagementFamily::Direct, KeyManagementParameters::None) => {
            let secret = secret_key(alg, key, Some(enc.cek_len()))?;
            Ok(Zeroizing::new(secret.as_bytes().to_vec()))
        }
        (KeyManagementFamily::RsaKeyWrap, KeyManagementParameters::None) => {
            let private = rsa_private_key(alg, key)?;
            primitives::rsa_decrypt(rsa_padding(alg), private.pkcs8().secret_pkcs8_der(), wrapped()?)
        }
        (KeyManagementFamily::AesKeyWrap, KeyManagementParameters::None) => {
            let kek = secret_key(alg, key, Some(wrap_key_len(alg)?))?;
            primitives::aes_kw_unwrap(kek.as_bytes(), wrapped()?)
        }
        (
            family @ (KeyManagementFamily::KeyAgreement
            | KeyManagementFamily::KeyAgreementWithKeyWrap),
            KeyManagementParameters::Agreement { epk, apu, apv },
        ) => {
            let private = ec_private_key(alg, key)?;
            let curve = private.curve();
            if epk.curve() != curve {
                return Err(JoseError::unsupported_curve(format!(
                    "epk curve {} does not match the {curve} key",
                    epk.curve()
                )));
            }
            let shared_secret = primitives::ecdh_static(curve, private.d(), epk.point())?;
            let derived = agreement_kdf(alg, enc, &shared_secret, apu.as_deref(), apv.as_deref())?;
            if family == KeyManagementFamily::KeyAgreement {
                Ok(derived)
            } else {
                primitives::aes_kw_unwrap(&derived, wrapped()?)
            }
        }
        (KeyManagementFamily::Pbes2, KeyManagementParameters::Pbes2 { p2s, p2c }) => {
            let password = secret_key(alg, key, None)?;
            let p2c = NonZeroU32::new(*p2c)
                .ok_or_else(|| invalid("JOSE Header \"p2c\" (PBES2 Count) missing or invalid"))?;
            let kek = pbes2_kek(alg, password.as_bytes(), p2s, p2c)?;
            primitives::aes_kw_unwrap(&kek, wrapped()?)
        }
        (KeyManagementFamily::AesGcmKeyWrap, KeyManagementParameters::AesGcmKw { iv, tag }) => {
            let kek = secret_key(alg, key, Some(wrap_key_len(alg)?))?;
            primitives::aes_gcm_open(kek.as_bytes(), iv, &[], wrapped()?, tag)
        }
        (family, parameters) => Err(invalid(format!(
            "key management parameters {parameters:?} do not belong to {family:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::{ErrorKind, key::EllipticCurve};

    const ENC: ContentEncryptionAlgorithm = ContentEncryptionAlgorithm::A128Gcm;

    #[test]
    fn direct_uses_the_key_verbatim() {
        let key = JoseKey::from(SecretKey::new(vec![7; 16]));
        let produced = assert_ok!(produce_cek(
            KeyManagementAlgorithm::Dir,
            ENC,
            &key,
            None,
            &KeyManagementOptions::default(),
        ));
        assert_eq!(produced.cek(), &[7; 16]);
        assert!(produced.encrypted_key().is_none());
        assert_eq!(produced.parameters(), &KeyManagementParameters::None);

        let wrong = JoseKey::from(SecretKey::new(vec![7; 32]));
        let err = assert_err!(produce_cek(
            KeyManagementAlgorithm::Dir,
            ENC,
            &wrong,
            None,
            &KeyManagementOptions::default(),
        ));
        assert_eq!(err.kind(), ErrorKind::InvalidKey);

        let err = assert_err!(produce_cek(
            KeyManagementAlgorithm::Dir,
            ENC,
            &key,
            Some(&[7; 16]),
            &KeyManagementOptions::default(),
        ));
        assert!(err.is_configuration());
    }

    #[test]
    fn ecdh_es_is_fresh_and_recoverable() {
        let recipient = EcPrivateKey::generate(EllipticCurve::P256).unwrap();
        let public = JoseKey::from(recipient.public_key().clone());
        let options = KeyManagementOptions::new().with_apu("Alice").with_apv("Bob");

        let first = produce_cek(KeyManagementAlgorithm::EcdhEs, ENC, &public, None, &options).unwrap();
        let second = produce_cek(KeyManagementAlgorithm::EcdhEs, ENC, &public, None, &options).unwrap();
        assert_ne!(first.cek(), second.cek());
        assert_eq!(first.cek().len(), ENC.cek_len());

        let private = JoseKey::from(recipient);
        let recovered = recover_cek(
            KeyManagementAlgorithm::EcdhEs,
            ENC,
            &private,
            None,
            first.parameters(),
        )
        .unwrap();
        assert_eq!(recovered.as_slice(), first.cek());
    }

    #[test]
    fn ed25519_cannot_be_used_for_agreement() {
        let key = JoseKey::from(
            EcPrivateKey::generate(EllipticCurve::Ed25519)
                .unwrap()
                .public_key()
                .clone(),
        );
        let err = assert_err!(produce_cek(
            KeyManagementAlgorithm::EcdhEsA128Kw,
            ENC,
            &key,
            None,
            &KeyManagementOptions::default(),
        ));
        assert_eq!(err.kind(), ErrorKind::UnsupportedCurve);
    }

    #[test]
    fn forced_cek_is_length_checked() {
        let key = JoseKey::from(SecretKey::new(vec![1; 16]));
        let err = assert_err!(produce_cek(
            KeyManagementAlgorithm::A128Kw,
            ContentEncryptionAlgorithm::A256Gcm,
            &key,
            Some(&[0; 16]),
            &KeyManagementOptions::default(),
        ));
        assert_eq!(err.kind(), ErrorKind::InvalidKey);

        let produced = assert_ok!(produce_cek(
            KeyManagementAlgorithm::A128Kw,
            ContentEncryptionAlgorithm::A256Gcm,
            &key,
            Some(&[9; 32]),
            &KeyManagementOptions::default(),
        ));
        assert_eq!(produced.cek(), &[9; 32]);
    }

    #[test]
    fn recover_failures_are_uniform() {
        let key = JoseKey::from(SecretKey::new(vec![1; 16]));
        let produced = produce_cek(
            KeyManagementAlgorithm::A128GcmKw,
            ENC,
            &key,
            None,
            &KeyManagementOptions::default(),
        )
        .unwrap();

        // wrong key, wrong key type, tampered tag
        let wrong_key = JoseKey::from(SecretKey::new(vec![2; 16]));
        let wrong_type = JoseKey::from(EcPrivateKey::generate(EllipticCurve::P256).unwrap());
        let tampered = match produced.parameters() {
            KeyManagementParameters::AesGcmKw { iv, tag } => KeyManagementParameters::AesGcmKw {
                iv: iv.clone(),
                tag: tag.iter().map(|b| b ^ 1).collect(),
            },
            other => panic!("unexpected parameters {other:?}"),
        };

        for (key, parameters) in [
            (&wrong_key, produced.parameters()),
            (&wrong_type, produced.parameters()),
            (&key, &tampered),
        ] {
            let err = assert_err!(recover_cek(
                KeyManagementAlgorithm::A128GcmKw,
                ENC,
                key,
                produced.encrypted_key(),
                parameters,
            ));
            assert_eq!(err.kind(), ErrorKind::DecryptionFailed);
            assert_eq!(err.to_string(), JoseError::decryption_failed().to_string());
        }
    }

    #[test]
    fn parameters_header_round_trip() {
        let key = JoseKey::from(SecretKey::from("correct horse battery staple"));
        let options = KeyManagementOptions::new().with_p2c(1000).with_p2s(vec![3; 8]);
        let produced = produce_cek(
            KeyManagementAlgorithm::Pbes2Hs256A128Kw,
            ENC,
            &key,
            None,
            &options,
        )
        .unwrap();

        let mut headers = Headers::new();
        produced.parameters().write_to(&mut headers).unwrap();
        let merged = headers.as_map().unwrap().clone();
        assert_eq!(merged.get("p2c"), Some(&Value::from(1000)));

        let read = KeyManagementParameters::read_from(
            KeyManagementAlgorithm::Pbes2Hs256A128Kw,
            &merged,
            10_000,
        )
        .unwrap();
        assert_eq!(&read, produced.parameters());

        let err = assert_err!(KeyManagementParameters::read_from(
            KeyManagementAlgorithm::Pbes2Hs256A128Kw,
            &merged,
            999,
        ));
        assert_eq!(err.kind(), ErrorKind::InvalidHeader(Envelope::Jwe));

        let recovered = recover_cek(
            KeyManagementAlgorithm::Pbes2Hs256A128Kw,
            ENC,
            &key,
            produced.encrypted_key(),
            &read,
        )
        .unwrap();
        assert_eq!(recovered.as_slice(), produced.cek());
    }

    #[test]
    fn short_salts_are_rejected() {
        let key = JoseKey::from(SecretKey::from("password"));
        let options = KeyManagementOptions::new().with_p2s(vec![3; 7]);
        let err = assert_err!(produce_cek(
            KeyManagementAlgorithm::Pbes2Hs512A256Kw,
            ENC,
            &key,
            None,
            &options,
        ));
        assert!(err.is_configuration());

        let mut merged = Map::new();
        merged.insert("p2c".to_owned(), Value::from(1000));
        merged.insert("p2s".to_owned(), Value::from(BASE64_URL_SAFE_NO_PAD.encode([3; 7])));
        let err = assert_err!(KeyManagementParameters::read_from(
            KeyManagementAlgorithm::Pbes2Hs512A256Kw,
            &merged,
            10_000,
        ));
        assert_eq!(err.kind(), ErrorKind::InvalidHeader(Envelope::Jwe));
    }
}
