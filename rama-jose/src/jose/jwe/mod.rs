//! JSON Web Encryption, [`rfc7516`].
//!
//! A [`JWEBuilder`] encrypts a plaintext for one or more [`Recipient`]s and
//! emits the compact ([`JWECompact`]), flattened ([`JWEFlattened`]) or general
//! ([`JWE`]) serialization. Each of those decrypt back into a [`DecryptedJWE`].
//!
//! Header handling is shared with JWS: the protected, shared unprotected and
//! per-recipient unprotected header sets must be disjoint and `crit` is
//! validated against [`RecognizedExtensions`]. Once a recipient's key is
//! tried, every failure is the same [`ErrorKind::DecryptionFailed`].
//!
//! [`rfc7516`]: https://datatracker.ietf.org/doc/html/rfc7516
//! [`ErrorKind::DecryptionFailed`]: crate::ErrorKind::DecryptionFailed

use std::fmt;

use base64::{Engine as _, prelude::BASE64_URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use zeroize::Zeroizing;

use crate::{Envelope, JoseError, key::JoseKey, primitives};

use super::{
    ContentEncryptionAlgorithm, Headers, KeyManagementAlgorithm, RecognizedExtensions,
    crit::validate_crit,
    header::{ensure_disjoint, merge},
};

mod content;
mod ecdh;
mod key_management;

pub use key_management::{
    DEFAULT_PBES2_COUNT, DEFAULT_PBES2_SALT_LEN, KeyManagementOptions, KeyManagementParameters,
    MIN_PBES2_SALT_LEN, ProducedCek, produce_cek, recover_cek,
};

/// Highest `p2c` accepted while decrypting, unless configured otherwise.
pub const DEFAULT_MAX_PBES2_COUNT: u32 = 10_000;

#[derive(Debug, Clone)]
/// A recipient of a [`JWEBuilder`]: its key, per-recipient header and key management options.
pub struct Recipient {
    key: JoseKey,
    header: Headers,
    options: KeyManagementOptions,
}

impl Recipient {
    /// Create a [`Recipient`] for the given key.
    pub fn new(key: impl Into<JoseKey>) -> Self {
        Self {
            key: key.into(),
            header: Headers::new(),
            options: KeyManagementOptions::default(),
        }
    }

    /// Set a per-recipient unprotected header parameter.
    pub fn try_with_header(
        mut self,
        name: impl Into<String>,
        value: impl Serialize,
    ) -> Result<Self, JoseError> {
        self.try_set_header(name, value)?;
        Ok(self)
    }

    /// Set a per-recipient unprotected header parameter.
    pub fn try_set_header(
        &mut self,
        name: impl Into<String>,
        value: impl Serialize,
    ) -> Result<&mut Self, JoseError> {
        self.header.try_set_header(name, value)?;
        Ok(self)
    }

    /// Mutable reference to the per-recipient unprotected header.
    pub fn header_mut(&mut self) -> &mut Headers {
        &mut self.header
    }

    #[must_use]
    /// Key management options (`apu`, `apv`, `p2s`, `p2c`, `iv`) for this recipient.
    pub fn with_options(mut self, options: KeyManagementOptions) -> Self {
        self.set_options(options);
        self
    }

    /// Key management options (`apu`, `apv`, `p2s`, `p2c`, `iv`) for this recipient.
    pub fn set_options(&mut self, options: KeyManagementOptions) -> &mut Self {
        self.options = options;
        self
    }
}

#[derive(Default, Clone)]
/// [`JWEBuilder`] encrypts a plaintext into a [`JWECompact`], [`JWEFlattened`] or [`JWE`]
pub struct JWEBuilder {
    protected_headers: Headers,
    unprotected_headers: Headers,
    plaintext: Zeroizing<Vec<u8>>,
    aad: Option<Vec<u8>>,
    crit: Option<RecognizedExtensions>,
    cek: Option<Zeroizing<Vec<u8>>>,
    iv: Option<Vec<u8>>,
}

impl fmt::Debug for JWEBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JWEBuilder")
            .field("protected_headers", &self.protected_headers)
            .field("unprotected_headers", &self.unprotected_headers)
            .field("plaintext", &self.plaintext.len())
            .field("aad", &self.aad.as_ref().map(Vec::len))
            .field("crit", &self.crit)
            .finish_non_exhaustive()
    }
}

/// Output of the encryption, before it is laid out in a serialization.
struct Encrypted {
    protected: String,
    unprotected: Headers,
    recipients: Vec<RecipientEntry>,
    aad: Option<String>,
    iv: String,
    ciphertext: String,
    tag: String,
}

fn header_algorithms(
    merged: &Map<String, Value>,
) -> Result<(KeyManagementAlgorithm, ContentEncryptionAlgorithm), JoseError> {
    if merged.contains_key("zip") {
        return Err(JoseError::unsupported_algorithm(
            "JWE \"zip\" (Compression Algorithm) Header Parameter is not supported",
        ));
    }
    let alg = merged
        .get("alg")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            JoseError::invalid_header(
                Envelope::Jwe,
                "JWE \"alg\" (Algorithm) Header Parameter missing or invalid",
            )
        })?
        .parse()?;
    let enc = merged
        .get("enc")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            JoseError::invalid_header(
                Envelope::Jwe,
                "JWE \"enc\" (Encryption Algorithm) Header Parameter missing or invalid",
            )
        })?
        .parse()?;
    Ok((alg, enc))
}

fn disjoint(protected: &Headers, shared: &Headers, recipient: &Headers) -> Result<(), JoseError> {
    ensure_disjoint(
        Envelope::Jwe,
        &[
            ("Protected", protected),
            ("Shared Unprotected", shared),
            ("Per-Recipient Unprotected", recipient),
        ],
    )
}

/// Produce the CEK for every recipient, in parallel when there is more than one.
fn produce_all(
    jobs: &[(KeyManagementAlgorithm, &Recipient)],
    enc: ContentEncryptionAlgorithm,
    cek: Option<&[u8]>,
) -> Result<Vec<ProducedCek>, JoseError> {
    if let [(alg, recipient)] = jobs {
        return Ok(vec![produce_cek(
            *alg,
            enc,
            &recipient.key,
            cek,
            &recipient.options,
        )?]);
    }

    std::thread::scope(|scope| {
        let handles: Vec<_> = jobs
            .iter()
            .map(|(alg, recipient)| {
                let alg = *alg;
                scope.spawn(move || produce_cek(alg, enc, &recipient.key, cek, &recipient.options))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
            })
            .collect()
    })
}

impl JWEBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    /// Set the plaintext to encrypt.
    pub fn with_plaintext(mut self, plaintext: impl AsRef<[u8]>) -> Self {
        self.set_plaintext(plaintext);
        self
    }

    /// Set the plaintext to encrypt.
    pub fn set_plaintext(&mut self, plaintext: impl AsRef<[u8]>) -> &mut Self {
        self.plaintext = Zeroizing::new(plaintext.as_ref().to_vec());
        self
    }

    /// Set a protected header parameter.
    pub fn try_with_protected_header(
        mut self,
        name: impl Into<String>,
        value: impl Serialize,
    ) -> Result<Self, JoseError> {
        self.try_set_protected_header(name, value)?;
        Ok(self)
    }

    /// Set a protected header parameter.
    pub fn try_set_protected_header(
        &mut self,
        name: impl Into<String>,
        value: impl Serialize,
    ) -> Result<&mut Self, JoseError> {
        self.protected_headers.try_set_header(name, value)?;
        Ok(self)
    }

    /// Set multiple protected header parameters from a serializable object.
    pub fn try_with_protected_headers(mut self, headers: impl Serialize) -> Result<Self, JoseError> {
        self.protected_headers.try_set_headers(headers)?;
        Ok(self)
    }

    /// Mutable reference to the protected headers.
    pub fn protected_headers_mut(&mut self) -> &mut Headers {
        &mut self.protected_headers
    }

    /// Set a shared unprotected header parameter.
    pub fn try_with_unprotected_header(
        mut self,
        name: impl Into<String>,
        value: impl Serialize,
    ) -> Result<Self, JoseError> {
        self.try_set_unprotected_header(name, value)?;
        Ok(self)
    }

    /// Set a shared unprotected header parameter.
    pub fn try_set_unprotected_header(
        &mut self,
        name: impl Into<String>,
        value: impl Serialize,
    ) -> Result<&mut Self, JoseError> {
        self.unprotected_headers.try_set_header(name, value)?;
        Ok(self)
    }

    /// Mutable reference to the shared unprotected headers.
    pub fn unprotected_headers_mut(&mut self) -> &mut Headers {
        &mut self.unprotected_headers
    }

    #[must_use]
    /// Additional authenticated data, not available in the compact serialization.
    pub fn with_aad(mut self, aad: impl AsRef<[u8]>) -> Self {
        self.set_aad(aad);
        self
    }

    /// Additional authenticated data, not available in the compact serialization.
    pub fn set_aad(&mut self, aad: impl AsRef<[u8]>) -> &mut Self {
        self.aad = Some(aad.as_ref().to_vec());
        self
    }

    #[must_use]
    /// Extensions that may be listed in `crit`.
    pub fn with_crit(mut self, crit: RecognizedExtensions) -> Self {
        self.set_crit(crit);
        self
    }

    /// Extensions that may be listed in `crit`.
    pub fn set_crit(&mut self, crit: RecognizedExtensions) -> &mut Self {
        self.crit = Some(crit);
        self
    }

    #[must_use]
    /// Use this content encryption key instead of a random one.
    ///
    /// Only meant for reproducing test vectors.
    pub fn with_cek(mut self, cek: impl AsRef<[u8]>) -> Self {
        self.set_cek(cek);
        self
    }

    /// Use this content encryption key instead of a random one.
    ///
    /// Only meant for reproducing test vectors.
    pub fn set_cek(&mut self, cek: impl AsRef<[u8]>) -> &mut Self {
        self.cek = Some(Zeroizing::new(cek.as_ref().to_vec()));
        self
    }

    #[must_use]
    /// Use this initialization vector instead of a random one.
    ///
    /// Only meant for reproducing test vectors.
    pub fn with_iv(mut self, iv: impl AsRef<[u8]>) -> Self {
        self.set_iv(iv);
        self
    }

    /// Use this initialization vector instead of a random one.
    ///
    /// Only meant for reproducing test vectors.
    pub fn set_iv(&mut self, iv: impl AsRef<[u8]>) -> &mut Self {
        self.iv = Some(iv.as_ref().to_vec());
        self
    }

    /// Build a [`JWECompact`] for a single recipient.
    ///
    /// All header parameters have to be protected, and there is no AAD.
    pub fn build_compact(self, recipient: &Recipient) -> Result<JWECompact, JoseError> {
        if self.unprotected_headers.is_some() || recipient.header.is_some() {
            return Err(JoseError::configuration(
                "JWE Compact Serialization can not carry unprotected headers",
            ));
        }
        if self.aad.is_some() {
            return Err(JoseError::configuration(
                "JWE Compact Serialization can not carry additional authenticated data",
            ));
        }
        let encrypted = self.encrypt(std::slice::from_ref(recipient))?;
        let encrypted_key = encrypted
            .recipients
            .first()
            .map(|entry| entry.encrypted_key.as_str())
            .unwrap_or_default();
        Ok(JWECompact(format!(
            "{}.{}.{}.{}.{}",
            encrypted.protected, encrypted_key, encrypted.iv, encrypted.ciphertext, encrypted.tag
        )))
    }

    /// Build a [`JWEFlattened`] for a single recipient.
    pub fn build_flattened(self, recipient: &Recipient) -> Result<JWEFlattened, JoseError> {
        let mut encrypted = self.encrypt(std::slice::from_ref(recipient))?;
        let entry = encrypted.recipients.pop().unwrap_or_default();
        Ok(JWEFlattened {
            protected: encrypted.protected,
            unprotected: encrypted.unprotected,
            header: entry.header,
            encrypted_key: entry.encrypted_key,
            aad: encrypted.aad,
            iv: encrypted.iv,
            ciphertext: encrypted.ciphertext,
            tag: encrypted.tag,
        })
    }

    /// Build a general [`JWE`] for one or more recipients.
    ///
    /// All recipients share the content encryption key, so they must agree
    /// on `enc`, and `dir` or `ECDH-ES` can only be used by a sole recipient.
    pub fn build_jwe(self, recipients: &[Recipient]) -> Result<JWE, JoseError> {
        let encrypted = self.encrypt(recipients)?;
        Ok(JWE {
            protected: encrypted.protected,
            unprotected: encrypted.unprotected,
            recipients: encrypted.recipients,
            aad: encrypted.aad,
            iv: encrypted.iv,
            ciphertext: encrypted.ciphertext,
            tag: encrypted.tag,
        })
    }

    fn encrypt(self, recipients: &[Recipient]) -> Result<Encrypted, JoseError> {
        if recipients.is_empty() {
            return Err(JoseError::configuration("a JWE needs at least one recipient"));
        }

        let mut jobs = Vec::with_capacity(recipients.len());
        let mut shared_enc = None;
        for recipient in recipients {
            let protected = &self.protected_headers;
            if protected.is_none() && self.unprotected_headers.is_none() && recipient.header.is_none()
            {
                return Err(JoseError::invalid_header(
                    Envelope::Jwe,
                    "JWE Protected, JWE Shared Unprotected and JWE Per-Recipient Header missing",
                ));
            }
            disjoint(protected, &self.unprotected_headers, &recipient.header)?;
            let merged = merge(&[protected, &self.unprotected_headers, &recipient.header]);
            validate_crit(
                Envelope::Jwe,
                &RecognizedExtensions::jwe_default(),
                self.crit.as_ref(),
                protected,
                &merged,
            )?;

            let (alg, enc) = header_algorithms(&merged)?;
            match shared_enc {
                Some(shared) if shared != enc => {
                    return Err(JoseError::invalid_header(
                        Envelope::Jwe,
                        "all JWE recipients must use the same \"enc\" (Encryption Algorithm)",
                    ));
                }
                _ => shared_enc = Some(enc),
            }
            if recipients.len() > 1 && alg.is_direct() {
                return Err(JoseError::invalid_header(
                    Envelope::Jwe,
                    format!("JWE \"alg\" {alg} can only be used with a single recipient"),
                ));
            }
            jobs.push((alg, recipient));
        }
        let enc = shared_enc.ok_or_else(|| {
            JoseError::configuration("a JWE needs at least one recipient")
        })?;

        // direct algorithms make their own CEK, every other recipient shares one
        let direct = jobs.iter().any(|(alg, _)| alg.is_direct());
        let shared_cek = match (&self.cek, direct) {
            (Some(cek), _) => Some(cek.clone()),
            (None, false) => Some(primitives::random_bytes(enc.cek_len())?),
            (None, true) => None,
        };

        tracing::trace!(
            "JWE: producing {enc} content encryption key for {} recipient(s)",
            jobs.len()
        );
        let produced = produce_all(&jobs, enc, shared_cek.as_deref().map(Vec::as_slice))?;

        let mut protected = self.protected_headers;
        let mut entries = Vec::with_capacity(produced.len());
        let mut cek = None;
        let single = produced.len() == 1;
        for (produced, (_, recipient)) in produced.into_iter().zip(&jobs) {
            let (recipient_cek, encrypted_key, parameters) = produced.into_parts();
            let mut header = recipient.header.clone();
            if single {
                parameters.write_to(&mut protected)?;
            } else {
                parameters.write_to(&mut header)?;
            }
            disjoint(&protected, &self.unprotected_headers, &header)?;

            if cek.is_none() {
                cek = Some(recipient_cek);
            }
            entries.push(RecipientEntry {
                header,
                encrypted_key: encrypted_key
                    .map(|key| BASE64_URL_SAFE_NO_PAD.encode(key))
                    .unwrap_or_default(),
            });
        }
        let cek = cek.ok_or_else(|| JoseError::configuration("a JWE needs at least one recipient"))?;

        let iv = match self.iv {
            Some(iv) => iv,
            None => primitives::random_bytes(enc.iv_len())?.to_vec(),
        };
        let protected_b64 = protected.as_encoded_string()?;
        let aad_b64 = self.aad.as_ref().map(|aad| BASE64_URL_SAFE_NO_PAD.encode(aad));
        let aad = additional_data(&protected_b64, aad_b64.as_deref());

        let (ciphertext, tag) = content::encrypt(enc, &cek, &iv, &aad, &self.plaintext)?;
        tracing::trace!("JWE: encrypted {} byte plaintext with {enc}", self.plaintext.len());

        Ok(Encrypted {
            protected: protected_b64,
            unprotected: self.unprotected_headers,
            recipients: entries,
            aad: aad_b64,
            iv: BASE64_URL_SAFE_NO_PAD.encode(iv),
            ciphertext: BASE64_URL_SAFE_NO_PAD.encode(ciphertext),
            tag: BASE64_URL_SAFE_NO_PAD.encode(tag),
        })
    }
}

/// `ASCII(BASE64URL(protected))`, followed by `'.' BASE64URL(aad)` when there is AAD.
fn additional_data(protected: &str, aad: Option<&str>) -> Vec<u8> {
    let mut data = protected.as_bytes().to_vec();
    if let Some(aad) = aad {
        data.push(b'.');
        data.extend_from_slice(aad.as_bytes());
    }
    data
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Options applied while decrypting a [`JWECompact`], [`JWEFlattened`] or [`JWE`]
pub struct JweDecryptOptions {
    crit: Option<RecognizedExtensions>,
    algorithms: Option<Vec<String>>,
    encryption_algorithms: Option<Vec<String>>,
    max_pbes2_count: u32,
}

impl Default for JweDecryptOptions {
    fn default() -> Self {
        Self {
            crit: None,
            algorithms: None,
            encryption_algorithms: None,
            max_pbes2_count: DEFAULT_MAX_PBES2_COUNT,
        }
    }
}

fn owned_names<A: AsRef<str>>(names: impl IntoIterator<Item = A>) -> Vec<String> {
    names
        .into_iter()
        .map(|name| name.as_ref().to_owned())
        .collect()
}

impl JweDecryptOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    /// Extensions the caller understands, JWE has none built in.
    pub fn with_crit(mut self, crit: RecognizedExtensions) -> Self {
        self.set_crit(crit);
        self
    }

    /// Extensions the caller understands, JWE has none built in.
    pub fn set_crit(&mut self, crit: RecognizedExtensions) -> &mut Self {
        self.crit = Some(crit);
        self
    }

    #[must_use]
    /// Only accept these `alg` values.
    pub fn with_key_management_algorithms<A: AsRef<str>>(
        mut self,
        algorithms: impl IntoIterator<Item = A>,
    ) -> Self {
        self.set_key_management_algorithms(algorithms);
        self
    }

    /// Only accept these `alg` values.
    pub fn set_key_management_algorithms<A: AsRef<str>>(
        &mut self,
        algorithms: impl IntoIterator<Item = A>,
    ) -> &mut Self {
        self.algorithms = Some(owned_names(algorithms));
        self
    }

    #[must_use]
    /// Only accept these `enc` values.
    pub fn with_content_encryption_algorithms<A: AsRef<str>>(
        mut self,
        algorithms: impl IntoIterator<Item = A>,
    ) -> Self {
        self.set_content_encryption_algorithms(algorithms);
        self
    }

    /// Only accept these `enc` values.
    pub fn set_content_encryption_algorithms<A: AsRef<str>>(
        &mut self,
        algorithms: impl IntoIterator<Item = A>,
    ) -> &mut Self {
        self.encryption_algorithms = Some(owned_names(algorithms));
        self
    }

    #[must_use]
    /// Highest accepted PBES2 iteration count (`p2c`).
    pub fn with_max_pbes2_count(mut self, max: u32) -> Self {
        self.set_max_pbes2_count(max);
        self
    }

    /// Highest accepted PBES2 iteration count (`p2c`).
    pub fn set_max_pbes2_count(&mut self, max: u32) -> &mut Self {
        self.max_pbes2_count = max;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// [`JWECompact`] is the compact serialization, [`rfc7516, section 7.1`]
///
/// [`rfc7516, section 7.1`]: https://datatracker.ietf.org/doc/html/rfc7516#section-7.1
pub struct JWECompact(String);

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
struct RecipientEntry {
    #[serde(default, skip_serializing_if = "Headers::is_none")]
    header: Headers,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    encrypted_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// [`JWEFlattened`] is the flattened JSON serialization, [`rfc7516, section 7.2.2`]
///
/// [`rfc7516, section 7.2.2`]: https://datatracker.ietf.org/doc/html/rfc7516#section-7.2.2
pub struct JWEFlattened {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    protected: String,
    #[serde(default, skip_serializing_if = "Headers::is_none")]
    unprotected: Headers,
    #[serde(default, skip_serializing_if = "Headers::is_none")]
    header: Headers,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    encrypted_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    aad: Option<String>,
    iv: String,
    ciphertext: String,
    tag: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// [`JWE`] is the general JSON serialization, [`rfc7516, section 7.2.1`]
///
/// [`rfc7516, section 7.2.1`]: https://datatracker.ietf.org/doc/html/rfc7516#section-7.2.1
pub struct JWE {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    protected: String,
    #[serde(default, skip_serializing_if = "Headers::is_none")]
    unprotected: Headers,
    recipients: Vec<RecipientEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    aad: Option<String>,
    iv: String,
    ciphertext: String,
    tag: String,
}

/// Shared parts of a received envelope.
struct Received<'a> {
    protected: &'a str,
    unprotected: &'a Headers,
    aad: Option<&'a str>,
    iv: &'a str,
    ciphertext: &'a str,
    tag: &'a str,
}

fn decode_member(value: &str, name: &'static str) -> Result<Vec<u8>, JoseError> {
    BASE64_URL_SAFE_NO_PAD.decode(value).map_err(|_err| {
        JoseError::invalid_header(Envelope::Jwe, format!("Failed to base64url decode the {name}"))
    })
}

fn check_allowed(
    allowed: Option<&Vec<String>>,
    value: &str,
    message: &'static str,
) -> Result<(), JoseError> {
    match allowed {
        Some(allowed) if !allowed.iter().any(|allowed| allowed == value) => {
            Err(JoseError::unsupported_algorithm(message))
        }
        _ => Ok(()),
    }
}

impl Received<'_> {
    fn decrypt(
        &self,
        protected: &Headers,
        recipient: &RecipientEntry,
        key: &JoseKey,
        options: &JweDecryptOptions,
    ) -> Result<DecryptedJWE, JoseError> {
        if protected.is_none() && self.unprotected.is_none() && recipient.header.is_none() {
            return Err(JoseError::invalid_header(
                Envelope::Jwe,
                "JWE Protected, JWE Shared Unprotected and JWE Per-Recipient Header missing",
            ));
        }
        disjoint(protected, self.unprotected, &recipient.header)?;
        let merged = merge(&[protected, self.unprotected, &recipient.header]);
        validate_crit(
            Envelope::Jwe,
            &RecognizedExtensions::jwe_default(),
            options.crit.as_ref(),
            protected,
            &merged,
        )?;

        let (alg, enc) = header_algorithms(&merged)?;
        check_allowed(
            options.algorithms.as_ref(),
            alg.as_str(),
            "\"alg\" (Algorithm) Header Parameter value not allowed",
        )?;
        check_allowed(
            options.encryption_algorithms.as_ref(),
            enc.as_str(),
            "\"enc\" (Encryption Algorithm) Header Parameter value not allowed",
        )?;

        let parameters = KeyManagementParameters::read_from(alg, &merged, options.max_pbes2_count)?;
        let encrypted_key = decode_member(&recipient.encrypted_key, "encrypted_key")?;
        if alg.is_direct() && !encrypted_key.is_empty() {
            return Err(JoseError::invalid_header(
                Envelope::Jwe,
                "Encountered unexpected JWE Encrypted Key",
            ));
        }
        let iv = decode_member(self.iv, "iv")?;
        let ciphertext = decode_member(self.ciphertext, "ciphertext")?;
        let tag = decode_member(self.tag, "tag")?;
        let aad = self.aad.map(|aad| decode_member(aad, "aad")).transpose()?;

        // a failed recovery continues with a random CEK, the content decryption then fails
        let cek = match recover_cek(
            alg,
            enc,
            key,
            Some(encrypted_key.as_slice()).filter(|key| !key.is_empty()),
            &parameters,
        ) {
            Ok(cek) if cek.len() == enc.cek_len() => cek,
            _ => primitives::random_bytes(enc.cek_len())?,
        };

        let additional = additional_data(self.protected, self.aad);
        let mut plaintext = content::decrypt(enc, &cek, &iv, &additional, &ciphertext, &tag)?;
        tracing::trace!("JWE: decrypted {alg} / {enc} content");

        Ok(DecryptedJWE {
            plaintext: std::mem::take(&mut *plaintext),
            protected: protected.clone(),
            unprotected: self.unprotected.clone(),
            recipient_header: recipient.header.clone(),
            aad,
            alg,
            enc,
        })
    }
}

impl JWECompact {
    /// Create a builder which can be used to create a [`JWECompact`]
    pub fn builder() -> JWEBuilder {
        JWEBuilder::new()
    }

    /// Wrap a received compact serialization.
    pub fn new(compact: impl Into<String>) -> Self {
        Self(compact.into())
    }

    /// The compact serialization.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decrypt with default options.
    pub fn decrypt(&self, key: &JoseKey) -> Result<DecryptedJWE, JoseError> {
        self.decrypt_with_options(key, &JweDecryptOptions::default())
    }

    /// Decrypt, checking the headers against `options`.
    pub fn decrypt_with_options(
        &self,
        key: &JoseKey,
        options: &JweDecryptOptions,
    ) -> Result<DecryptedJWE, JoseError> {
        let mut parts = self.0.split('.');
        let (protected, encrypted_key, iv, ciphertext, tag) = match (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) {
            (Some(protected), Some(encrypted_key), Some(iv), Some(ciphertext), Some(tag), None) => {
                (protected, encrypted_key, iv, ciphertext, tag)
            }
            _ => return Err(JoseError::invalid_header(Envelope::Jwe, "Invalid Compact JWE")),
        };
        if protected.is_empty() {
            return Err(JoseError::invalid_header(
                Envelope::Jwe,
                "JWE Protected Header missing",
            ));
        }

        let unprotected = Headers::new();
        let received = Received {
            protected,
            unprotected: &unprotected,
            aad: None,
            iv,
            ciphertext,
            tag,
        };
        let protected_headers = Headers::from_encoded_str(Envelope::Jwe, protected)?;
        received.decrypt(
            &protected_headers,
            &RecipientEntry {
                header: Headers::new(),
                encrypted_key: encrypted_key.to_owned(),
            },
            key,
            options,
        )
    }
}

impl JWEFlattened {
    /// Create a builder which can be used to create a [`JWEFlattened`]
    pub fn builder() -> JWEBuilder {
        JWEBuilder::new()
    }

    /// Convert to the compact serialization, possible only when all headers are protected and there is no AAD.
    pub fn as_compact(&self) -> Result<JWECompact, JoseError> {
        if self.protected.is_empty()
            || self.unprotected.is_some()
            || self.header.is_some()
            || self.aad.is_some()
        {
            return Err(JoseError::configuration(
                "only a JWE with just a protected header and no AAD has a compact serialization",
            ));
        }
        Ok(JWECompact(format!(
            "{}.{}.{}.{}.{}",
            self.protected, self.encrypted_key, self.iv, self.ciphertext, self.tag
        )))
    }

    /// Decrypt with default options.
    pub fn decrypt(&self, key: &JoseKey) -> Result<DecryptedJWE, JoseError> {
        self.decrypt_with_options(key, &JweDecryptOptions::default())
    }

    /// Decrypt, checking the headers against `options`.
    pub fn decrypt_with_options(
        &self,
        key: &JoseKey,
        options: &JweDecryptOptions,
    ) -> Result<DecryptedJWE, JoseError> {
        let received = Received {
            protected: &self.protected,
            unprotected: &self.unprotected,
            aad: self.aad.as_deref(),
            iv: &self.iv,
            ciphertext: &self.ciphertext,
            tag: &self.tag,
        };
        let protected = Headers::from_encoded_str(Envelope::Jwe, &self.protected)?;
        received.decrypt(
            &protected,
            &RecipientEntry {
                header: self.header.clone(),
                encrypted_key: self.encrypted_key.clone(),
            },
            key,
            options,
        )
    }
}

impl JWE {
    /// Create a builder which can be used to create a [`JWE`]
    pub fn builder() -> JWEBuilder {
        JWEBuilder::new()
    }

    /// Number of recipients.
    pub fn recipient_count(&self) -> usize {
        self.recipients.len()
    }

    /// Decrypt with default options.
    pub fn decrypt(&self, key: &JoseKey) -> Result<DecryptedJWE, JoseError> {
        self.decrypt_with_options(key, &JweDecryptOptions::default())
    }

    /// Decrypt with the first recipient `key` works for.
    ///
    /// With a single recipient its error is returned as is, otherwise a
    /// failure for every recipient is [`ErrorKind::DecryptionFailed`](crate::ErrorKind::DecryptionFailed).
    pub fn decrypt_with_options(
        &self,
        key: &JoseKey,
        options: &JweDecryptOptions,
    ) -> Result<DecryptedJWE, JoseError> {
        let received = Received {
            protected: &self.protected,
            unprotected: &self.unprotected,
            aad: self.aad.as_deref(),
            iv: &self.iv,
            ciphertext: &self.ciphertext,
            tag: &self.tag,
        };
        let protected = Headers::from_encoded_str(Envelope::Jwe, &self.protected)?;

        match self.recipients.as_slice() {
            [] => Err(JoseError::invalid_header(
                Envelope::Jwe,
                "JWE Recipients missing or incorrect type",
            )),
            [recipient] => received.decrypt(&protected, recipient, key, options),
            recipients => {
                for (index, recipient) in recipients.iter().enumerate() {
                    match received.decrypt(&protected, recipient, key, options) {
                        Ok(decrypted) => return Ok(decrypted),
                        Err(err) => {
                            tracing::debug!("JWE recipient {index} could not be decrypted: {err}");
                        }
                    }
                }
                Err(JoseError::decryption_failed())
            }
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
/// Plaintext and headers of a decrypted JWE.
pub struct DecryptedJWE {
    plaintext: Vec<u8>,
    protected: Headers,
    unprotected: Headers,
    recipient_header: Headers,
    aad: Option<Vec<u8>>,
    alg: KeyManagementAlgorithm,
    enc: ContentEncryptionAlgorithm,
}

impl fmt::Debug for DecryptedJWE {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptedJWE")
            .field("protected", &self.protected)
            .field("unprotected", &self.unprotected)
            .field("recipient_header", &self.recipient_header)
            .field("alg", &self.alg)
            .field("enc", &self.enc)
            .finish_non_exhaustive()
    }
}

impl DecryptedJWE {
    /// The decrypted plaintext.
    pub fn plaintext(&self) -> &[u8] {
        &self.plaintext
    }

    /// Consume and return the plaintext.
    pub fn into_plaintext(self) -> Vec<u8> {
        self.plaintext
    }

    /// Reference to the protected headers.
    pub fn protected_headers(&self) -> &Headers {
        &self.protected
    }

    /// Decode the protected headers to the provided `T`
    pub fn decode_protected_headers<'de, 'a: 'de, T: Deserialize<'de>>(
        &'a self,
    ) -> Result<T, JoseError> {
        self.protected.decode()
    }

    /// Reference to the shared unprotected headers.
    pub fn unprotected_headers(&self) -> &Headers {
        &self.unprotected
    }

    /// Reference to the per-recipient unprotected headers of the recipient that decrypted.
    pub fn recipient_headers(&self) -> &Headers {
        &self.recipient_header
    }

    /// Decoded additional authenticated data, if any.
    pub fn aad(&self) -> Option<&[u8]> {
        self.aad.as_deref()
    }

    /// The `alg` that recovered the content encryption key.
    pub fn key_management_algorithm(&self) -> KeyManagementAlgorithm {
        self.alg
    }

    /// The `enc` the content was encrypted with.
    pub fn content_encryption_algorithm(&self) -> ContentEncryptionAlgorithm {
        self.enc
    }
}
