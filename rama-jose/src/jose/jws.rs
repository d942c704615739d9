use base64::{Engine as _, prelude::BASE64_URL_SAFE_NO_PAD};
use rama_error::{BoxError, ErrorContext as _};
use serde::{Deserialize, Serialize};

use crate::{Envelope, JoseError};

use super::{
    Headers, RecognizedExtensions,
    crit::validate_crit,
    header::{ensure_disjoint, merge},
};

#[derive(Default, Debug, Clone, PartialEq, Eq)]
/// [`JWSBuilder`] should be used when manually creating a [`JWS`], [`JWSCompact`] or [`JWSFlattened`]
pub struct JWSBuilder {
    protected_headers: Headers,
    unprotected_headers: Headers,
    payload: Vec<u8>,
    crit: Option<RecognizedExtensions>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// [`ChainedJWSBuilder`] will be used to create a [`JWS`] with multiple signatures
pub struct ChainedJWSBuilder {
    signatures: Vec<Signature>,
    payload: Vec<u8>,
    encoded_payload: String,
    protected_headers: Headers,
    unprotected_headers: Headers,
    crit: Option<RecognizedExtensions>,
}

/// Produce a single signature over `payload`.
///
/// Returns the signature and the payload the way it is transmitted, which
/// depends on the `b64` extension.
fn sign_payload(
    payload: &[u8],
    mut protected: Headers,
    mut unprotected: Headers,
    crit: Option<&RecognizedExtensions>,
    signer: &impl Signer,
) -> Result<(Signature, String), JoseError> {
    signer
        .set_headers(&mut protected, &mut unprotected)
        .map_err(signer_error)?;

    if protected.is_none() && unprotected.is_none() {
        return Err(JoseError::invalid_header(
            Envelope::Jws,
            "either the JWS Protected Header or the JWS Unprotected Header must be set",
        ));
    }
    ensure_disjoint(
        Envelope::Jws,
        &[("Protected", &protected), ("Unprotected", &unprotected)],
    )?;
    let b64 = payload_encoding(&protected, &unprotected, crit)?;

    let encoded_payload = if b64 {
        BASE64_URL_SAFE_NO_PAD.encode(payload)
    } else {
        String::from_utf8(payload.to_vec()).map_err(|_err| {
            JoseError::encoding("an unencoded JWS payload must be valid UTF-8")
        })?
    };

    let protected_b64 = protected.as_encoded_string()?;
    let signing_input = signing_input(&protected_b64, encoded_payload.as_bytes());
    let signature = signer.sign(&signing_input).map_err(signer_error)?;

    tracing::trace!("signed JWS with {} byte signing input, b64: {b64}", signing_input.len());

    Ok((
        Signature {
            protected: protected_b64,
            unprotected,
            signature: BASE64_URL_SAFE_NO_PAD.encode(signature.as_ref()),
        },
        encoded_payload,
    ))
}

/// Validate `crit` for a signature and return whether the payload is base64url encoded.
fn payload_encoding(
    protected: &Headers,
    unprotected: &Headers,
    crit: Option<&RecognizedExtensions>,
) -> Result<bool, JoseError> {
    let merged = merge(&[protected, unprotected]);
    let acknowledged = validate_crit(
        Envelope::Jws,
        &RecognizedExtensions::jws_default(),
        crit,
        protected,
        &merged,
    )?;

    if !acknowledged.contains("b64") {
        return Ok(true);
    }
    protected.get("b64").and_then(|b64| b64.as_bool()).ok_or_else(|| {
        JoseError::invalid_header(
            Envelope::Jws,
            "The \"b64\" (base64url-encode payload) Header Parameter must be a boolean",
        )
    })
}

fn signing_input(protected: &str, payload: &[u8]) -> Vec<u8> {
    let mut input = Vec::with_capacity(protected.len() + 1 + payload.len());
    input.extend_from_slice(protected.as_bytes());
    input.push(b'.');
    input.extend_from_slice(payload);
    input
}

fn signer_error(err: impl Into<BoxError>) -> JoseError {
    match err.into().downcast::<JoseError>() {
        Ok(err) => *err,
        Err(err) => JoseError::invalid_key("JWS signer failed").with_source(err),
    }
}

fn verifier_error(err: impl Into<BoxError>) -> JoseError {
    match err.into().downcast::<JoseError>() {
        Ok(err) => *err,
        Err(err) => JoseError::signature_invalid().with_source(err),
    }
}

/// Run `verifier` and keep the signatures it accepted, in their received order.
fn verified_signatures(
    verifier: &impl Verifier,
    payload: &[u8],
    signatures: Vec<ToVerifySignature>,
) -> Result<Vec<DecodedSignature>, JoseError> {
    let accepted = verifier
        .verify(payload, &signatures)
        .map_err(verifier_error)?;
    let offered = signatures.len();
    let verified: Vec<_> = signatures
        .into_iter()
        .enumerate()
        .filter(|(index, _)| accepted.contains(index))
        .map(|(_, signature)| signature.decoded_signature)
        .collect();
    if verified.is_empty() {
        return Err(JoseError::signature_invalid());
    }
    tracing::trace!("JWS: {} of {offered} signature(s) verified", verified.len());
    Ok(verified)
}

fn verified_signature(
    verifier: &impl Verifier,
    payload: &[u8],
    signature: ToVerifySignature,
) -> Result<DecodedSignature, JoseError> {
    verified_signatures(verifier, payload, vec![signature])?
        .pop()
        .ok_or_else(JoseError::signature_invalid)
}

impl JWSBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    /// Add the provided payload to this [`JWSBuilder`]
    pub fn with_payload(mut self, payload: impl AsRef<[u8]>) -> Self {
        self.set_payload(payload);
        self
    }

    /// Add the provided payload to this [`JWSBuilder`]
    pub fn set_payload(&mut self, payload: impl AsRef<[u8]>) -> &mut Self {
        self.payload = payload.as_ref().to_vec();
        self
    }

    /// Set provided header in the protected header map
    ///
    /// Warning: this function will replace already existing headers
    /// If more control is needed, use [`Self::protected_headers_mut`] to get access
    /// to the underlying header store
    pub fn try_with_protected_header(
        mut self,
        name: impl Into<String>,
        value: impl Serialize,
    ) -> Result<Self, JoseError> {
        self.protected_headers.try_set_header(name, value)?;
        Ok(self)
    }

    /// Set provided header in the protected header map
    ///
    /// Warning: this function will replace already existing headers
    pub fn try_set_protected_header(
        &mut self,
        name: impl Into<String>,
        value: impl Serialize,
    ) -> Result<&mut Self, JoseError> {
        self.protected_headers.try_set_header(name, value)?;
        Ok(self)
    }

    /// Set provided headers in the protected header map
    ///
    /// Warning: this function will replace already existing headers
    /// If more control is needed, use [`Self::protected_headers_mut`] to get access
    /// to the underlying header store
    pub fn try_with_protected_headers(mut self, headers: impl Serialize) -> Result<Self, JoseError> {
        self.protected_headers.try_set_headers(headers)?;
        Ok(self)
    }

    /// Set provided headers in the protected header map
    ///
    /// Warning: this function will replace already existing headers
    pub fn try_set_protected_headers(
        &mut self,
        headers: impl Serialize,
    ) -> Result<&mut Self, JoseError> {
        self.protected_headers.try_set_headers(headers)?;
        Ok(self)
    }

    /// Get mutable reference to the underlying protected header store
    ///
    /// This can be used in cases where more granual control is needed
    pub fn protected_headers_mut(&mut self) -> &mut Headers {
        &mut self.protected_headers
    }

    /// Set provided header in the unprotected header map
    ///
    /// Warning: this function will replace already existing headers
    /// If more control is needed, use [`Self::unprotected_headers_mut`] to get access
    /// to the underlying header store
    pub fn try_with_unprotected_header(
        mut self,
        name: impl Into<String>,
        value: impl Serialize,
    ) -> Result<Self, JoseError> {
        self.unprotected_headers.try_set_header(name, value)?;
        Ok(self)
    }

    /// Set provided headers in the unprotected header map
    ///
    /// Warning: this function will replace already existing headers
    /// If more control is needed, use [`Self::unprotected_headers_mut`] to get access
    /// to the underlying header store
    pub fn try_with_unprotected_headers(
        mut self,
        headers: impl Serialize,
    ) -> Result<Self, JoseError> {
        self.unprotected_headers.try_set_headers(headers)?;
        Ok(self)
    }

    /// Get mutable reference to the underlying unprotected header store
    ///
    /// This can be used in cases where more granual control is needed
    pub fn unprotected_headers_mut(&mut self) -> &mut Headers {
        &mut self.unprotected_headers
    }

    #[must_use]
    /// Recognize extra `crit` extensions, applied to every signature made from this builder
    pub fn with_crit(mut self, crit: RecognizedExtensions) -> Self {
        self.set_crit(crit);
        self
    }

    /// Recognize extra `crit` extensions, applied to every signature made from this builder
    pub fn set_crit(&mut self, crit: RecognizedExtensions) -> &mut Self {
        self.crit = Some(crit);
        self
    }

    /// Generate compact serialization of this `JWS`
    ///
    /// This only available if there is no unprotected header set.
    /// With `b64: false` the payload is embedded as is and must not contain a `.`,
    /// use [`Self::build_compact_detached`] otherwise.
    pub fn build_compact(self, signer: &impl Signer) -> Result<JWSCompact, JoseError> {
        self.compact(signer, false)
    }

    /// Generate compact serialization of this `JWS` without the payload,
    /// [`rfc7515, appendix F`]. Verify it with [`JWSCompact::decode_detached`].
    ///
    /// [`rfc7515, appendix F`]: https://datatracker.ietf.org/doc/html/rfc7515#appendix-F
    pub fn build_compact_detached(self, signer: &impl Signer) -> Result<JWSCompact, JoseError> {
        self.compact(signer, true)
    }

    fn compact(self, signer: &impl Signer, detached: bool) -> Result<JWSCompact, JoseError> {
        if self.unprotected_headers.is_some() {
            return Err(JoseError::configuration(
                "Compact jws does not support unprotected headers",
            ));
        }

        let (signature, payload) = sign_payload(
            &self.payload,
            self.protected_headers,
            Headers::new(),
            self.crit.as_ref(),
            signer,
        )?;
        if signature.unprotected.is_some() {
            return Err(JoseError::configuration(
                "Compact jws does not support unprotected headers",
            ));
        }

        let payload = if detached { "" } else { payload.as_str() };
        if payload.contains('.') {
            return Err(JoseError::invalid_header(
                Envelope::Jws,
                "an unencoded payload containing the '.' character must be detached",
            ));
        }
        Ok(JWSCompact(format!(
            "{}.{}.{}",
            signature.protected, payload, signature.signature
        )))
    }

    /// Build a [`JWSFlattened`]
    pub fn build_flattened(self, signer: &impl Signer) -> Result<JWSFlattened, JoseError> {
        let (signature, payload) = sign_payload(
            &self.payload,
            self.protected_headers,
            self.unprotected_headers,
            self.crit.as_ref(),
            signer,
        )?;
        Ok(JWSFlattened { signature, payload })
    }

    /// Build a [`JWS`]
    pub fn build_jws(self, signer: &impl Signer) -> Result<JWS, JoseError> {
        let (signature, payload) = sign_payload(
            &self.payload,
            self.protected_headers,
            self.unprotected_headers,
            self.crit.as_ref(),
            signer,
        )?;
        Ok(JWS {
            signatures: vec![signature],
            payload,
        })
    }

    /// Create a [`ChainedJWSBuilder`] with the same payload but that can add a new set of headers
    /// and which will be signed again. This is needed to create a [`JWS`] with multiple signatures.
    pub fn add_signature(self, signer: &impl Signer) -> Result<ChainedJWSBuilder, JoseError> {
        let (signature, encoded_payload) = sign_payload(
            &self.payload,
            self.protected_headers,
            self.unprotected_headers,
            self.crit.as_ref(),
            signer,
        )?;
        Ok(ChainedJWSBuilder {
            signatures: vec![signature],
            payload: self.payload,
            encoded_payload,
            protected_headers: Headers::new(),
            unprotected_headers: Headers::new(),
            crit: self.crit,
        })
    }
}

impl ChainedJWSBuilder {
    /// Set provided header in the protected header map
    ///
    /// Warning: this function will replace already existing headers
    /// If more control is use `.protected_headers_mut()` to get access
    /// to the underlying header store
    pub fn try_with_protected_header(
        mut self,
        name: impl Into<String>,
        value: impl Serialize,
    ) -> Result<Self, JoseError> {
        self.protected_headers.try_set_header(name, value)?;
        Ok(self)
    }

    /// Set provided headers in the protected header map
    ///
    /// Warning: this function will replace already existing headers
    pub fn try_with_protected_headers(mut self, headers: impl Serialize) -> Result<Self, JoseError> {
        self.protected_headers.try_set_headers(headers)?;
        Ok(self)
    }

    /// Get mutable reference to the underlying protected header store
    pub fn protected_headers_mut(&mut self) -> &mut Headers {
        &mut self.protected_headers
    }

    /// Set provided header in the unprotected header map
    ///
    /// Warning: this function will replace already existing headers
    pub fn try_with_unprotected_header(
        mut self,
        name: impl Into<String>,
        value: impl Serialize,
    ) -> Result<Self, JoseError> {
        self.unprotected_headers.try_set_header(name, value)?;
        Ok(self)
    }

    /// Set provided headers in the unprotected header map
    ///
    /// Warning: this function will replace already existing headers
    pub fn try_with_unprotected_headers(
        mut self,
        headers: impl Serialize,
    ) -> Result<Self, JoseError> {
        self.unprotected_headers.try_set_headers(headers)?;
        Ok(self)
    }

    /// Get mutable reference to the underlying unprotected header store
    pub fn unprotected_headers_mut(&mut self) -> &mut Headers {
        &mut self.unprotected_headers
    }

    fn push_signature(&mut self, signer: &impl Signer) -> Result<(), JoseError> {
        let (signature, encoded_payload) = sign_payload(
            &self.payload,
            std::mem::take(&mut self.protected_headers),
            std::mem::take(&mut self.unprotected_headers),
            self.crit.as_ref(),
            signer,
        )?;
        // b64 must agree between all signatures
        if encoded_payload != self.encoded_payload {
            return Err(JoseError::invalid_header(
                Envelope::Jws,
                "the \"b64\" Header Parameter must have the same value for all signatures",
            ));
        }
        self.signatures.push(signature);
        Ok(())
    }

    /// Create a new [`ChainedJWSBuilder`] so we can add another signature
    pub fn add_signature(mut self, signer: &impl Signer) -> Result<Self, JoseError> {
        self.push_signature(signer)?;
        Ok(self)
    }

    /// Build the final [`JWS`] containing all provided signatures
    pub fn build(mut self, signer: &impl Signer) -> Result<JWS, JoseError> {
        self.push_signature(signer)?;
        Ok(JWS {
            payload: self.encoded_payload,
            signatures: self.signatures,
        })
    }
}

/// [`Signer`] implements all methods which are needed to sign our JWS requests,
/// and add the needed info to our JOSE headers (JOSE headers = protected + unprotected headers)
pub trait Signer {
    type Signature: AsRef<[u8]>;
    type Error: Into<BoxError>;

    /// Set headers which are needed to verify the final `Signature`
    ///
    /// Example headers are: `alg`, `kid`
    fn set_headers(
        &self,
        protected_headers: &mut Headers,
        unprotected_headers: &mut Headers,
    ) -> Result<(), Self::Error>;

    /// Sign the JWS signing input (`protected '.' payload`)
    fn sign(&self, data: &[u8]) -> Result<Self::Signature, Self::Error>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Options applied while decoding a [`JWSCompact`], [`JWSFlattened`] or [`JWS`]
pub struct JwsVerifyOptions {
    crit: Option<RecognizedExtensions>,
    algorithms: Option<Vec<String>>,
}

impl JwsVerifyOptions {
    /// Create default options: built-in extensions only and any `alg`.
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    /// Extensions the caller understands in addition to the built-in ones.
    pub fn with_crit(mut self, crit: RecognizedExtensions) -> Self {
        self.set_crit(crit);
        self
    }

    /// Extensions the caller understands in addition to the built-in ones.
    pub fn set_crit(&mut self, crit: RecognizedExtensions) -> &mut Self {
        self.crit = Some(crit);
        self
    }

    #[must_use]
    /// Only accept signatures with one of these `alg` values.
    pub fn with_algorithms<A: AsRef<str>>(mut self, algorithms: impl IntoIterator<Item = A>) -> Self {
        self.set_algorithms(algorithms);
        self
    }

    /// Only accept signatures with one of these `alg` values.
    pub fn set_algorithms<A: AsRef<str>>(
        &mut self,
        algorithms: impl IntoIterator<Item = A>,
    ) -> &mut Self {
        self.algorithms = Some(
            algorithms
                .into_iter()
                .map(|alg| alg.as_ref().to_owned())
                .collect(),
        );
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// [`JWSCompact`] is a compact `JWS` representation as defined in [`rfc7515, section 7.1`]
///
/// [`rfc7515, section 7.1`]: https://datatracker.ietf.org/doc/html/rfc7515#section-7.1
pub struct JWSCompact(String);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
/// [`JWSFlattened`] is a `JWS` which is optimized for a single signature, as defined in [`rfc7515, section 7.2.2`]
///
/// It does this by setting protected, header and signature at the root,
/// vs setting it in the signatures array
///
/// [`rfc7515, section 7.2.2`]: https://datatracker.ietf.org/doc/html/rfc7515#section-7.2.2
pub struct JWSFlattened {
    #[serde(default)]
    payload: String,
    #[serde(flatten)]
    signature: Signature,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
/// [`JWS`] is the general serialization format as defined in [`rfc7515, section 7.2.1`]
///
/// [`rfc7515, section 7.2.1`]: https://datatracker.ietf.org/doc/html/rfc7515#section-7.2.1
pub struct JWS {
    payload: String,
    signatures: Vec<Signature>,
}

/// A signature ready to be verified, with the `b64` mode it was made in.
struct Prepared {
    to_verify: ToVerifySignature,
    b64: bool,
}

/// The payload a received signature covers.
#[derive(Clone, Copy)]
enum ReceivedPayload<'a> {
    /// Embedded in the serialization, in its transmitted form.
    Embedded(&'a str),
    /// Detached and raw, encoded for the signing input when `b64` asks for it.
    Detached(&'a [u8]),
}

fn prepare_signature(
    signature: Signature,
    payload: ReceivedPayload<'_>,
    options: &JwsVerifyOptions,
) -> Result<Prepared, JoseError> {
    let protected = Headers::from_encoded_str(Envelope::Jws, &signature.protected)?;
    if protected.is_none() && signature.unprotected.is_none() {
        return Err(JoseError::invalid_header(
            Envelope::Jws,
            "JWS Protected and JWS Unprotected Header missing",
        ));
    }
    ensure_disjoint(
        Envelope::Jws,
        &[("Protected", &protected), ("Unprotected", &signature.unprotected)],
    )?;
    let b64 = payload_encoding(&protected, &signature.unprotected, options.crit.as_ref())?;

    let alg = protected
        .get_str("alg")
        .or_else(|| signature.unprotected.get_str("alg"))
        .filter(|alg| !alg.is_empty())
        .ok_or_else(|| {
            JoseError::invalid_header(
                Envelope::Jws,
                "JWS \"alg\" (Algorithm) Header Parameter missing or invalid",
            )
        })?
        .to_owned();
    if let Some(algorithms) = &options.algorithms
        && !algorithms.contains(&alg)
    {
        return Err(JoseError::unsupported_algorithm(
            "\"alg\" (Algorithm) Header Parameter value not allowed",
        ));
    }

    let signature_bytes = BASE64_URL_SAFE_NO_PAD
        .decode(&signature.signature)
        .context("decode JWS signature")?;

    let signed_data = match payload {
        ReceivedPayload::Embedded(encoded) => signing_input(&signature.protected, encoded.as_bytes()),
        ReceivedPayload::Detached(raw) if b64 => signing_input(
            &signature.protected,
            BASE64_URL_SAFE_NO_PAD.encode(raw).as_bytes(),
        ),
        ReceivedPayload::Detached(raw) => signing_input(&signature.protected, raw),
    };

    Ok(Prepared {
        to_verify: ToVerifySignature {
            signed_data,
            alg,
            decoded_signature: DecodedSignature {
                protected,
                unprotected: signature.unprotected,
                signature: signature_bytes,
            },
        },
        b64,
    })
}

fn decode_payload(encoded_payload: &str, b64: bool) -> Result<Vec<u8>, JoseError> {
    if b64 {
        Ok(BASE64_URL_SAFE_NO_PAD
            .decode(encoded_payload)
            .context("decode JWS payload")?)
    } else {
        Ok(encoded_payload.as_bytes().to_vec())
    }
}

impl JWSCompact {
    /// Create a builder which can be used to create a [`JWSCompact`]
    pub fn builder() -> JWSBuilder {
        JWSBuilder::new()
    }

    /// Wrap a received compact serialization.
    pub fn new(compact: impl Into<String>) -> Self {
        Self(compact.into())
    }

    /// The compact serialization.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn split(&self) -> Result<(&str, &str, &str), JoseError> {
        let mut parts = self.0.split('.');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(protected), Some(payload), Some(signature), None) => {
                Ok((protected, payload, signature))
            }
            _ => Err(JoseError::invalid_header(
                Envelope::Jws,
                "Invalid Compact JWS",
            )),
        }
    }

    /// Decode this [`JWSCompact`] with default options
    pub fn decode(&self, verifier: &impl Verifier) -> Result<DecodedJWSFlattened, JoseError> {
        self.decode_with_options(verifier, &JwsVerifyOptions::default())
    }

    /// Decode this [`JWSCompact`], checking the headers and the signature with [`Verifier`]
    pub fn decode_with_options(
        &self,
        verifier: &impl Verifier,
        options: &JwsVerifyOptions,
    ) -> Result<DecodedJWSFlattened, JoseError> {
        let (protected, payload, signature) = self.split()?;
        JWSFlattened {
            payload: payload.to_owned(),
            signature: Signature {
                protected: protected.to_owned(),
                unprotected: Headers::new(),
                signature: signature.to_owned(),
            },
        }
        .decode_with_options(verifier, options)
    }

    /// Decode a [`JWSCompact`] made with [`JWSBuilder::build_compact_detached`]
    pub fn decode_detached(
        &self,
        payload: impl AsRef<[u8]>,
        verifier: &impl Verifier,
        options: &JwsVerifyOptions,
    ) -> Result<DecodedJWSFlattened, JoseError> {
        let (protected, embedded, signature) = self.split()?;
        if !embedded.is_empty() {
            return Err(JoseError::invalid_header(
                Envelope::Jws,
                "Compact JWS with a detached payload must have an empty payload segment",
            ));
        }
        let payload = payload.as_ref();
        let signature = Signature {
            protected: protected.to_owned(),
            unprotected: Headers::new(),
            signature: signature.to_owned(),
        };

        let prepared = prepare_signature(signature, ReceivedPayload::Detached(payload), options)?;
        let signature = verified_signature(verifier, payload, prepared.to_verify)?;

        Ok(DecodedJWSFlattened {
            payload: payload.to_vec(),
            signature,
        })
    }
}

impl JWS {
    /// Create a builder which can be used to create a [`JWS`]
    pub fn builder() -> JWSBuilder {
        JWSBuilder::new()
    }

    /// Decode this [`JWS`] with default options
    pub fn decode(self, verifier: &impl Verifier) -> Result<DecodedJWS, JoseError> {
        self.decode_with_options(verifier, &JwsVerifyOptions::default())
    }

    /// Decode this [`JWS`] to a [`DecodedJWS`] by decoding all values and checking with [`Verifier`]
    /// which signatures are correct
    ///
    /// Signatures with unusable headers, or an `alg` outside the allow-list, are
    /// skipped. Only the signatures the [`Verifier`] accepted are returned.
    pub fn decode_with_options(
        self,
        verifier: &impl Verifier,
        options: &JwsVerifyOptions,
    ) -> Result<DecodedJWS, JoseError> {
        if self.signatures.is_empty() {
            return Err(JoseError::invalid_header(
                Envelope::Jws,
                "General JWS must contain at least one signature",
            ));
        }

        let mut b64 = None;
        let mut last_error = None;
        let mut signatures = Vec::with_capacity(self.signatures.len());
        for (index, signature) in self.signatures.into_iter().enumerate() {
            let prepared =
                match prepare_signature(signature, ReceivedPayload::Embedded(&self.payload), options) {
                    Ok(prepared) => prepared,
                    Err(err) if err.is_configuration() => return Err(err),
                    Err(err) => {
                        tracing::trace!("JWS: skipping signature {index}: {err}");
                        last_error = Some(err);
                        continue;
                    }
                };
            if *b64.get_or_insert(prepared.b64) != prepared.b64 {
                return Err(JoseError::invalid_header(
                    Envelope::Jws,
                    "the \"b64\" Header Parameter must have the same value for all signatures",
                ));
            }
            signatures.push(prepared.to_verify);
        }
        if signatures.is_empty() {
            return Err(last_error.unwrap_or_else(JoseError::signature_invalid));
        }

        let payload = decode_payload(&self.payload, b64.unwrap_or(true))?;
        let signatures = verified_signatures(verifier, &payload, signatures)?;

        Ok(DecodedJWS {
            signatures,
            payload,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
struct Signature {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    protected: String,
    #[serde(default, skip_serializing_if = "Headers::is_none")]
    #[serde(rename = "header")]
    unprotected: Headers,
    signature: String,
}

impl JWSFlattened {
    /// Create a builder which can be used to create a [`JWSFlattened`]
    pub fn builder() -> JWSBuilder {
        JWSBuilder::new()
    }

    /// Create a [`JWSCompact`] from this [`JWSFlattened`]
    pub fn as_compact(&self) -> Result<JWSCompact, JoseError> {
        if self.signature.unprotected.is_some() {
            return Err(JoseError::configuration(
                "JWSCompact does not support unprotected headers",
            ));
        };

        Ok(JWSCompact(format!(
            "{}.{}.{}",
            self.signature.protected, self.payload, self.signature.signature
        )))
    }

    /// Decode this [`JWSFlattened`] with default options
    pub fn decode(self, verifier: &impl Verifier) -> Result<DecodedJWSFlattened, JoseError> {
        self.decode_with_options(verifier, &JwsVerifyOptions::default())
    }

    /// Decode this [`JWSFlattened`] to a [`DecodedJWSFlattened`] by decoding all values and checking with [`Verifier`]
    /// if the provided signature is correct
    pub fn decode_with_options(
        self,
        verifier: &impl Verifier,
        options: &JwsVerifyOptions,
    ) -> Result<DecodedJWSFlattened, JoseError> {
        let prepared =
            prepare_signature(self.signature, ReceivedPayload::Embedded(&self.payload), options)?;
        let payload = decode_payload(&self.payload, prepared.b64)?;
        let signature = verified_signature(verifier, &payload, prepared.to_verify)?;

        Ok(DecodedJWSFlattened { payload, signature })
    }
}

#[derive(Debug)]
/// Decoded version of a [`JWSFlattened`]
///
/// Data here has already been verified, so everything
/// here is ready for usage
pub struct DecodedJWSFlattened {
    payload: Vec<u8>,
    signature: DecodedSignature,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// Decode version of a [`JWS`]
///
/// Data here has already been verified, so everything
/// here is ready for usage
pub struct DecodedJWS {
    payload: Vec<u8>,
    signatures: Vec<DecodedSignature>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// Decode version of a [`Signature`]
///
/// Data here has already been verified, so everything
/// here is ready for usage
pub struct DecodedSignature {
    protected: Headers,
    unprotected: Headers,
    signature: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A `Signature` which still needs to be checked
///
/// It included the exact signing input, so this doesn't need to be re-encoded
pub struct ToVerifySignature {
    signed_data: Vec<u8>,
    alg: String,
    decoded_signature: DecodedSignature,
}

impl ToVerifySignature {
    /// Signing input (`protected '.' payload`) as it was received.
    pub fn signed_data(&self) -> &[u8] {
        &self.signed_data
    }

    /// The `alg` header value of this signature
    pub fn alg(&self) -> &str {
        &self.alg
    }

    /// Reference to the [`DecodedSignature`]
    pub fn decoded_signature(&self) -> &DecodedSignature {
        &self.decoded_signature
    }
}

impl DecodedSignature {
    /// Reference to the protected [`Headers`]
    pub fn protected_headers(&self) -> &Headers {
        &self.protected
    }

    /// Trying decoding the protected headers to the provided `T`
    pub fn decode_protected_headers<'de, 'a: 'de, T: Deserialize<'de>>(
        &'a self,
    ) -> Result<T, JoseError> {
        self.protected.decode()
    }

    /// Reference to the unprotected [`Headers`]
    pub fn unprotected_headers(&self) -> &Headers {
        &self.unprotected
    }

    /// Trying decoding the unprotected headers to the provided `T`
    pub fn decode_unprotected_headers<'de, 'a: 'de, T: Deserialize<'de>>(
        &'a self,
    ) -> Result<T, JoseError> {
        self.unprotected.decode()
    }

    /// Raw signature bytes
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }
}

impl DecodedJWS {
    /// Get refence to the [`DecodedSignature`]s
    pub fn signatures(&self) -> &[DecodedSignature] {
        self.signatures.as_slice()
    }

    /// Get refence to the payload
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

impl DecodedJWSFlattened {
    /// Reference to the protected [`Headers`]
    pub fn protected_headers(&self) -> &Headers {
        self.signature.protected_headers()
    }

    /// Trying decoding the protected headers to the provided `T`
    pub fn decode_protected_headers<'de, 'a: 'de, T: Deserialize<'de>>(
        &'a self,
    ) -> Result<T, JoseError> {
        self.signature.decode_protected_headers()
    }

    /// Reference to the unprotected [`Headers`]
    pub fn unprotected_headers(&self) -> &Headers {
        self.signature.unprotected_headers()
    }

    /// Trying decoding the unprotected headers to the provided `T`
    pub fn decode_unprotected_headers<'de, 'a: 'de, T: Deserialize<'de>>(
        &'a self,
    ) -> Result<T, JoseError> {
        self.signature.decode_unprotected_headers()
    }

    /// Raw signature bytes
    pub fn signature(&self) -> &[u8] {
        self.signature.signature()
    }

    /// Get refence to the payload
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Take ownership of the payload
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// [`Verifier`] will be called to confirm if the received data is valid
///
/// For some algorithms all signatures need to be valid, but there are also
/// cases when only one or some need to be valid. A verifier returns the
/// indices of the signatures it accepted, only those are part of the decoded
/// result, and an empty list rejects the JWS. A verifier that needs every
/// signature to be valid returns an error instead.
///
/// Warning: in some cases order of signatures is not always pre-determined,
/// so in those cases make sure that [`Verifier`] can handle this.
pub trait Verifier {
    type Error: Into<BoxError>;
    /// Verify the signatures, returning the indices of the valid ones
    fn verify(
        &self,
        payload: &[u8],
        signatures: &[ToVerifySignature],
    ) -> Result<Vec<usize>, Self::Error>;
}
