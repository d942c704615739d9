//! Error types for the JOSE engine.
//!
//! Every failure surfaced by this crate is a [`JoseError`], classified by an
//! [`ErrorKind`]. Callers that need to branch on the failure should match on
//! [`JoseError::kind`] rather than on the message, with the exception of
//! [`ErrorKind::ClaimInvalid`], whose messages are stable.

use std::{borrow::Cow, fmt};

use rama_error::{BoxError, OpaqueError};

/// The envelope a header or structure error was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Envelope {
    /// JSON Web Signature
    Jws,
    /// JSON Web Encryption
    Jwe,
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jws => f.write_str("JWS"),
            Self::Jwe => f.write_str("JWE"),
        }
    }
}

/// Classification of a [`JoseError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed DER/BER input, or an OID that is not part of the known table.
    InvalidAsn1,
    /// Unknown or unsupported `alg` / `enc` value, or an unsupported key algorithm.
    UnsupportedAlgorithm,
    /// The key curve cannot be used with the requested algorithm.
    UnsupportedCurve,
    /// Header set overlap, `crit` protocol violation or otherwise malformed envelope.
    InvalidHeader(Envelope),
    /// Key material that does not suit the requested algorithm.
    InvalidKey,
    /// Any failure while decrypting, intentionally without detail.
    DecryptionFailed,
    /// JWS signature verification failed.
    SignatureInvalid,
    /// The JWT payload is not a JSON claims set.
    JwtInvalid,
    /// A registered claim has the wrong shape, or the claims set fails the policy.
    ClaimInvalid,
    /// The caller provided conflicting or invalid options.
    Configuration,
    /// Base64url, JSON or PEM text could not be processed.
    Encoding,
}

/// Error returned by all fallible operations of this crate.
pub struct JoseError {
    kind: ErrorKind,
    message: Cow<'static, str>,
    claim: Option<Cow<'static, str>>,
    source: Option<BoxError>,
}

const DECRYPTION_FAILED_MESSAGE: &str = "decryption operation failed";

impl JoseError {
    /// Create a new [`JoseError`] of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            message: message.into(),
            claim: None,
            source: None,
        }
    }

    pub(crate) fn invalid_asn1(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::InvalidAsn1, message)
    }

    pub(crate) fn unsupported_algorithm(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::UnsupportedAlgorithm, message)
    }

    pub(crate) fn unsupported_curve(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::UnsupportedCurve, message)
    }

    pub(crate) fn invalid_header(
        envelope: Envelope,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::new(ErrorKind::InvalidHeader(envelope), message)
    }

    pub(crate) fn invalid_key(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::InvalidKey, message)
    }

    /// The one and only shape a decrypt-direction failure takes.
    ///
    /// It never carries a source or a specific message.
    pub(crate) fn decryption_failed() -> Self {
        Self::new(ErrorKind::DecryptionFailed, DECRYPTION_FAILED_MESSAGE)
    }

    pub(crate) fn signature_invalid() -> Self {
        Self::new(ErrorKind::SignatureInvalid, "signature verification failed")
    }

    pub(crate) fn jwt_invalid(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::JwtInvalid, message)
    }

    pub(crate) fn claim_invalid(
        claim: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            claim: Some(claim.into()),
            ..Self::new(ErrorKind::ClaimInvalid, message)
        }
    }

    pub(crate) fn configuration(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub(crate) fn encoding(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Encoding, message)
    }

    /// Attach the underlying cause to this error.
    ///
    /// Ignored for [`ErrorKind::DecryptionFailed`], which never exposes a cause.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        if self.kind != ErrorKind::DecryptionFailed {
            self.source = Some(source.into());
        }
        self
    }

    /// The [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human readable message of this error.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The claim that failed validation, only set for [`ErrorKind::ClaimInvalid`].
    pub fn claim(&self) -> Option<&str> {
        self.claim.as_deref()
    }

    /// Returns true if this is a configuration error rather than a token error.
    pub fn is_configuration(&self) -> bool {
        self.kind == ErrorKind::Configuration
    }
}

impl fmt::Debug for JoseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("JoseError");
        d.field("kind", &self.kind).field("message", &self.message);
        if let Some(claim) = &self.claim {
            d.field("claim", claim);
        }
        if let Some(source) = &self.source {
            d.field("source", source);
        }
        d.finish()
    }
}

impl fmt::Display for JoseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for JoseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

impl From<OpaqueError> for JoseError {
    fn from(err: OpaqueError) -> Self {
        let message = err.to_string();
        Self::encoding(message).with_source(err)
    }
}
