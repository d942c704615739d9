use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    JoseError,
    jose::{
        ContentEncryptionAlgorithm, Headers, JWEBuilder, JWECompact, JWSBuilder, JWSCompact,
        KeyManagementAlgorithm, Recipient, Signer,
    },
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
/// A JWT Claims Set, [`rfc7519, section 4`].
///
/// Any JSON object is a claims set, the registered claims have typed
/// accessors. Their shape is only checked when validating.
///
/// [`rfc7519, section 4`]: https://datatracker.ietf.org/doc/html/rfc7519#section-4
pub struct JwtClaims(Map<String, Value>);

fn timestamp_value(value: &Value) -> Option<Timestamp> {
    if let Some(seconds) = value.as_i64() {
        return Timestamp::from_second(seconds).ok();
    }
    let duration = SignedDuration::try_from_secs_f64(value.as_f64()?).ok()?;
    Timestamp::from_duration(duration).ok()
}

macro_rules! string_claim {
    ($(#[$doc:meta])* $claim:literal, $get:ident, $with:ident, $set:ident) => {
        $(#[$doc])*
        pub fn $get(&self) -> Option<&str> {
            self.0.get($claim).and_then(Value::as_str)
        }

        #[must_use]
        $(#[$doc])*
        pub fn $with(mut self, value: impl Into<String>) -> Self {
            self.$set(value);
            self
        }

        $(#[$doc])*
        pub fn $set(&mut self, value: impl Into<String>) -> &mut Self {
            self.0.insert($claim.to_owned(), Value::String(value.into()));
            self
        }
    };
}

macro_rules! time_claim {
    ($(#[$doc:meta])* $claim:literal, $get:ident, $with:ident, $set:ident) => {
        $(#[$doc])*
        pub fn $get(&self) -> Option<Timestamp> {
            self.0.get($claim).and_then(timestamp_value)
        }

        #[must_use]
        $(#[$doc])*
        pub fn $with(mut self, value: Timestamp) -> Self {
            self.$set(value);
            self
        }

        $(#[$doc])*
        pub fn $set(&mut self, value: Timestamp) -> &mut Self {
            self.0.insert($claim.to_owned(), Value::from(value.as_second()));
            self
        }
    };
}

impl JwtClaims {
    /// Create an empty claims set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JWS payload or JWE plaintext as a claims set.
    pub fn from_payload(payload: &[u8]) -> Result<Self, JoseError> {
        match serde_json::from_slice(payload) {
            Ok(Value::Object(claims)) => Ok(Self(claims)),
            _ => Err(JoseError::jwt_invalid(
                "JWT Claims Set must be a top-level JSON object",
            )),
        }
    }

    /// Set any claim, registered or not.
    pub fn try_with_claim(
        mut self,
        name: impl Into<String>,
        value: impl Serialize,
    ) -> Result<Self, JoseError> {
        self.try_set_claim(name, value)?;
        Ok(self)
    }

    /// Set any claim, registered or not.
    pub fn try_set_claim(
        &mut self,
        name: impl Into<String>,
        value: impl Serialize,
    ) -> Result<&mut Self, JoseError> {
        let value = serde_json::to_value(value)
            .map_err(|err| JoseError::encoding("claim value is not JSON").with_source(err))?;
        self.0.insert(name.into(), value);
        Ok(self)
    }

    /// Remove a claim, returning its value if it was set.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    /// Get any claim.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Reference to the underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Deserialize the claims set into `T`.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, JoseError> {
        T::deserialize(&self.0)
            .map_err(|err| JoseError::jwt_invalid("JWT Claims Set has an unexpected shape").with_source(err))
    }

    string_claim!(
        /// `iss` (Issuer) claim.
        "iss", issuer, with_issuer, set_issuer
    );

    string_claim!(
        /// `sub` (Subject) claim.
        "sub", subject, with_subject, set_subject
    );

    string_claim!(
        /// `jti` (JWT ID) claim.
        "jti", jwt_id, with_jwt_id, set_jwt_id
    );

    time_claim!(
        /// `exp` (Expiration Time) claim.
        "exp", expiration, with_expiration, set_expiration
    );

    time_claim!(
        /// `nbf` (Not Before) claim.
        "nbf", not_before, with_not_before, set_not_before
    );

    time_claim!(
        /// `iat` (Issued At) claim.
        "iat", issued_at, with_issued_at, set_issued_at
    );

    /// `aud` (Audience) claim, a single string is a one element list.
    pub fn audience(&self) -> Vec<&str> {
        match self.0.get("aud") {
            Some(Value::String(aud)) => vec![aud.as_str()],
            Some(Value::Array(aud)) => aud.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    #[must_use]
    /// Set a single `aud` (Audience).
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.set_audience(audience);
        self
    }

    /// Set a single `aud` (Audience).
    pub fn set_audience(&mut self, audience: impl Into<String>) -> &mut Self {
        self.0.insert("aud".to_owned(), Value::String(audience.into()));
        self
    }

    #[must_use]
    /// Set multiple `aud` (Audience) values.
    pub fn with_audiences<A: Into<String>>(mut self, audiences: impl IntoIterator<Item = A>) -> Self {
        self.set_audiences(audiences);
        self
    }

    /// Set multiple `aud` (Audience) values.
    pub fn set_audiences<A: Into<String>>(
        &mut self,
        audiences: impl IntoIterator<Item = A>,
    ) -> &mut Self {
        let audiences = audiences
            .into_iter()
            .map(|aud| Value::String(aud.into()))
            .collect();
        self.0.insert("aud".to_owned(), Value::Array(audiences));
        self
    }

    /// Sign as a JWS compact serialization with only the signer's headers.
    pub fn sign(&self, signer: &impl Signer) -> Result<JWSCompact, JoseError> {
        self.sign_with_headers(Headers::new(), signer)
    }

    /// Sign as a JWS compact serialization, with extra protected headers such as `typ`.
    pub fn sign_with_headers(
        &self,
        protected: Headers,
        signer: &impl Signer,
    ) -> Result<JWSCompact, JoseError> {
        let payload = serde_json::to_vec(&self.0)
            .map_err(|err| JoseError::encoding("serialize JWT Claims Set").with_source(err))?;
        let mut builder = JWSBuilder::new().with_payload(payload);
        *builder.protected_headers_mut() = protected;
        builder.build_compact(signer)
    }

    /// Encrypt as a JWE compact serialization for a single recipient.
    pub fn encrypt(
        &self,
        alg: KeyManagementAlgorithm,
        enc: ContentEncryptionAlgorithm,
        recipient: &Recipient,
    ) -> Result<JWECompact, JoseError> {
        self.encrypt_with_headers(Headers::new(), alg, enc, recipient)
    }

    /// Encrypt as a JWE compact serialization, with extra protected headers.
    pub fn encrypt_with_headers(
        &self,
        protected: Headers,
        alg: KeyManagementAlgorithm,
        enc: ContentEncryptionAlgorithm,
        recipient: &Recipient,
    ) -> Result<JWECompact, JoseError> {
        let plaintext = serde_json::to_vec(&self.0)
            .map_err(|err| JoseError::encoding("serialize JWT Claims Set").with_source(err))?;
        let mut builder = JWEBuilder::new().with_plaintext(plaintext);
        *builder.protected_headers_mut() = protected;
        builder
            .try_with_protected_header("alg", alg)?
            .try_with_protected_header("enc", enc)?
            .build_compact(recipient)
    }
}

impl From<Map<String, Value>> for JwtClaims {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}
