//! The `crit` (critical) header parameter, [`rfc7515, section 4.1.11`].
//!
//! A producer lists extension parameters in `crit` which a consumer must
//! understand, or else reject the envelope. What a consumer understands is a
//! [`RecognizedExtensions`] table: extension name to "must be integrity protected".
//!
//! [`rfc7515, section 4.1.11`]: https://datatracker.ietf.org/doc/html/rfc7515#section-4.1.11

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use crate::{Envelope, JoseError};

use super::Headers;

/// Extensions implemented by this crate itself, a caller can not redefine them.
const RESERVED_EXTENSIONS: &[&str] = &["b64"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Table of extension header parameters a consumer understands.
///
/// A caller's table extends the built-in one, so it only names the
/// application's own extensions. Naming a built-in extension such as `b64`
/// is a configuration error.
///
/// ```
/// use rama_jose::{
///     jose::{JWA, JWSBuilder, JwsVerifyOptions, RecognizedExtensions, SigningKey, VerificationKey},
///     key::SecretKey,
/// };
///
/// let key = SecretKey::generate(32).unwrap();
/// let audit = RecognizedExtensions::new().with_extension("http://example.com/audit", true);
///
/// let jws = JWSBuilder::new()
///     .with_payload("audited")
///     .try_with_protected_header("b64", false)
///     .unwrap()
///     .try_with_protected_header("http://example.com/audit", "2026-10-19")
///     .unwrap()
///     .try_with_protected_header("crit", ["b64", "http://example.com/audit"])
///     .unwrap()
///     .with_crit(audit.clone())
///     .build_flattened(&SigningKey::new(JWA::HS256, key.clone()).unwrap())
///     .unwrap();
///
/// // `b64` is still understood next to the application extension
/// let verifier = VerificationKey::new(key);
/// let options = JwsVerifyOptions::new().with_crit(audit);
/// let decoded = jws.clone().decode_with_options(&verifier, &options).unwrap();
/// assert_eq!(decoded.payload(), b"audited");
///
/// let redefined = RecognizedExtensions::jws_default().with_extension("http://example.com/audit", true);
/// let err = jws
///     .decode_with_options(&verifier, &JwsVerifyOptions::new().with_crit(redefined))
///     .unwrap_err();
/// assert!(err.is_configuration());
/// ```
pub struct RecognizedExtensions {
    extensions: BTreeMap<String, bool>,
}

impl RecognizedExtensions {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in table for JWS: `b64` ([`rfc7797`]), which must be protected.
    ///
    /// [`rfc7797`]: https://datatracker.ietf.org/doc/html/rfc7797
    pub fn jws_default() -> Self {
        Self {
            extensions: BTreeMap::from([("b64".to_owned(), true)]),
        }
    }

    /// Built-in table for JWE, which has no extensions.
    pub fn jwe_default() -> Self {
        Self::default()
    }

    #[must_use]
    /// Recognize an extension, optionally requiring it to be integrity protected.
    pub fn with_extension(mut self, name: impl Into<String>, must_be_protected: bool) -> Self {
        self.set_extension(name, must_be_protected);
        self
    }

    /// Recognize an extension, optionally requiring it to be integrity protected.
    pub fn set_extension(
        &mut self,
        name: impl Into<String>,
        must_be_protected: bool,
    ) -> &mut Self {
        self.extensions.insert(name.into(), must_be_protected);
        self
    }

    /// Returns the protection requirement of a recognized extension.
    pub fn get(&self, name: &str) -> Option<bool> {
        self.extensions.get(name).copied()
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        self.extensions.keys().map(String::as_str)
    }
}

/// Validate the `crit` header parameter and return the acknowledged extensions.
///
/// `defaults` is the built-in table for the envelope, `overrides` the caller's.
/// The effective table is the defaults extended by the overrides. Callers
/// branch on the returned names, e.g. `b64` for JWS.
///
/// Fails with a configuration error if `overrides` names a reserved extension,
/// and with [`ErrorKind::InvalidHeader`](crate::ErrorKind::InvalidHeader)
/// for the given `envelope` for anything wrong with the envelope itself.
pub fn validate_crit(
    envelope: Envelope,
    defaults: &RecognizedExtensions,
    overrides: Option<&RecognizedExtensions>,
    protected: &Headers,
    merged: &Map<String, Value>,
) -> Result<BTreeSet<String>, JoseError> {
    if let Some(name) = overrides
        .into_iter()
        .flat_map(RecognizedExtensions::names)
        .find(|name| RESERVED_EXTENSIONS.contains(name))
    {
        return Err(JoseError::configuration(format!(
            "the \"{name}\" extension is built in and can not be redefined"
        )));
    }

    if merged.contains_key("crit") && !protected.contains("crit") {
        return Err(JoseError::invalid_header(
            envelope,
            "\"crit\" (Critical) Header Parameter MUST be integrity protected",
        ));
    }

    let Some(crit) = protected.get("crit") else {
        return Ok(BTreeSet::new());
    };

    let malformed = || {
        JoseError::invalid_header(
            envelope,
            "\"crit\" Header Parameter must be an array of non-empty strings when present",
        )
    };
    let names = crit
        .as_array()
        .filter(|names| !names.is_empty())
        .ok_or_else(malformed)?
        .iter()
        .map(|name| name.as_str().filter(|name| !name.is_empty()).ok_or_else(malformed))
        .collect::<Result<Vec<_>, _>>()?;

    let mut acknowledged = BTreeSet::new();
    for name in names {
        if !acknowledged.insert(name.to_owned()) {
            return Err(JoseError::invalid_header(
                envelope,
                format!("\"crit\" Header Parameter lists \"{name}\" more than once"),
            ));
        }

        let must_be_protected = overrides
            .and_then(|overrides| overrides.get(name))
            .or_else(|| defaults.get(name))
            .ok_or_else(|| {
                JoseError::invalid_header(
                    envelope,
                    format!("Extension Header Parameter \"{name}\" is not recognized"),
                )
            })?;

        if !merged.contains_key(name) {
            return Err(JoseError::invalid_header(
                envelope,
                format!("Extension Header Parameter \"{name}\" is missing"),
            ));
        }

        if must_be_protected && !protected.contains(name) {
            return Err(JoseError::invalid_header(
                envelope,
                format!("Extension Header Parameter \"{name}\" MUST be integrity protected"),
            ));
        }
    }

    tracing::trace!("{envelope} crit acknowledged extensions: {acknowledged:?}");
    Ok(acknowledged)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::{ErrorKind, jose::header::merge};

    fn check(
        protected: Value,
        unprotected: Value,
        overrides: Option<&RecognizedExtensions>,
    ) -> Result<BTreeSet<String>, JoseError> {
        let protected = Headers::new().try_with_headers(protected).unwrap();
        let unprotected = Headers::new().try_with_headers(unprotected).unwrap();
        let merged = merge(&[&protected, &unprotected]);
        validate_crit(
            Envelope::Jws,
            &RecognizedExtensions::jws_default(),
            overrides,
            &protected,
            &merged,
        )
    }

    #[test]
    fn absent_crit_is_a_no_op() {
        let acknowledged = assert_ok!(check(json!({"alg": "HS256"}), json!({}), None));
        assert!(acknowledged.is_empty());
    }

    #[test]
    fn b64_is_acknowledged() {
        let acknowledged = assert_ok!(check(
            json!({"alg": "HS256", "b64": false, "crit": ["b64"]}),
            json!({}),
            None,
        ));
        assert!(acknowledged.contains("b64"));
    }

    #[test]
    fn crit_must_be_protected() {
        let err = assert_err!(check(
            json!({"alg": "HS256", "b64": false}),
            json!({"crit": ["b64"]}),
            None,
        ));
        assert_eq!(err.kind(), ErrorKind::InvalidHeader(Envelope::Jws));
    }

    #[test]
    fn crit_entry_only_in_unprotected_header() {
        // recognized extension which must be protected, but only sent unprotected
        let err = assert_err!(check(
            json!({"alg": "HS256", "crit": ["b64"]}),
            json!({"b64": false}),
            None,
        ));
        assert_eq!(
            err.to_string(),
            "Extension Header Parameter \"b64\" MUST be integrity protected"
        );

        // extension that may be unprotected
        let overrides = RecognizedExtensions::new().with_extension("exp", false);
        let acknowledged = assert_ok!(check(
            json!({"alg": "HS256", "crit": ["exp"]}),
            json!({"exp": 1}),
            Some(&overrides),
        ));
        assert!(acknowledged.contains("exp"));
    }

    #[test]
    fn malformed_crit_values() {
        for crit in [json!([]), json!("b64"), json!([""]), json!([1]), json!(null)] {
            let err = assert_err!(check(
                json!({"alg": "HS256", "b64": false, "crit": crit}),
                json!({}),
                None,
            ));
            assert_eq!(err.kind(), ErrorKind::InvalidHeader(Envelope::Jws));
        }

        let err = assert_err!(check(
            json!({"alg": "HS256", "b64": false, "crit": ["b64", "b64"]}),
            json!({}),
            None,
        ));
        assert_eq!(err.kind(), ErrorKind::InvalidHeader(Envelope::Jws));
    }

    #[test]
    fn unrecognized_and_missing_extensions() {
        let err = assert_err!(check(
            json!({"alg": "HS256", "http://example.invalid/ext": 1, "crit": ["http://example.invalid/ext"]}),
            json!({}),
            None,
        ));
        assert_eq!(
            err.to_string(),
            "Extension Header Parameter \"http://example.invalid/ext\" is not recognized"
        );

        let err = assert_err!(check(
            json!({"alg": "HS256", "crit": ["b64"]}),
            json!({}),
            None,
        ));
        assert_eq!(err.to_string(), "Extension Header Parameter \"b64\" is missing");
    }

    #[test]
    fn overrides_extend_the_defaults() {
        let overrides = RecognizedExtensions::new().with_extension("exp", true);
        let acknowledged = assert_ok!(check(
            json!({"alg": "HS256", "b64": false, "exp": 1, "crit": ["b64", "exp"]}),
            json!({}),
            Some(&overrides),
        ));
        assert_eq!(
            acknowledged,
            BTreeSet::from(["b64".to_owned(), "exp".to_owned()])
        );
    }

    #[test]
    fn redefining_reserved_extension_is_a_configuration_error() {
        let overrides = RecognizedExtensions::new().with_extension("b64", false);
        let err = assert_err!(check(json!({"alg": "HS256"}), json!({}), Some(&overrides)));
        assert!(err.is_configuration());
    }
}
