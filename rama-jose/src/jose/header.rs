use base64::{Engine as _, prelude::BASE64_URL_SAFE_NO_PAD};
use rama_error::{ErrorContext as _, OpaqueError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Envelope, JoseError};

#[derive(Default, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
/// [`Headers`] store protected or unprotected headers and already
/// serializes them to correct JSON values.
///
/// Parameter order is preserved.
pub struct Headers(Option<Map<String, Value>>);

impl Headers {
    /// Create an empty [`Headers`] store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set provided header in the header map
    ///
    /// Warning: this function will replace already existing headers
    pub fn try_with_header(
        mut self,
        name: impl Into<String>,
        value: impl Serialize,
    ) -> Result<Self, JoseError> {
        self.try_set_header(name, value)?;
        Ok(self)
    }

    /// Set provided header in the header map
    ///
    /// Warning: this function will replace already existing headers
    pub fn try_set_header(
        &mut self,
        name: impl Into<String>,
        value: impl Serialize,
    ) -> Result<&mut Self, JoseError> {
        let value = serde_json::to_value(value).context("convert to value")?;
        self.0.get_or_insert_default().insert(name.into(), value);
        Ok(self)
    }

    /// Set provided headers in the header map
    ///
    /// Warning: this function will replace already existing headers
    pub fn try_with_headers(mut self, headers: impl Serialize) -> Result<Self, JoseError> {
        self.try_set_headers(headers)?;
        Ok(self)
    }

    /// Set provided headers in the header map
    ///
    /// Warning: this function will replace already existing headers
    pub fn try_set_headers(&mut self, headers: impl Serialize) -> Result<&mut Self, JoseError> {
        let headers =
            serde_json::to_value(headers).context("convert headers to serde json value")?;

        let mut headers = match headers {
            Value::Object(map) => map,
            _ => Err(OpaqueError::from_display(
                "Can only set multiple headers if input is key value object",
            ))?,
        };

        match &mut self.0 {
            Some(existing_headers) => existing_headers.append(&mut headers),
            None => self.0 = Some(headers),
        };

        Ok(self)
    }

    /// Remove a header, returning its value if it was set.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.as_mut().and_then(|headers| headers.shift_remove(name))
    }

    /// Get the raw value of a header.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.as_ref().and_then(|headers| headers.get(name))
    }

    /// Get a header that must be a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Returns true if the header is present.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate over the header parameter names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().flat_map(|headers| headers.keys().map(String::as_str))
    }

    /// Reference to the underlying map, if any header was set.
    pub fn as_map(&self) -> Option<&Map<String, Value>> {
        self.0.as_ref()
    }

    pub(crate) fn from_map(map: Map<String, Value>) -> Self {
        Self(Some(map))
    }

    /// Encode headers to a base64 url safe representation
    pub(crate) fn as_encoded_string(&self) -> Result<String, JoseError> {
        let encoded = match &self.0 {
            Some(headers) => {
                let headers = serde_json::to_vec(headers).context("convert to bytes")?;
                BASE64_URL_SAFE_NO_PAD.encode(headers)
            }
            None => String::new(),
        };
        Ok(encoded)
    }

    /// Decode a base64url protected header, the empty string decodes to no headers.
    pub(crate) fn from_encoded_str(
        envelope: Envelope,
        encoded: &str,
    ) -> Result<Self, JoseError> {
        if encoded.is_empty() {
            return Ok(Self::default());
        }
        let decoded = BASE64_URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_err| JoseError::invalid_header(envelope, "Protected Header is invalid"))?;
        match serde_json::from_slice::<Value>(&decoded) {
            Ok(Value::Object(map)) => Ok(Self::from_map(map)),
            _ => Err(JoseError::invalid_header(
                envelope,
                "Protected Header must be an object",
            )),
        }
    }

    pub(crate) fn is_none(&self) -> bool {
        self.0.is_none()
    }

    pub(crate) fn is_some(&self) -> bool {
        self.0.is_some()
    }

    /// Try decode headers to the provided `T`
    pub fn decode<'de, 'a: 'de, T>(&'a self) -> Result<T, JoseError>
    where
        T: Deserialize<'de>,
    {
        match &self.0 {
            Some(headers) => Ok(T::deserialize(headers).context("deserialize headers into T")?),
            None => Err(OpaqueError::from_display(
                "headers are None, deserialize not supported",
            ))?,
        }
    }
}

/// Check that no parameter name appears in more than one header set.
///
/// Sets are named for the error message, e.g. `("Protected", &protected)`.
pub(crate) fn ensure_disjoint(
    envelope: Envelope,
    sets: &[(&str, &Headers)],
) -> Result<(), JoseError> {
    for (index, (name, headers)) in sets.iter().enumerate() {
        for (other_name, other) in sets.iter().skip(index + 1) {
            if let Some(duplicate) = headers.names().find(|parameter| other.contains(parameter)) {
                tracing::debug!(
                    "{envelope} header parameter {duplicate} present in both {name} and {other_name} header"
                );
                return Err(JoseError::invalid_header(
                    envelope,
                    format!(
                        "{envelope} {name} and {envelope} {other_name} Header Parameter names must be disjoint"
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Union of all header sets. Callers check disjointness first.
pub(crate) fn merge(sets: &[&Headers]) -> Map<String, Value> {
    let mut merged = Map::new();
    for headers in sets {
        if let Some(map) = headers.as_map() {
            merged.extend(map.iter().map(|(name, value)| (name.clone(), value.clone())));
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ErrorKind;

    #[test]
    fn overlapping_sets_are_rejected() {
        let protected = Headers::new().try_with_header("alg", "A128KW").unwrap();
        let shared = Headers::new().try_with_header("enc", "A128GCM").unwrap();
        let recipient = Headers::new().try_with_header("alg", "A256KW").unwrap();

        let err = ensure_disjoint(
            Envelope::Jwe,
            &[
                ("Protected", &protected),
                ("Shared Unprotected", &shared),
                ("Per-Recipient", &recipient),
            ],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidHeader(Envelope::Jwe));
        assert_eq!(
            err.to_string(),
            "JWE Protected and JWE Per-Recipient Header Parameter names must be disjoint"
        );

        ensure_disjoint(
            Envelope::Jwe,
            &[("Protected", &protected), ("Shared Unprotected", &shared)],
        )
        .unwrap();
    }

    #[test]
    fn merge_preserves_insertion_order() {
        let protected = Headers::new()
            .try_with_headers(json!({"typ": "JWT", "alg": "HS256"}))
            .unwrap();
        let unprotected = Headers::new().try_with_header("kid", "k1").unwrap();
        let merged = merge(&[&protected, &Headers::new(), &unprotected]);
        assert_eq!(
            merged.keys().collect::<Vec<_>>(),
            vec!["typ", "alg", "kid"]
        );
    }

    #[test]
    fn encoded_protected_header_round_trip() {
        let headers = Headers::new().try_with_header("alg", "ES256").unwrap();
        let encoded = headers.as_encoded_string().unwrap();
        assert_eq!(encoded, "eyJhbGciOiJFUzI1NiJ9");
        assert_eq!(Headers::from_encoded_str(Envelope::Jws, &encoded).unwrap(), headers);

        let err = Headers::from_encoded_str(Envelope::Jws, "WzFd").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidHeader(Envelope::Jws));
    }
}
