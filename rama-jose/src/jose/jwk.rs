use aws_lc_rs::digest::Digest;
use base64::{Engine as _, prelude::BASE64_URL_SAFE_NO_PAD};
use rama_error::ErrorContext as _;
use serde::{Deserialize, Serialize, Serializer, ser::SerializeStruct};
use zeroize::Zeroizing;

use crate::{
    JoseError,
    der::RsaPrivateComponents,
    primitives,
    key::{
        EcPrivateKey, EcPublicKey, EllipticCurve, JoseKey, PrivateKey, PublicKey, RsaPrivateKey,
        RsaPublicKey, SecretKey,
    },
};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
/// [`JWK`] or JSON Web Key as defined in [`rfc7517`]
///
/// [`rfc7517`]: https://datatracker.ietf.org/doc/html/rfc7517
pub struct JWK {
    /// Intended algorithm to be used with this key
    #[serde(skip_serializing_if = "Option::is_none")]
    alg: Option<String>,
    #[serde(flatten)]
    key_type: JWKType,
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    r#use: Option<JWKUse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_ops: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    x5c: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    x5t: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "x5t#S256")]
    x5t_sha256: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "kty")]
/// The "kty" (key type) parameter identifies the cryptographic algorithm family used with the key, such as "RSA", "EC", "OKP" or "oct"
///
/// All members are base64url encoded. Private members are optional.
pub enum JWKType {
    RSA {
        n: String,
        e: String,
        d: Option<String>,
        p: Option<String>,
        q: Option<String>,
        dp: Option<String>,
        dq: Option<String>,
        qi: Option<String>,
    },
    /// Elliptic curve (NIST curves)
    EC {
        crv: EllipticCurve,
        x: String,
        y: String,
        d: Option<String>,
    },
    /// Octet key pair, [`rfc8037`]
    ///
    /// [`rfc8037`]: https://datatracker.ietf.org/doc/html/rfc8037
    OKP {
        crv: EllipticCurve,
        x: String,
        d: Option<String>,
    },
    /// an octet sequence key, which represents a symmetric key
    #[serde(rename = "oct")]
    OCT { k: String },
}

impl Serialize for JWKType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // members in lexicographic order, the way they appear in a thumbprint
        match &self {
            Self::EC { crv, x, y, d } => {
                let mut state = serializer.serialize_struct("JWKType", 5)?;
                state.serialize_field("crv", crv)?;
                if let Some(d) = d {
                    state.serialize_field("d", d)?;
                }
                state.serialize_field("kty", "EC")?;
                state.serialize_field("x", x)?;
                state.serialize_field("y", y)?;
                state.end()
            }
            Self::OKP { crv, x, d } => {
                let mut state = serializer.serialize_struct("JWKType", 4)?;
                state.serialize_field("crv", crv)?;
                if let Some(d) = d {
                    state.serialize_field("d", d)?;
                }
                state.serialize_field("kty", "OKP")?;
                state.serialize_field("x", x)?;
                state.end()
            }
            Self::RSA {
                n,
                e,
                d,
                p,
                q,
                dp,
                dq,
                qi,
            } => {
                let mut state = serializer.serialize_struct("JWKType", 9)?;
                if let Some(d) = d {
                    state.serialize_field("d", d)?;
                }
                if let Some(dp) = dp {
                    state.serialize_field("dp", dp)?;
                }
                if let Some(dq) = dq {
                    state.serialize_field("dq", dq)?;
                }
                state.serialize_field("e", e)?;
                state.serialize_field("kty", "RSA")?;
                state.serialize_field("n", n)?;
                if let Some(p) = p {
                    state.serialize_field("p", p)?;
                }
                if let Some(q) = q {
                    state.serialize_field("q", q)?;
                }
                if let Some(qi) = qi {
                    state.serialize_field("qi", qi)?;
                }
                state.end()
            }
            Self::OCT { k } => {
                let mut state = serializer.serialize_struct("JWKType", 2)?;
                state.serialize_field("k", k)?;
                state.serialize_field("kty", "oct")?;
                state.end()
            }
        }
    }
}

/// Required members only, [`rfc7638, section 3.2`]
///
/// [`rfc7638, section 3.2`]: https://datatracker.ietf.org/doc/html/rfc7638#section-3.2
struct ThumbprintMembers<'a>(&'a JWKType);

impl Serialize for ThumbprintMembers<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.0 {
            JWKType::EC { crv, x, y, .. } => JWKType::EC {
                crv: *crv,
                x: x.clone(),
                y: y.clone(),
                d: None,
            }
            .serialize(serializer),
            JWKType::OKP { crv, x, .. } => JWKType::OKP {
                crv: *crv,
                x: x.clone(),
                d: None,
            }
            .serialize(serializer),
            JWKType::RSA { n, e, .. } => JWKType::RSA {
                n: n.clone(),
                e: e.clone(),
                d: None,
                p: None,
                q: None,
                dp: None,
                dq: None,
                qi: None,
            }
            .serialize(serializer),
            JWKType::OCT { .. } => self.0.serialize(serializer),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
/// [`JWKUse`] identifies the intended use of the public key
pub enum JWKUse {
    #[serde(rename = "sig")]
    Signature,
    #[serde(rename = "enc")]
    Encryption,
}

fn encode(bytes: &[u8]) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

fn decode(member: &'static str, value: &str) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(value)
        .with_context(|| format!("decode JWK member \"{member}\""))?;
    Ok(Zeroizing::new(bytes))
}

impl JWK {
    fn new(key_type: JWKType) -> Self {
        Self {
            alg: None,
            key_type,
            kid: None,
            r#use: None,
            key_ops: None,
            x5c: None,
            x5t: None,
            x5t_sha256: None,
        }
    }

    /// Create a [`JWK`] for a public key.
    pub fn from_public_key(key: &PublicKey) -> Result<Self, JoseError> {
        let key_type = match key {
            PublicKey::Rsa(key) => {
                let (n, e) = key.components()?;
                JWKType::RSA {
                    n: encode(n),
                    e: encode(e),
                    d: None,
                    p: None,
                    q: None,
                    dp: None,
                    dq: None,
                    qi: None,
                }
            }
            PublicKey::Ec(key) => ec_key_type(key, None),
        };
        Ok(Self::new(key_type))
    }

    /// Create a [`JWK`] for a private key, including its private members.
    pub fn from_private_key(key: &PrivateKey) -> Result<Self, JoseError> {
        let key_type = match key {
            PrivateKey::Rsa(key) => {
                let c = key.components()?;
                JWKType::RSA {
                    n: encode(c.n),
                    e: encode(c.e),
                    d: Some(encode(c.d)),
                    p: Some(encode(c.p)),
                    q: Some(encode(c.q)),
                    dp: Some(encode(c.dp)),
                    dq: Some(encode(c.dq)),
                    qi: Some(encode(c.qi)),
                }
            }
            PrivateKey::Ec(key) => ec_key_type(key.public_key(), Some(encode(key.d()))),
        };
        Ok(Self::new(key_type))
    }

    /// Create a [`JWK`] for a symmetric key.
    pub fn from_secret_key(key: &SecretKey) -> Self {
        Self::new(JWKType::OCT {
            k: encode(key.as_bytes()),
        })
    }

    /// Create a [`JWK`] for any [`JoseKey`].
    pub fn from_key(key: &JoseKey) -> Result<Self, JoseError> {
        match key {
            JoseKey::Secret(key) => Ok(Self::from_secret_key(key)),
            JoseKey::Public(key) => Self::from_public_key(key),
            JoseKey::Private(key) => Self::from_private_key(key),
        }
    }

    /// Import this [`JWK`] as an engine key.
    ///
    /// Keys with private members import as [`JoseKey::Private`].
    pub fn to_key(&self) -> Result<JoseKey, JoseError> {
        match &self.key_type {
            JWKType::OCT { k } => Ok(JoseKey::Secret(SecretKey::new(decode("k", k)?.to_vec()))),
            JWKType::EC { crv, x, y, d } => {
                if crv.is_okp() {
                    return Err(JoseError::invalid_key(format!(
                        "\"crv\" {crv} is not valid for \"kty\" EC"
                    )));
                }
                let public =
                    EcPublicKey::from_coordinates(*crv, &decode("x", x)?, Some(&decode("y", y)?))?;
                ec_key(public, d.as_deref())
            }
            JWKType::OKP { crv, x, d } => {
                if !crv.is_okp() {
                    return Err(JoseError::invalid_key(format!(
                        "\"crv\" {crv} is not valid for \"kty\" OKP"
                    )));
                }
                let public = EcPublicKey::from_coordinates(*crv, &decode("x", x)?, None)?;
                ec_key(public, d.as_deref())
            }
            JWKType::RSA {
                n,
                e,
                d,
                p,
                q,
                dp,
                dq,
                qi,
            } => {
                let n = decode("n", n)?;
                let e = decode("e", e)?;
                let Some(d) = d else {
                    return Ok(JoseKey::from(RsaPublicKey::from_components(&n, &e)?));
                };
                let crt = |member: &'static str, value: &Option<String>| {
                    value.as_deref().map(|value| decode(member, value)).ok_or_else(|| {
                        JoseError::invalid_key(
                            "RSA JWK private keys without CRT parameters are not supported",
                        )
                    })?
                };
                let d = decode("d", d)?;
                let (p, q) = (crt("p", p)?, crt("q", q)?);
                let (dp, dq, qi) = (crt("dp", dp)?, crt("dq", dq)?, crt("qi", qi)?);
                let key = RsaPrivateKey::from_components(&RsaPrivateComponents {
                    n: &n,
                    e: &e,
                    d: &d,
                    p: &p,
                    q: &q,
                    dp: &dp,
                    dq: &dq,
                    qi: &qi,
                })?;
                Ok(JoseKey::from(key))
            }
        }
    }

    /// Import the public half of this [`JWK`].
    pub fn to_public_key(&self) -> Result<PublicKey, JoseError> {
        match self.to_key()? {
            JoseKey::Public(key) => Ok(key),
            JoseKey::Private(key) => Ok(key.public_key()),
            JoseKey::Secret(_) => Err(JoseError::invalid_key(
                "Symmetric key cannot be converted to public key",
            )),
        }
    }

    /// A copy of this [`JWK`] without any private members.
    pub fn to_public_jwk(&self) -> Result<Self, JoseError> {
        let key_type = match &self.key_type {
            JWKType::OCT { .. } => {
                return Err(JoseError::invalid_key(
                    "Symmetric key cannot be converted to public key",
                ));
            }
            JWKType::EC { crv, x, y, .. } => JWKType::EC {
                crv: *crv,
                x: x.clone(),
                y: y.clone(),
                d: None,
            },
            JWKType::OKP { crv, x, .. } => JWKType::OKP {
                crv: *crv,
                x: x.clone(),
                d: None,
            },
            JWKType::RSA { n, e, .. } => JWKType::RSA {
                n: n.clone(),
                e: e.clone(),
                d: None,
                p: None,
                q: None,
                dp: None,
                dq: None,
                qi: None,
            },
        };
        Ok(Self {
            key_type,
            ..self.clone()
        })
    }

    /// Returns true if this key carries private (or symmetric) material.
    pub fn is_private(&self) -> bool {
        match &self.key_type {
            JWKType::RSA { d, .. } | JWKType::EC { d, .. } | JWKType::OKP { d, .. } => {
                d.is_some()
            }
            JWKType::OCT { .. } => true,
        }
    }

    /// [`JWKThumb`] as defined in [`rfc7638`] is url safe identifier for a [`JWK`]
    ///
    /// Only the required members take part, private members never do.
    ///
    /// [`rfc7638`]: https://datatracker.ietf.org/doc/html/rfc7638
    pub fn thumb_sha256(&self) -> Result<Digest, JoseError> {
        let members = serde_json::to_vec(&ThumbprintMembers(&self.key_type))
            .context("failed to serialise JWK")?;
        Ok(primitives::sha256(&members))
    }

    /// Base64url encoded [`Self::thumb_sha256`].
    pub fn thumbprint(&self) -> Result<String, JoseError> {
        Ok(encode(self.thumb_sha256()?.as_ref()))
    }

    /// Key type and key members.
    pub fn key_type(&self) -> &JWKType {
        &self.key_type
    }

    /// Intended algorithm of this key, if any.
    pub fn alg(&self) -> Option<&str> {
        self.alg.as_deref()
    }

    /// Key identifier, if any.
    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    /// Intended use of this key, if any.
    pub fn r#use(&self) -> Option<JWKUse> {
        self.r#use
    }

    #[must_use]
    /// Set the intended algorithm of this key.
    pub fn with_alg(mut self, alg: impl Into<String>) -> Self {
        self.set_alg(alg);
        self
    }

    /// Set the intended algorithm of this key.
    pub fn set_alg(&mut self, alg: impl Into<String>) -> &mut Self {
        self.alg = Some(alg.into());
        self
    }

    #[must_use]
    /// Set the key identifier.
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.set_kid(kid);
        self
    }

    /// Set the key identifier.
    pub fn set_kid(&mut self, kid: impl Into<String>) -> &mut Self {
        self.kid = Some(kid.into());
        self
    }

    #[must_use]
    /// Set the intended use of this key.
    pub fn with_use(mut self, r#use: JWKUse) -> Self {
        self.set_use(r#use);
        self
    }

    /// Set the intended use of this key.
    pub fn set_use(&mut self, r#use: JWKUse) -> &mut Self {
        self.r#use = Some(r#use);
        self
    }
}

fn ec_key_type(key: &EcPublicKey, d: Option<String>) -> JWKType {
    let curve = key.curve();
    match key.coordinates() {
        (x, Some(y)) => JWKType::EC {
            crv: curve,
            x: encode(x),
            y: encode(y),
            d,
        },
        (x, None) => JWKType::OKP {
            crv: curve,
            x: encode(x),
            d,
        },
    }
}

fn ec_key(public: EcPublicKey, d: Option<&str>) -> Result<JoseKey, JoseError> {
    match d {
        Some(d) => {
            let d = decode("d", d)?;
            Ok(JoseKey::from(EcPrivateKey::with_public_key(d.as_slice(), public)?))
        }
        None => Ok(JoseKey::from(public)),
    }
}
