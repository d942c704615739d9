//! Key material understood by the engine.
//!
//! Public keys travel as `SubjectPublicKeyInfo`, private RSA keys as `PKCS#8`,
//! EC/OKP keys as their raw curve representation, and symmetric keys as bytes.
//! PEM text is handled by [`import_spki`], [`import_pkcs8`], [`import_x509`],
//! [`export_spki`] and [`export_pkcs8`]; JWK by [`crate::jose::JWK`].

use std::fmt;

use rustls_pki_types::{PrivatePkcs8KeyDer, SubjectPublicKeyInfoDer};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{
    JoseError,
    der::{self, KeyAlgorithm, RsaPrivateComponents},
    primitives,
};

mod pem;
pub use pem::{export_pkcs8, export_spki, import_pkcs8, import_spki, import_x509};

/// Smallest RSA modulus accepted for any operation.
pub const MIN_RSA_MODULUS_BITS: usize = 2048;

/// Symmetric key, used for `dir`, AES key wrap, AES-GCM key wrap, PBES2 and HMAC.
///
/// The bytes are wiped on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(Zeroizing<Vec<u8>>);

impl SecretKey {
    /// Create a new [`SecretKey`] from raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(bytes.into()))
    }

    /// Generate a random key of `len` bytes.
    pub fn generate(len: usize) -> Result<Self, JoseError> {
        Ok(Self(primitives::random_bytes(len)?))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length of the key in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the key has no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("len", &self.0.len())
            .finish_non_exhaustive()
    }
}

impl From<&[u8]> for SecretKey {
    fn from(value: &[u8]) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecretKey {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
/// Curves supported for EC (`kty: EC`) and OKP (`kty: OKP`) keys.
pub enum EllipticCurve {
    #[serde(rename = "P-256")]
    P256,
    #[serde(rename = "P-384")]
    P384,
    #[serde(rename = "P-521")]
    P521,
    #[serde(rename = "X25519")]
    X25519,
    #[serde(rename = "Ed25519")]
    Ed25519,
}

impl EllipticCurve {
    /// JOSE name of the curve (`crv`).
    pub fn name(self) -> &'static str {
        match self {
            Self::P256 => "P-256",
            Self::P384 => "P-384",
            Self::P521 => "P-521",
            Self::X25519 => "X25519",
            Self::Ed25519 => "Ed25519",
        }
    }

    /// Returns true if keys on this curve can be used for ECDH-ES.
    pub fn is_agreement_capable(self) -> bool {
        !matches!(self, Self::Ed25519)
    }

    /// Returns true for the octet key pair curves (`kty: OKP`).
    pub fn is_okp(self) -> bool {
        matches!(self, Self::X25519 | Self::Ed25519)
    }

    /// Byte length of the private scalar (or seed).
    pub fn scalar_len(self) -> usize {
        match self {
            Self::P256 | Self::X25519 | Self::Ed25519 => 32,
            Self::P384 => 48,
            Self::P521 => 66,
        }
    }

    /// Byte length of the encoded public key.
    pub fn public_key_len(self) -> usize {
        match self {
            Self::X25519 | Self::Ed25519 => 32,
            // 0x04 || x || y
            Self::P256 | Self::P384 | Self::P521 => 1 + 2 * self.scalar_len(),
        }
    }

    pub(crate) fn key_algorithm(self) -> KeyAlgorithm {
        match self {
            Self::P256 => KeyAlgorithm::P256,
            Self::P384 => KeyAlgorithm::P384,
            Self::P521 => KeyAlgorithm::P521,
            Self::X25519 => KeyAlgorithm::X25519,
            Self::Ed25519 => KeyAlgorithm::Ed25519,
        }
    }

    pub(crate) fn from_key_algorithm(algorithm: KeyAlgorithm) -> Option<Self> {
        match algorithm {
            KeyAlgorithm::P256 => Some(Self::P256),
            KeyAlgorithm::P384 => Some(Self::P384),
            KeyAlgorithm::P521 => Some(Self::P521),
            KeyAlgorithm::X25519 => Some(Self::X25519),
            KeyAlgorithm::Ed25519 => Some(Self::Ed25519),
            KeyAlgorithm::Rsa => None,
        }
    }
}

impl fmt::Display for EllipticCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// RSA public key, stored as `SubjectPublicKeyInfo`.
pub struct RsaPublicKey {
    spki: SubjectPublicKeyInfoDer<'static>,
    modulus_bits: usize,
}

impl RsaPublicKey {
    /// Create a [`RsaPublicKey`] from a DER encoded `SubjectPublicKeyInfo`.
    pub fn from_spki(spki: &[u8]) -> Result<Self, JoseError> {
        let parsed = der::parse_spki(spki)?;
        if parsed.algorithm != KeyAlgorithm::Rsa {
            return Err(JoseError::invalid_key("SubjectPublicKeyInfo is not an RSA key"));
        }
        let (n, _) = der::parse_rsa_public_key(parsed.public_key)?;
        let modulus_bits = modulus_bits(n);
        if modulus_bits < MIN_RSA_MODULUS_BITS {
            return Err(JoseError::invalid_key(format!(
                "RSA keys must be at least {MIN_RSA_MODULUS_BITS} bits, got {modulus_bits}"
            )));
        }

        Ok(Self {
            spki: SubjectPublicKeyInfoDer::from(spki.to_vec()),
            modulus_bits,
        })
    }

    /// Create a [`RsaPublicKey`] from its big-endian modulus and exponent.
    pub fn from_components(n: &[u8], e: &[u8]) -> Result<Self, JoseError> {
        let spki = der::encode_spki(KeyAlgorithm::Rsa, &der::encode_rsa_public_key(n, e));
        Self::from_spki(&spki)
    }

    /// DER encoded `SubjectPublicKeyInfo`.
    pub fn spki(&self) -> &SubjectPublicKeyInfoDer<'static> {
        &self.spki
    }

    /// PKCS#1 `RSAPublicKey` contained in the `SubjectPublicKeyInfo`.
    pub(crate) fn rsa_public_key(&self) -> Result<&[u8], JoseError> {
        Ok(der::parse_spki(self.spki.as_ref())?.public_key)
    }

    /// Big-endian modulus and exponent.
    pub fn components(&self) -> Result<(&[u8], &[u8]), JoseError> {
        der::parse_rsa_public_key(self.rsa_public_key()?)
    }

    /// Size of the modulus in bits.
    pub fn modulus_bits(&self) -> usize {
        self.modulus_bits
    }
}

fn modulus_bits(n: &[u8]) -> usize {
    let skip = n.iter().take_while(|b| **b == 0).count();
    match n.get(skip) {
        Some(first) => (n.len() - skip - 1) * 8 + (8 - first.leading_zeros() as usize),
        None => 0,
    }
}

/// RSA private key, stored as `PKCS#8`.
#[derive(Clone)]
pub struct RsaPrivateKey {
    pkcs8: Zeroizing<Vec<u8>>,
    public: RsaPublicKey,
}

impl RsaPrivateKey {
    /// Create a [`RsaPrivateKey`] from a DER encoded `PKCS#8` document.
    pub fn from_pkcs8(pkcs8: &[u8]) -> Result<Self, JoseError> {
        let parsed = der::parse_pkcs8(pkcs8)?;
        if parsed.algorithm != KeyAlgorithm::Rsa {
            return Err(JoseError::invalid_key("PKCS#8 document is not an RSA key"));
        }
        let components = der::parse_rsa_private_key(parsed.private_key)?;
        let public = RsaPublicKey::from_components(components.n, components.e)?;

        Ok(Self {
            pkcs8: Zeroizing::new(pkcs8.to_vec()),
            public,
        })
    }

    /// Create a [`RsaPrivateKey`] from its big-endian components.
    pub fn from_components(components: &RsaPrivateComponents<'_>) -> Result<Self, JoseError> {
        let inner = Zeroizing::new(der::encode_rsa_private_key(components));
        let pkcs8 = Zeroizing::new(der::encode_pkcs8(KeyAlgorithm::Rsa, &inner));
        Self::from_pkcs8(&pkcs8)
    }

    /// DER encoded `PKCS#8` document.
    pub fn pkcs8(&self) -> PrivatePkcs8KeyDer<'_> {
        PrivatePkcs8KeyDer::from(self.pkcs8.as_slice())
    }

    /// Big-endian private components.
    pub fn components(&self) -> Result<RsaPrivateComponents<'_>, JoseError> {
        let parsed = der::parse_pkcs8(&self.pkcs8)?;
        der::parse_rsa_private_key(parsed.private_key)
    }

    /// The public half of this key.
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }
}

impl fmt::Debug for RsaPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaPrivateKey")
            .field("modulus_bits", &self.public.modulus_bits)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public key on one of the [`EllipticCurve`]s.
///
/// For the NIST curves the key is the uncompressed point `0x04 || x || y`,
/// for X25519 and Ed25519 it is the raw 32 byte `x`.
pub struct EcPublicKey {
    curve: EllipticCurve,
    point: Vec<u8>,
}

impl EcPublicKey {
    /// Create a new [`EcPublicKey`] after checking the encoding length.
    pub fn new(curve: EllipticCurve, point: impl Into<Vec<u8>>) -> Result<Self, JoseError> {
        let point = point.into();
        let valid = point.len() == curve.public_key_len()
            && (curve.is_okp() || point.first() == Some(&0x04));
        if !valid {
            return Err(JoseError::invalid_key(format!(
                "invalid public key encoding for curve {curve}"
            )));
        }
        Ok(Self { curve, point })
    }

    /// Create an [`EcPublicKey`] from its JWK coordinates.
    pub fn from_coordinates(
        curve: EllipticCurve,
        x: &[u8],
        y: Option<&[u8]>,
    ) -> Result<Self, JoseError> {
        match (curve.is_okp(), y) {
            (true, None) => Self::new(curve, x),
            (false, Some(y)) => {
                let mut point = Vec::with_capacity(1 + x.len() + y.len());
                point.push(0x04);
                point.extend_from_slice(x);
                point.extend_from_slice(y);
                Self::new(curve, point)
            }
            (true, Some(_)) => Err(JoseError::invalid_key(format!(
                "{curve} keys do not have a y coordinate"
            ))),
            (false, None) => Err(JoseError::invalid_key(format!(
                "{curve} keys require a y coordinate"
            ))),
        }
    }

    /// Create an [`EcPublicKey`] from a DER encoded `SubjectPublicKeyInfo`.
    pub fn from_spki(spki: &[u8]) -> Result<Self, JoseError> {
        let parsed = der::parse_spki(spki)?;
        let curve = EllipticCurve::from_key_algorithm(parsed.algorithm)
            .ok_or_else(|| JoseError::invalid_key("SubjectPublicKeyInfo is not an EC key"))?;
        Self::new(curve, parsed.public_key)
    }

    /// Encode this key as `SubjectPublicKeyInfo`.
    pub fn to_spki(&self) -> SubjectPublicKeyInfoDer<'static> {
        SubjectPublicKeyInfoDer::from(der::encode_spki(self.curve.key_algorithm(), &self.point))
    }

    /// Curve of this key.
    pub fn curve(&self) -> EllipticCurve {
        self.curve
    }

    /// Encoded public key.
    pub fn point(&self) -> &[u8] {
        &self.point
    }

    /// JWK `x` and (for the NIST curves) `y` coordinates.
    pub fn coordinates(&self) -> (&[u8], Option<&[u8]>) {
        match self.point.split_first() {
            Some((_, xy)) if !self.curve.is_okp() => {
                let (x, y) = xy.split_at(xy.len() / 2);
                (x, Some(y))
            }
            _ => (&self.point, None),
        }
    }
}

/// Private key on one of the [`EllipticCurve`]s, with its public half.
#[derive(Clone)]
pub struct EcPrivateKey {
    d: Zeroizing<Vec<u8>>,
    public: EcPublicKey,
}

impl EcPrivateKey {
    /// Create a new [`EcPrivateKey`] from its scalar (or seed for OKP curves).
    ///
    /// The public key is computed by the crypto provider.
    pub fn new(curve: EllipticCurve, d: impl Into<Vec<u8>>) -> Result<Self, JoseError> {
        let d = Zeroizing::new(d.into());
        if d.len() != curve.scalar_len() {
            return Err(JoseError::invalid_key(format!(
                "invalid private key length for curve {curve}"
            )));
        }
        let public = EcPublicKey::new(curve, primitives::public_from_private(curve, &d)?)?;
        Ok(Self { d, public })
    }

    /// Create a new [`EcPrivateKey`] and check it matches the given public key.
    pub fn with_public_key(d: impl Into<Vec<u8>>, public: EcPublicKey) -> Result<Self, JoseError> {
        let key = Self::new(public.curve, d)?;
        if key.public != public {
            return Err(JoseError::invalid_key(
                "private key does not match its public key",
            ));
        }
        Ok(key)
    }

    /// Generate a new random key on the given curve.
    pub fn generate(curve: EllipticCurve) -> Result<Self, JoseError> {
        // an out of range scalar is rejected by the provider, try again
        let mut attempts = 0;
        loop {
            let mut d = primitives::random_bytes(curve.scalar_len())?;
            if curve == EllipticCurve::P521
                && let Some(first) = d.first_mut()
            {
                *first &= 0x01;
            }
            match Self::new(curve, d.as_slice()) {
                Ok(key) => return Ok(key),
                Err(err) if attempts >= 8 => return Err(err),
                Err(_) => attempts += 1,
            }
        }
    }

    /// Create an [`EcPrivateKey`] from a DER encoded `PKCS#8` document.
    pub fn from_pkcs8(pkcs8: &[u8]) -> Result<Self, JoseError> {
        let parsed = der::parse_pkcs8(pkcs8)?;
        let curve = EllipticCurve::from_key_algorithm(parsed.algorithm)
            .ok_or_else(|| JoseError::invalid_key("PKCS#8 document is not an EC key"))?;

        if curve.is_okp() {
            let seed = der::parse_okp_private_key(parsed.private_key)?;
            return Self::new(curve, seed);
        }

        let ec = der::parse_ec_private_key(parsed.private_key)?;
        // leading zero octets may have been stripped
        let mut d = Zeroizing::new(vec![0; curve.scalar_len().saturating_sub(ec.d.len())]);
        d.extend_from_slice(ec.d);
        match ec.public_key.or(parsed.public_key) {
            Some(public) => Self::with_public_key(d.as_slice(), EcPublicKey::new(curve, public)?),
            None => Self::new(curve, d.as_slice()),
        }
    }

    /// Encode this key as a `PKCS#8` document.
    pub fn to_pkcs8(&self) -> PrivatePkcs8KeyDer<'static> {
        let curve = self.public.curve;
        let inner = Zeroizing::new(if curve.is_okp() {
            der::encode_okp_private_key(&self.d)
        } else {
            der::encode_ec_private_key(&self.d, &self.public.point)
        });
        PrivatePkcs8KeyDer::from(der::encode_pkcs8(curve.key_algorithm(), &inner))
    }

    /// Curve of this key.
    pub fn curve(&self) -> EllipticCurve {
        self.public.curve
    }

    /// Private scalar (or seed).
    pub fn d(&self) -> &[u8] {
        &self.d
    }

    /// The public half of this key.
    pub fn public_key(&self) -> &EcPublicKey {
        &self.public
    }
}

impl fmt::Debug for EcPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcPrivateKey")
            .field("curve", &self.public.curve)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// An asymmetric public key.
pub enum PublicKey {
    Rsa(RsaPublicKey),
    Ec(EcPublicKey),
}

impl PublicKey {
    /// Create a [`PublicKey`] from a DER encoded `SubjectPublicKeyInfo`.
    pub fn from_spki(spki: &[u8]) -> Result<Self, JoseError> {
        match der::parse_spki(spki)?.algorithm {
            KeyAlgorithm::Rsa => Ok(Self::Rsa(RsaPublicKey::from_spki(spki)?)),
            _ => Ok(Self::Ec(EcPublicKey::from_spki(spki)?)),
        }
    }

    /// Encode this key as `SubjectPublicKeyInfo`.
    pub fn to_spki(&self) -> SubjectPublicKeyInfoDer<'static> {
        match self {
            Self::Rsa(key) => key.spki.clone(),
            Self::Ec(key) => key.to_spki(),
        }
    }
}

#[derive(Debug, Clone)]
/// An asymmetric private key.
pub enum PrivateKey {
    Rsa(RsaPrivateKey),
    Ec(EcPrivateKey),
}

impl PrivateKey {
    /// Create a [`PrivateKey`] from a DER encoded `PKCS#8` document.
    pub fn from_pkcs8(pkcs8: &[u8]) -> Result<Self, JoseError> {
        match der::parse_pkcs8(pkcs8)?.algorithm {
            KeyAlgorithm::Rsa => Ok(Self::Rsa(RsaPrivateKey::from_pkcs8(pkcs8)?)),
            _ => Ok(Self::Ec(EcPrivateKey::from_pkcs8(pkcs8)?)),
        }
    }

    /// Encode this key as a `PKCS#8` document.
    pub fn to_pkcs8(&self) -> PrivatePkcs8KeyDer<'static> {
        match self {
            Self::Rsa(key) => PrivatePkcs8KeyDer::from(key.pkcs8.to_vec()),
            Self::Ec(key) => key.to_pkcs8(),
        }
    }

    /// The public half of this key.
    pub fn public_key(&self) -> PublicKey {
        match self {
            Self::Rsa(key) => PublicKey::Rsa(key.public.clone()),
            Self::Ec(key) => PublicKey::Ec(key.public.clone()),
        }
    }
}

#[derive(Debug, Clone)]
/// Any key the engine can sign, verify, encrypt or decrypt with.
pub enum JoseKey {
    Secret(SecretKey),
    Public(PublicKey),
    Private(PrivateKey),
}

impl JoseKey {
    /// Human readable key type, used in error messages.
    pub(crate) fn describe(&self) -> &'static str {
        match self {
            Self::Secret(_) => "secret key",
            Self::Public(PublicKey::Rsa(_)) => "RSA public key",
            Self::Public(PublicKey::Ec(_)) => "EC public key",
            Self::Private(PrivateKey::Rsa(_)) => "RSA private key",
            Self::Private(PrivateKey::Ec(_)) => "EC private key",
        }
    }
}

impl From<SecretKey> for JoseKey {
    fn from(value: SecretKey) -> Self {
        Self::Secret(value)
    }
}

impl From<PublicKey> for JoseKey {
    fn from(value: PublicKey) -> Self {
        Self::Public(value)
    }
}

impl From<PrivateKey> for JoseKey {
    fn from(value: PrivateKey) -> Self {
        Self::Private(value)
    }
}

impl From<RsaPublicKey> for JoseKey {
    fn from(value: RsaPublicKey) -> Self {
        Self::Public(PublicKey::Rsa(value))
    }
}

impl From<RsaPrivateKey> for JoseKey {
    fn from(value: RsaPrivateKey) -> Self {
        Self::Private(PrivateKey::Rsa(value))
    }
}

impl From<EcPublicKey> for JoseKey {
    fn from(value: EcPublicKey) -> Self {
        Self::Public(PublicKey::Ec(value))
    }
}

impl From<EcPrivateKey> for JoseKey {
    fn from(value: EcPrivateKey) -> Self {
        Self::Private(PrivateKey::Ec(value))
    }
}

#[cfg(test)]
mod tests {
    use rcgen::PublicKeyData as _;

    use super::*;
    use crate::ErrorKind;

    #[test]
    fn modulus_bit_length() {
        assert_eq!(modulus_bits(&[0x00, 0x80, 0x00]), 16);
        assert_eq!(modulus_bits(&[0x01, 0x00]), 9);
        assert_eq!(modulus_bits(&[0xff; 256]), 2048);
        assert_eq!(modulus_bits(&[]), 0);
    }

    #[test]
    fn small_rsa_keys_are_rejected() {
        let err = RsaPublicKey::from_components(&[0xc3; 128], &[0x01, 0x00, 0x01]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKey);
    }

    #[test]
    fn ec_key_spki_and_pkcs8_round_trip() {
        for curve in [
            EllipticCurve::P256,
            EllipticCurve::P384,
            EllipticCurve::P521,
            EllipticCurve::X25519,
            EllipticCurve::Ed25519,
        ] {
            let key = EcPrivateKey::generate(curve).unwrap();

            let spki = key.public_key().to_spki();
            let public = EcPublicKey::from_spki(spki.as_ref()).unwrap();
            assert_eq!(&public, key.public_key());

            let pkcs8 = key.to_pkcs8();
            let private = EcPrivateKey::from_pkcs8(pkcs8.secret_pkcs8_der()).unwrap();
            assert_eq!(private.d(), key.d());
            assert_eq!(private.public_key(), key.public_key());
        }
    }

    #[test]
    fn provider_generated_pkcs8_is_understood() {
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let private = EcPrivateKey::from_pkcs8(&key_pair.serialize_der()).unwrap();
        assert_eq!(private.curve(), EllipticCurve::P256);
        assert_eq!(
            private.public_key().to_spki().as_ref(),
            key_pair.subject_public_key_info().as_slice()
        );
    }

    #[test]
    fn coordinates_split() {
        let key = EcPrivateKey::generate(EllipticCurve::P384).unwrap();
        let (x, y) = key.public_key().coordinates();
        assert_eq!(x.len(), 48);
        assert_eq!(y.map(<[u8]>::len), Some(48));

        let rebuilt = EcPublicKey::from_coordinates(EllipticCurve::P384, x, y).unwrap();
        assert_eq!(&rebuilt, key.public_key());

        let key = EcPrivateKey::generate(EllipticCurve::X25519).unwrap();
        let (x, y) = key.public_key().coordinates();
        assert_eq!(x.len(), 32);
        assert!(y.is_none());
    }

    #[test]
    fn mismatched_public_key_is_rejected() {
        let a = EcPrivateKey::generate(EllipticCurve::P256).unwrap();
        let b = EcPrivateKey::generate(EllipticCurve::P256).unwrap();
        let err = EcPrivateKey::with_public_key(a.d().to_vec(), b.public_key().clone()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidKey);
    }

    #[test]
    fn secret_key_debug_is_redacted() {
        let key = SecretKey::from("hunter2");
        assert!(!format!("{key:?}").contains("hunter2"));
    }
}
