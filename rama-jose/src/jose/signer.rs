//! [`Signer`] and [`Verifier`] implementations backed by engine keys.

use aws_lc_rs::hmac;

use crate::{
    JoseError,
    key::{EcPrivateKey, EcPublicKey, JoseKey, PrivateKey, PublicKey, RsaPrivateKey, SecretKey},
    primitives::{self, RsaSignaturePadding},
};

use super::{Headers, JWA, JWK, Signer, ToVerifySignature, Verifier};

#[derive(Debug, Clone)]
enum SigningMaterial {
    Hmac(SecretKey),
    Ec(EcPrivateKey),
    Rsa(RsaPrivateKey),
}

#[derive(Debug, Clone)]
/// [`SigningKey`] pairs a private or symmetric key with the [`JWA`] it signs with
///
/// It sets `alg` in the protected header, and optionally `kid` or the public
/// key itself as `jwk`.
pub struct SigningKey {
    alg: JWA,
    material: SigningMaterial,
    kid: Option<String>,
    embed_jwk: bool,
}

fn hmac_algorithm(alg: JWA) -> Option<hmac::Algorithm> {
    match alg {
        JWA::HS256 => Some(hmac::HMAC_SHA256),
        JWA::HS384 => Some(hmac::HMAC_SHA384),
        JWA::HS512 => Some(hmac::HMAC_SHA512),
        _ => None,
    }
}

fn rsa_parameters(alg: JWA) -> Option<(RsaSignaturePadding, usize)> {
    match alg {
        JWA::RS256 => Some((RsaSignaturePadding::Pkcs1, 256)),
        JWA::RS384 => Some((RsaSignaturePadding::Pkcs1, 384)),
        JWA::RS512 => Some((RsaSignaturePadding::Pkcs1, 512)),
        JWA::PS256 => Some((RsaSignaturePadding::Pss, 256)),
        JWA::PS384 => Some((RsaSignaturePadding::Pss, 384)),
        JWA::PS512 => Some((RsaSignaturePadding::Pss, 512)),
        _ => None,
    }
}

fn key_mismatch(alg: JWA, key: &JoseKey) -> JoseError {
    JoseError::invalid_key(format!("{} can not be used with {alg}", key.describe()))
}

impl SigningKey {
    /// Create a new [`SigningKey`], checking that the key suits `alg`.
    pub fn new(alg: JWA, key: impl Into<JoseKey>) -> Result<Self, JoseError> {
        let key = key.into();
        let material = match (&key, alg.curve()) {
            (JoseKey::Secret(secret), None) if hmac_algorithm(alg).is_some() => {
                if secret.is_empty() {
                    return Err(JoseError::invalid_key("HMAC keys can not be empty"));
                }
                SigningMaterial::Hmac(secret.clone())
            }
            (JoseKey::Private(PrivateKey::Rsa(rsa)), None) if rsa_parameters(alg).is_some() => {
                SigningMaterial::Rsa(rsa.clone())
            }
            (JoseKey::Private(PrivateKey::Ec(ec)), Some(curve)) => {
                if ec.curve() != curve {
                    return Err(JoseError::unsupported_curve(format!(
                        "{alg} requires a {curve} key, got {}",
                        ec.curve()
                    )));
                }
                SigningMaterial::Ec(ec.clone())
            }
            _ => return Err(key_mismatch(alg, &key)),
        };

        Ok(Self {
            alg,
            material,
            kid: None,
            embed_jwk: false,
        })
    }

    /// Create a new [`SigningKey`] for an EC or OKP key, picking the
    /// matching algorithm for its curve.
    pub fn from_ec_key(key: EcPrivateKey) -> Result<Self, JoseError> {
        Self::new(JWA::for_curve(key.curve())?, key)
    }

    #[must_use]
    /// Set the `kid` header when signing.
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.set_kid(kid);
        self
    }

    /// Set the `kid` header when signing.
    pub fn set_kid(&mut self, kid: impl Into<String>) -> &mut Self {
        self.kid = Some(kid.into());
        self
    }

    #[must_use]
    /// Embed the public key as `jwk` in the protected header.
    pub fn with_embedded_jwk(mut self, embed: bool) -> Self {
        self.set_embedded_jwk(embed);
        self
    }

    /// Embed the public key as `jwk` in the protected header.
    pub fn set_embedded_jwk(&mut self, embed: bool) -> &mut Self {
        self.embed_jwk = embed;
        self
    }

    /// Algorithm this key signs with.
    pub fn alg(&self) -> JWA {
        self.alg
    }

    /// The [`JWK`] of the public key, not available for HMAC keys.
    pub fn public_jwk(&self) -> Result<JWK, JoseError> {
        let public = match &self.material {
            SigningMaterial::Hmac(_) => {
                return Err(JoseError::invalid_key(
                    "Symmetric key cannot be converted to public key",
                ));
            }
            SigningMaterial::Ec(key) => PublicKey::Ec(key.public_key().clone()),
            SigningMaterial::Rsa(key) => PublicKey::Rsa(key.public_key().clone()),
        };
        Ok(JWK::from_public_key(&public)?.with_alg(self.alg.as_str()))
    }
}

impl Signer for SigningKey {
    type Signature = Vec<u8>;
    type Error = JoseError;

    fn set_headers(
        &self,
        protected_headers: &mut Headers,
        _unprotected_headers: &mut Headers,
    ) -> Result<(), Self::Error> {
        protected_headers.try_set_header("alg", self.alg)?;
        if let Some(kid) = &self.kid {
            protected_headers.try_set_header("kid", kid)?;
        }
        if self.embed_jwk {
            protected_headers.try_set_header("jwk", self.public_jwk()?)?;
        }
        Ok(())
    }

    fn sign(&self, data: &[u8]) -> Result<Self::Signature, Self::Error> {
        match &self.material {
            SigningMaterial::Hmac(key) => {
                let algorithm = hmac_algorithm(self.alg)
                    .ok_or_else(|| JoseError::unsupported_algorithm(self.alg.as_str()))?;
                Ok(primitives::hmac_sign(algorithm, key.as_bytes(), data))
            }
            SigningMaterial::Ec(key) if self.alg == JWA::EdDSA => {
                primitives::ed25519_sign(key.d(), data)
            }
            SigningMaterial::Ec(key) => {
                primitives::ecdsa_sign(key.curve(), key.d(), key.public_key().point(), data)
            }
            SigningMaterial::Rsa(key) => {
                let (padding, bits) = rsa_parameters(self.alg)
                    .ok_or_else(|| JoseError::unsupported_algorithm(self.alg.as_str()))?;
                primitives::rsa_sign(padding, bits, key.pkcs8().secret_pkcs8_der(), data)
            }
        }
    }
}

#[derive(Debug, Clone)]
/// [`VerificationKey`] verifies JWS signatures with a public or symmetric key
///
/// A decoded JWS is accepted when at least one of its signatures verifies,
/// and only the signatures made with this key are kept.
pub struct VerificationKey {
    key: JoseKey,
}

impl VerificationKey {
    /// Create a new [`VerificationKey`].
    ///
    /// A private key verifies with its public half.
    pub fn new(key: impl Into<JoseKey>) -> Self {
        let key = match key.into() {
            JoseKey::Private(private) => JoseKey::Public(private.public_key()),
            key => key,
        };
        Self { key }
    }

    /// Create a new [`VerificationKey`] from a [`JWK`].
    pub fn from_jwk(jwk: &JWK) -> Result<Self, JoseError> {
        Ok(Self::new(jwk.to_key()?))
    }

    fn verify_one(&self, signature: &ToVerifySignature) -> Result<bool, JoseError> {
        let alg: JWA = signature.alg().parse()?;
        let message = signature.signed_data();
        let received = signature.decoded_signature().signature();

        let valid = match (&self.key, alg) {
            (JoseKey::Secret(key), alg) if hmac_algorithm(alg).is_some() => {
                let algorithm = hmac_algorithm(alg)
                    .ok_or_else(|| JoseError::unsupported_algorithm(alg.as_str()))?;
                let expected = primitives::hmac_sign(algorithm, key.as_bytes(), message);
                primitives::constant_time_eq(&expected, received)
            }
            (JoseKey::Public(PublicKey::Ec(key)), JWA::EdDSA) => {
                check_curve(alg, key)?;
                primitives::ed25519_verify(key.point(), message, received)
            }
            (JoseKey::Public(PublicKey::Ec(key)), JWA::ES256 | JWA::ES384 | JWA::ES512) => {
                check_curve(alg, key)?;
                primitives::ecdsa_verify(key.curve(), key.point(), message, received)
            }
            (JoseKey::Public(PublicKey::Rsa(key)), alg) if rsa_parameters(alg).is_some() => {
                let (padding, bits) = rsa_parameters(alg)
                    .ok_or_else(|| JoseError::unsupported_algorithm(alg.as_str()))?;
                primitives::rsa_verify(padding, bits, key.rsa_public_key()?, message, received)
            }
            (key, alg) => return Err(key_mismatch(alg, key)),
        };
        Ok(valid)
    }
}

fn check_curve(alg: JWA, key: &EcPublicKey) -> Result<(), JoseError> {
    match alg.curve() {
        Some(curve) if curve == key.curve() => Ok(()),
        _ => Err(JoseError::unsupported_curve(format!(
            "{alg} can not be verified with a {} key",
            key.curve()
        ))),
    }
}

impl Verifier for VerificationKey {
    type Error = JoseError;

    fn verify(
        &self,
        _payload: &[u8],
        signatures: &[ToVerifySignature],
    ) -> Result<Vec<usize>, Self::Error> {
        let mut verified = Vec::new();
        let mut last_error = None;
        for (index, signature) in signatures.iter().enumerate() {
            match self.verify_one(signature) {
                Ok(true) => verified.push(index),
                Ok(false) => {
                    tracing::debug!("JWS signature with alg {} did not verify", signature.alg());
                }
                Err(err) => {
                    tracing::debug!("JWS signature with alg {} skipped: {err}", signature.alg());
                    last_error = Some(err);
                }
            }
        }
        if !verified.is_empty() {
            return Ok(verified);
        }
        // a single unusable signature reports why, anything else is a plain mismatch
        match last_error {
            Some(err) if signatures.len() == 1 => Err(err),
            _ => Err(JoseError::signature_invalid()),
        }
    }
}
