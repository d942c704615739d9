//! The handful of key structures this crate reads and writes.
//!
//! ```text
//! SubjectPublicKeyInfo ::= SEQUENCE {
//!     algorithm         AlgorithmIdentifier,
//!     subjectPublicKey  BIT STRING }
//!
//! OneAsymmetricKey ::= SEQUENCE {
//!     version           INTEGER,
//!     algorithm         AlgorithmIdentifier,
//!     privateKey        OCTET STRING,
//!     attributes        [0] IMPLICIT Attributes OPTIONAL,
//!     publicKey         [1] IMPLICIT BIT STRING OPTIONAL }
//! ```
//!
//! See [RFC 5280](https://datatracker.ietf.org/doc/rfc5280/) and
//! [RFC 5958](https://datatracker.ietf.org/doc/rfc5958/).

use crate::JoseError;

use super::{
    BIT_STRING_NO_UNUSED_BITS, Element, Oid, SequenceBuilder, TAG_BIT_STRING, TAG_CONTEXT_0,
    TAG_CONTEXT_1, TAG_INTEGER, TAG_NULL, TAG_OBJECT_IDENTIFIER, TAG_OCTET_STRING, TAG_SEQUENCE,
    encode_tlv, parse_element, unsigned_integer,
};

/// Identifier of the PKCS#8 v2 `[1] IMPLICIT BIT STRING` public key.
const TAG_PKCS8_PUBLIC_KEY: u8 = 0x81;

/// Index of `subjectPublicKeyInfo` within a `TBSCertificate` carrying the explicit `[0] version`.
const TBS_SPKI_INDEX: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Key algorithm as identified by an `AlgorithmIdentifier`.
pub enum KeyAlgorithm {
    /// `rsaEncryption`
    Rsa,
    /// `ecPublicKey` on P-256
    P256,
    /// `ecPublicKey` on P-384
    P384,
    /// `ecPublicKey` on P-521
    P521,
    /// `X25519`
    X25519,
    /// `Ed25519`
    Ed25519,
}

impl KeyAlgorithm {
    /// Encode the `AlgorithmIdentifier` for this key algorithm.
    pub fn algorithm_identifier(self) -> Vec<u8> {
        let builder = SequenceBuilder::new();
        match self {
            // RFC 3279 requires NULL parameters for rsaEncryption
            Self::Rsa => builder.oid(Oid::RsaEncryption).null(),
            Self::P256 => builder.oid(Oid::EcPublicKey).oid(Oid::P256),
            Self::P384 => builder.oid(Oid::EcPublicKey).oid(Oid::P384),
            Self::P521 => builder.oid(Oid::EcPublicKey).oid(Oid::P521),
            Self::X25519 => builder.oid(Oid::X25519),
            Self::Ed25519 => builder.oid(Oid::Ed25519),
        }
        .end()
    }

    fn from_algorithm_identifier(element: &Element<'_>) -> Result<Self, JoseError> {
        let element = element.expect(TAG_SEQUENCE, "AlgorithmIdentifier")?;
        let children = element.children()?;
        let (algorithm, parameters) = match children.as_slice() {
            [algorithm] => (algorithm, None),
            [algorithm, parameters, ..] => (algorithm, Some(parameters)),
            [] => return Err(JoseError::invalid_asn1("empty AlgorithmIdentifier")),
        };
        let algorithm = Oid::from_content(
            algorithm
                .expect(TAG_OBJECT_IDENTIFIER, "algorithm OID")?
                .contents(),
        )?;

        match algorithm {
            Oid::RsaEncryption => match parameters {
                None => Ok(Self::Rsa),
                Some(parameters) if parameters.identifier() == TAG_NULL => Ok(Self::Rsa),
                Some(_) => Err(JoseError::invalid_asn1(
                    "rsaEncryption parameters must be NULL",
                )),
            },
            Oid::EcPublicKey => {
                let curve = parameters
                    .ok_or_else(|| JoseError::invalid_asn1("missing named curve parameters"))?
                    .expect(TAG_OBJECT_IDENTIFIER, "named curve OID")?;
                match Oid::from_content(curve.contents())? {
                    Oid::P256 => Ok(Self::P256),
                    Oid::P384 => Ok(Self::P384),
                    Oid::P521 => Ok(Self::P521),
                    other => Err(JoseError::unsupported_algorithm(format!(
                        "{other} is not a named curve for ecPublicKey"
                    ))),
                }
            }
            Oid::X25519 => Ok(Self::X25519),
            Oid::Ed25519 => Ok(Self::Ed25519),
            Oid::Dsa => Err(JoseError::unsupported_algorithm(
                "DSA keys are not supported",
            )),
            Oid::P256 | Oid::P384 | Oid::P521 => Err(JoseError::invalid_asn1(format!(
                "{algorithm} is not a key algorithm"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Borrowed view on a parsed `SubjectPublicKeyInfo`.
pub struct Spki<'a> {
    /// Algorithm of the key.
    pub algorithm: KeyAlgorithm,
    /// Content of the `subjectPublicKey` bit string, without the unused bits octet.
    pub public_key: &'a [u8],
}

fn bit_string_contents<'a>(element: &Element<'a>) -> Result<&'a [u8], JoseError> {
    match element.contents() {
        [BIT_STRING_NO_UNUSED_BITS, rest @ ..] => Ok(rest),
        _ => Err(JoseError::invalid_asn1(
            "key BIT STRING must not have unused bits",
        )),
    }
}

/// Parse a DER encoded `SubjectPublicKeyInfo`.
pub fn parse_spki(der: &[u8]) -> Result<Spki<'_>, JoseError> {
    let spki = parse_element(der)?.expect(TAG_SEQUENCE, "SubjectPublicKeyInfo")?;
    let children = spki.children()?;
    let [algorithm, public_key, ..] = children.as_slice() else {
        return Err(JoseError::invalid_asn1("truncated SubjectPublicKeyInfo"));
    };

    Ok(Spki {
        algorithm: KeyAlgorithm::from_algorithm_identifier(algorithm)?,
        public_key: bit_string_contents(&public_key.expect(TAG_BIT_STRING, "subjectPublicKey")?)?,
    })
}

/// Encode a `SubjectPublicKeyInfo` for the given algorithm and raw public key.
pub fn encode_spki(algorithm: KeyAlgorithm, public_key: &[u8]) -> Vec<u8> {
    SequenceBuilder::new()
        .add(algorithm.algorithm_identifier())
        .bit_string(public_key)
        .end()
}

/// Lift the `SubjectPublicKeyInfo` out of a DER encoded X.509 certificate.
///
/// The returned slice borrows from `der`. Nothing of the certificate besides
/// its outer structure is validated.
pub fn spki_from_x509(der: &[u8]) -> Result<&[u8], JoseError> {
    let certificate = parse_element(der)?.expect(TAG_SEQUENCE, "Certificate")?;
    let tbs = certificate
        .children()?
        .into_iter()
        .next()
        .ok_or_else(|| JoseError::invalid_asn1("empty Certificate"))?
        .expect(TAG_SEQUENCE, "TBSCertificate")?;
    let fields = tbs.children()?;

    // v1 certificates omit the explicit version
    let index = match fields.first() {
        Some(version) if version.identifier() == TAG_CONTEXT_0 => TBS_SPKI_INDEX,
        _ => TBS_SPKI_INDEX - 1,
    };

    let spki = fields
        .get(index)
        .ok_or_else(|| JoseError::invalid_asn1("truncated TBSCertificate"))?
        .expect(TAG_SEQUENCE, "SubjectPublicKeyInfo")?;
    Ok(spki.raw())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Borrowed view on a parsed `PKCS#8` private key.
pub struct Pkcs8<'a> {
    /// Algorithm of the key.
    pub algorithm: KeyAlgorithm,
    /// Content of the `privateKey` octet string.
    pub private_key: &'a [u8],
    /// Optional v2 public key, without the unused bits octet.
    pub public_key: Option<&'a [u8]>,
}

/// Parse a DER encoded `PKCS#8` (v1 or v2) private key.
pub fn parse_pkcs8(der: &[u8]) -> Result<Pkcs8<'_>, JoseError> {
    let pkcs8 = parse_element(der)?.expect(TAG_SEQUENCE, "PrivateKeyInfo")?;
    let children = pkcs8.children()?;
    let [version, algorithm, private_key, optional @ ..] = children.as_slice() else {
        return Err(JoseError::invalid_asn1("truncated PrivateKeyInfo"));
    };

    if !matches!(unsigned_integer(version)?, [0] | [1]) {
        return Err(JoseError::invalid_asn1("unsupported PrivateKeyInfo version"));
    }

    let public_key = optional
        .iter()
        .find(|element| element.identifier() == TAG_PKCS8_PUBLIC_KEY)
        .map(bit_string_contents)
        .transpose()?;

    Ok(Pkcs8 {
        algorithm: KeyAlgorithm::from_algorithm_identifier(algorithm)?,
        private_key: private_key
            .expect(TAG_OCTET_STRING, "privateKey")?
            .contents(),
        public_key,
    })
}

/// Encode a `PKCS#8` v1 private key around an already encoded algorithm specific key.
pub fn encode_pkcs8(algorithm: KeyAlgorithm, private_key: &[u8]) -> Vec<u8> {
    SequenceBuilder::new()
        .zero()
        .add(algorithm.algorithm_identifier())
        .octet_string(private_key)
        .end()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Borrowed view on an `ECPrivateKey` (RFC 5915).
pub struct EcPrivateKeyInfo<'a> {
    /// Big-endian private scalar.
    pub d: &'a [u8],
    /// Uncompressed public point, if embedded.
    pub public_key: Option<&'a [u8]>,
}

/// Encode an `ECPrivateKey`, the curve is carried by the surrounding `PKCS#8`.
pub fn encode_ec_private_key(d: &[u8], public_key: &[u8]) -> Vec<u8> {
    SequenceBuilder::new()
        .one()
        .octet_string(d)
        .add(SequenceBuilder::new().bit_string(public_key).end_with_tag(TAG_CONTEXT_1))
        .end()
}

/// Parse an `ECPrivateKey`.
pub fn parse_ec_private_key(der: &[u8]) -> Result<EcPrivateKeyInfo<'_>, JoseError> {
    let key = parse_element(der)?.expect(TAG_SEQUENCE, "ECPrivateKey")?;
    let children = key.children()?;
    let [version, d, optional @ ..] = children.as_slice() else {
        return Err(JoseError::invalid_asn1("truncated ECPrivateKey"));
    };
    if unsigned_integer(version)? != [1] {
        return Err(JoseError::invalid_asn1("unsupported ECPrivateKey version"));
    }

    let public_key = match optional
        .iter()
        .find(|element| element.identifier() == TAG_CONTEXT_1)
    {
        Some(explicit) => {
            let inner = parse_element(explicit.contents())?.expect(TAG_BIT_STRING, "publicKey")?;
            Some(bit_string_contents(&inner)?)
        }
        None => None,
    };

    Ok(EcPrivateKeyInfo {
        d: d.expect(TAG_OCTET_STRING, "privateKey")?.contents(),
        public_key,
    })
}

/// Encode the `CurvePrivateKey` of an X25519 or Ed25519 key (RFC 8410).
pub fn encode_okp_private_key(seed: &[u8]) -> Vec<u8> {
    encode_tlv(TAG_OCTET_STRING, seed)
}

/// Parse the `CurvePrivateKey` of an X25519 or Ed25519 key.
pub fn parse_okp_private_key(der: &[u8]) -> Result<&[u8], JoseError> {
    Ok(parse_element(der)?
        .expect(TAG_OCTET_STRING, "CurvePrivateKey")?
        .contents())
}

/// Encode an `RSAPublicKey` (RFC 3279, section 2.3.1) from its modulus and exponent.
pub fn encode_rsa_public_key(n: &[u8], e: &[u8]) -> Vec<u8> {
    SequenceBuilder::new()
        .unsigned_integer(n)
        .unsigned_integer(e)
        .end()
}

/// Parse an `RSAPublicKey` into its modulus and public exponent.
pub fn parse_rsa_public_key(der: &[u8]) -> Result<(&[u8], &[u8]), JoseError> {
    let key = parse_element(der)?.expect(TAG_SEQUENCE, "RSAPublicKey")?;
    let children = key.children()?;
    let [n, e, ..] = children.as_slice() else {
        return Err(JoseError::invalid_asn1("truncated RSAPublicKey"));
    };
    Ok((unsigned_integer(n)?, unsigned_integer(e)?))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Big-endian components of a two prime `RSAPrivateKey` (RFC 8017, appendix A.1.2).
pub struct RsaPrivateComponents<'a> {
    /// modulus
    pub n: &'a [u8],
    /// public exponent
    pub e: &'a [u8],
    /// private exponent
    pub d: &'a [u8],
    /// first prime factor
    pub p: &'a [u8],
    /// second prime factor
    pub q: &'a [u8],
    /// `d mod (p - 1)`
    pub dp: &'a [u8],
    /// `d mod (q - 1)`
    pub dq: &'a [u8],
    /// `q^-1 mod p`
    pub qi: &'a [u8],
}

/// Encode an `RSAPrivateKey`.
pub fn encode_rsa_private_key(key: &RsaPrivateComponents<'_>) -> Vec<u8> {
    SequenceBuilder::new()
        .zero()
        .unsigned_integer(key.n)
        .unsigned_integer(key.e)
        .unsigned_integer(key.d)
        .unsigned_integer(key.p)
        .unsigned_integer(key.q)
        .unsigned_integer(key.dp)
        .unsigned_integer(key.dq)
        .unsigned_integer(key.qi)
        .end()
}

/// Parse a two prime `RSAPrivateKey`.
pub fn parse_rsa_private_key(der: &[u8]) -> Result<RsaPrivateComponents<'_>, JoseError> {
    let key = parse_element(der)?.expect(TAG_SEQUENCE, "RSAPrivateKey")?;
    let children = key.children()?;
    let [version, n, e, d, p, q, dp, dq, qi, ..] = children.as_slice() else {
        return Err(JoseError::invalid_asn1("truncated RSAPrivateKey"));
    };
    if version.identifier() != TAG_INTEGER || unsigned_integer(version)? != [0] {
        return Err(JoseError::unsupported_algorithm(
            "multi-prime RSA keys are not supported",
        ));
    }

    Ok(RsaPrivateComponents {
        n: unsigned_integer(n)?,
        e: unsigned_integer(e)?,
        d: unsigned_integer(d)?,
        p: unsigned_integer(p)?,
        q: unsigned_integer(q)?,
        dp: unsigned_integer(dp)?,
        dq: unsigned_integer(dq)?,
        qi: unsigned_integer(qi)?,
    })
}

#[cfg(test)]
mod tests {
    use rcgen::PublicKeyData as _;

    use super::*;
    use crate::ErrorKind;

    #[test]
    fn spki_round_trip() {
        for (algorithm, public_key) in [
            (KeyAlgorithm::Ed25519, vec![0x11; 32]),
            (KeyAlgorithm::X25519, vec![0x22; 32]),
            (KeyAlgorithm::P256, [vec![0x04], vec![0x33; 64]].concat()),
            (
                KeyAlgorithm::Rsa,
                encode_rsa_public_key(&[0xc1; 256], &[0x01, 0x00, 0x01]),
            ),
        ] {
            let der = encode_spki(algorithm, &public_key);
            let spki = parse_spki(&der).unwrap();
            assert_eq!(spki.algorithm, algorithm);
            assert_eq!(spki.public_key, public_key.as_slice());
        }
    }

    #[test]
    fn rsa_spki_matches_known_prefix() {
        let der = encode_spki(
            KeyAlgorithm::Rsa,
            &encode_rsa_public_key(&[0x80; 256], &[0x01, 0x00, 0x01]),
        );
        assert_eq!(
            &der[4..19],
            &[
                0x30, 0x0d, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01,
                0x05, 0x00
            ]
        );
        let spki = parse_spki(&der).unwrap();
        let (n, e) = parse_rsa_public_key(spki.public_key).unwrap();
        assert_eq!(n, &[0x80; 256]);
        assert_eq!(e, &[0x01, 0x00, 0x01]);
    }

    #[test]
    fn dsa_is_unsupported() {
        let algorithm = SequenceBuilder::new().oid(Oid::Dsa).end();
        let der = SequenceBuilder::new()
            .add(algorithm)
            .bit_string(&[0x02, 0x01, 0x01])
            .end();
        assert_eq!(
            parse_spki(&der).unwrap_err().kind(),
            ErrorKind::UnsupportedAlgorithm
        );
    }

    #[test]
    fn unknown_algorithm_is_invalid_asn1() {
        // 1.2.840.113549.1.1.10 (RSASSA-PSS)
        let algorithm = SequenceBuilder::new()
            .add([0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x0a])
            .end();
        let der = SequenceBuilder::new()
            .add(algorithm)
            .bit_string(&[0x00])
            .end();
        assert_eq!(parse_spki(&der).unwrap_err().kind(), ErrorKind::InvalidAsn1);
    }

    #[test]
    fn pkcs8_round_trip() {
        let d = [0x42; 32];
        let public_key = [vec![0x04], vec![0x24; 64]].concat();
        let der = encode_pkcs8(KeyAlgorithm::P256, &encode_ec_private_key(&d, &public_key));

        let pkcs8 = parse_pkcs8(&der).unwrap();
        assert_eq!(pkcs8.algorithm, KeyAlgorithm::P256);
        assert!(pkcs8.public_key.is_none());

        let ec = parse_ec_private_key(pkcs8.private_key).unwrap();
        assert_eq!(ec.d, &d);
        assert_eq!(ec.public_key, Some(public_key.as_slice()));

        let der = encode_pkcs8(KeyAlgorithm::Ed25519, &encode_okp_private_key(&[0x07; 32]));
        let pkcs8 = parse_pkcs8(&der).unwrap();
        assert_eq!(pkcs8.algorithm, KeyAlgorithm::Ed25519);
        assert_eq!(parse_okp_private_key(pkcs8.private_key).unwrap(), &[0x07; 32]);
    }

    #[test]
    fn rsa_private_key_round_trip() {
        let components = RsaPrivateComponents {
            n: &[0xb5; 256],
            e: &[0x01, 0x00, 0x01],
            d: &[0x55; 256],
            p: &[0xe1; 128],
            q: &[0xd3; 128],
            dp: &[0x11; 128],
            dq: &[0x22; 128],
            qi: &[0x33; 128],
        };
        let der = encode_rsa_private_key(&components);
        assert_eq!(parse_rsa_private_key(&der).unwrap(), components);
    }

    #[test]
    fn lift_spki_from_generated_certificate() {
        let key_pair = rcgen::KeyPair::generate().unwrap();
        let certificate = rcgen::CertificateParams::new(vec!["jose.example".to_owned()])
            .unwrap()
            .self_signed(&key_pair)
            .unwrap();

        let spki = spki_from_x509(certificate.der()).unwrap();
        assert_eq!(spki, key_pair.subject_public_key_info().as_slice());
        assert_eq!(parse_spki(spki).unwrap().algorithm, KeyAlgorithm::P256);
    }

    #[test]
    fn lift_spki_from_v1_certificate() {
        let spki = encode_spki(KeyAlgorithm::Ed25519, &[0x09; 32]);
        let name = SequenceBuilder::new().end();
        let tbs = SequenceBuilder::new()
            .unsigned_integer(&[0x01]) // serialNumber
            .add(SequenceBuilder::new().oid(Oid::Ed25519).end()) // signature
            .add(&name) // issuer
            .add(SequenceBuilder::new().end()) // validity
            .add(&name) // subject
            .add(&spki)
            .end();
        let certificate = SequenceBuilder::new()
            .add(tbs)
            .add(SequenceBuilder::new().oid(Oid::Ed25519).end())
            .bit_string(&[0x00; 64])
            .end();

        assert_eq!(spki_from_x509(&certificate).unwrap(), spki.as_slice());
    }

    #[test]
    fn truncated_certificate() {
        let certificate = SequenceBuilder::new()
            .add(SequenceBuilder::new().zero().end())
            .end();
        assert_eq!(
            spki_from_x509(&certificate).unwrap_err().kind(),
            ErrorKind::InvalidAsn1
        );
    }
}
