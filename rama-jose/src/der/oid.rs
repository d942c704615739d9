use std::fmt;

use crate::JoseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// The fixed set of object identifiers this codec understands.
///
/// Anything else is rejected, both when encoding (by name) and when decoding.
pub enum Oid {
    /// `1.2.840.113549.1.1.1`, RFC 8017 appendix C
    RsaEncryption,
    /// `1.2.840.10045.2.1`, RFC 5480
    EcPublicKey,
    /// `1.2.840.10045.3.1.7` (secp256r1)
    P256,
    /// `1.3.132.0.34` (secp384r1)
    P384,
    /// `1.3.132.0.35` (secp521r1)
    P521,
    /// `1.3.101.110`, RFC 8410
    X25519,
    /// `1.3.101.112`, RFC 8410
    Ed25519,
    /// `1.2.840.10040.4.1`, recognised so it can be reported as unsupported
    Dsa,
}

const RSA_ENCRYPTION: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01];
const EC_PUBLIC_KEY: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01];
const P256: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07];
const P384: &[u8] = &[0x2b, 0x81, 0x04, 0x00, 0x22];
const P521: &[u8] = &[0x2b, 0x81, 0x04, 0x00, 0x23];
const X25519: &[u8] = &[0x2b, 0x65, 0x6e];
const ED25519: &[u8] = &[0x2b, 0x65, 0x70];
const DSA: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x38, 0x04, 0x01];

const ALL: [Oid; 8] = [
    Oid::RsaEncryption,
    Oid::EcPublicKey,
    Oid::P256,
    Oid::P384,
    Oid::P521,
    Oid::X25519,
    Oid::Ed25519,
    Oid::Dsa,
];

impl Oid {
    /// Content octets of the encoded OBJECT IDENTIFIER.
    pub fn content_bytes(self) -> &'static [u8] {
        match self {
            Self::RsaEncryption => RSA_ENCRYPTION,
            Self::EcPublicKey => EC_PUBLIC_KEY,
            Self::P256 => P256,
            Self::P384 => P384,
            Self::P521 => P521,
            Self::X25519 => X25519,
            Self::Ed25519 => ED25519,
            Self::Dsa => DSA,
        }
    }

    /// Name used to look up this OID.
    pub fn name(self) -> &'static str {
        match self {
            Self::RsaEncryption => "rsaEncryption",
            Self::EcPublicKey => "ecPublicKey",
            Self::P256 => "P-256",
            Self::P384 => "P-384",
            Self::P521 => "P-521",
            Self::X25519 => "X25519",
            Self::Ed25519 => "Ed25519",
            Self::Dsa => "dsa",
        }
    }

    /// Look up an OID by [`Oid::name`].
    pub fn from_name(name: &str) -> Result<Self, JoseError> {
        ALL.into_iter()
            .find(|oid| oid.name() == name)
            .ok_or_else(|| JoseError::unsupported_algorithm(format!("unsupported OID name {name}")))
    }

    /// Map the content octets of a decoded OBJECT IDENTIFIER back to a known OID.
    pub fn from_content(content: &[u8]) -> Result<Self, JoseError> {
        ALL.into_iter()
            .find(|oid| oid.content_bytes() == content)
            .ok_or_else(|| JoseError::invalid_asn1(format!("unknown OID {content:02x?}")))
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn names_and_contents_are_bijective() {
        for oid in ALL {
            assert_eq!(Oid::from_name(oid.name()).unwrap(), oid);
            assert_eq!(Oid::from_content(oid.content_bytes()).unwrap(), oid);
        }
    }

    #[test]
    fn unknown_oids() {
        assert_eq!(
            Oid::from_name("brainpoolP256r1").unwrap_err().kind(),
            ErrorKind::UnsupportedAlgorithm
        );
        // secp256k1
        assert_eq!(
            Oid::from_content(&[0x2b, 0x81, 0x04, 0x00, 0x0a]).unwrap_err().kind(),
            ErrorKind::InvalidAsn1
        );
    }
}
