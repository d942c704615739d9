use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{JoseError, key::EllipticCurve};

#[derive(Debug, Serialize, Deserialize, Copy, Clone, PartialEq, Eq, Hash)]
/// [`JWA`] or JSON Web Algorithms for signatures as defined in [`rfc7518, section 3`]
///
/// Some algorithms are required to be implemented when supporting
/// JWA, while others are recommended or optional.
///
/// [`rfc7518, section 3`]: https://datatracker.ietf.org/doc/html/rfc7518#section-3
pub enum JWA {
    /// HMAC using SHA-256 (Required)
    HS256,
    /// HMAC using SHA-384 (Optional)
    HS384,
    /// HMAC using SHA-512 (Optional)
    HS512,
    /// RSASSA-PKCS1-v1_5 using SHA-256 (Recommended)
    RS256,
    /// RSASSA-PKCS1-v1_5 using SHA-384 (Optional)
    RS384,
    /// RSASSA-PKCS1-v1_5 using SHA-512 (Optional)
    RS512,
    /// ECDSA using P-256 and SHA-256 (Recommended+)
    ES256,
    /// ECDSA using P-384 and SHA-384 (Optional)
    ES384,
    /// ECDSA using P-521 and SHA-512 (Optional)
    ES512,
    /// RSASSA-PSS using SHA-256 and MGF1 with SHA-256 (Optional)
    PS256,
    /// RSASSA-PSS using SHA-384 and MGF1 with SHA-384 (Optional)
    PS384,
    /// RSASSA-PSS using SHA-512 and MGF1 with SHA-512 (Optional)
    PS512,
    /// EdDSA using Ed25519, [`rfc8037`]
    ///
    /// [`rfc8037`]: https://datatracker.ietf.org/doc/html/rfc8037
    EdDSA,
}

impl JWA {
    /// Value of the `alg` header.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
            Self::ES256 => "ES256",
            Self::ES384 => "ES384",
            Self::ES512 => "ES512",
            Self::PS256 => "PS256",
            Self::PS384 => "PS384",
            Self::PS512 => "PS512",
            Self::EdDSA => "EdDSA",
        }
    }

    /// Curve required by an ECDSA or EdDSA algorithm.
    pub fn curve(self) -> Option<EllipticCurve> {
        match self {
            Self::ES256 => Some(EllipticCurve::P256),
            Self::ES384 => Some(EllipticCurve::P384),
            Self::ES512 => Some(EllipticCurve::P521),
            Self::EdDSA => Some(EllipticCurve::Ed25519),
            Self::HS256
            | Self::HS384
            | Self::HS512
            | Self::RS256
            | Self::RS384
            | Self::RS512
            | Self::PS256
            | Self::PS384
            | Self::PS512 => None,
        }
    }

    /// The ECDSA algorithm for keys on the given curve.
    pub fn for_curve(curve: EllipticCurve) -> Result<Self, JoseError> {
        match curve {
            EllipticCurve::P256 => Ok(Self::ES256),
            EllipticCurve::P384 => Ok(Self::ES384),
            EllipticCurve::P521 => Ok(Self::ES512),
            EllipticCurve::Ed25519 => Ok(Self::EdDSA),
            EllipticCurve::X25519 => Err(JoseError::unsupported_curve(
                "X25519 keys can not be used for signatures",
            )),
        }
    }
}

impl FromStr for JWA {
    type Err = JoseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_owned())).map_err(|_err| {
            JoseError::unsupported_algorithm(format!("Unsupported \"alg\" value: {s}"))
        })
    }
}

impl fmt::Display for JWA {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! string_algorithm {
    (
        $(#[$meta:meta])*
        $name:ident, $header:literal {
            $($(#[$variant_meta:meta])* $variant:ident => $value:literal,)+
        }
        unsupported: [$($unsupported:literal),* $(,)?]
    ) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$variant_meta])* $variant,)+
        }

        impl $name {
            /// Registered name of this algorithm.
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $value,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = JoseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($value => Ok(Self::$variant),)+
                    $($unsupported)|* => Err(JoseError::unsupported_algorithm(format!(
                        concat!($header, " value {} is not supported"),
                        s
                    ))),
                    _ => Err(JoseError::unsupported_algorithm(format!(
                        concat!("Invalid or unsupported ", $header, " header value: {}"),
                        s
                    ))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let value = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
                value.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

string_algorithm! {
    /// JWE `alg`: how the content encryption key is produced or transported,
    /// [`rfc7518, section 4`].
    ///
    /// [`rfc7518, section 4`]: https://datatracker.ietf.org/doc/html/rfc7518#section-4
    KeyManagementAlgorithm, "\"alg\" (JWE Algorithm)" {
        /// Direct use of a shared symmetric key as the CEK
        Dir => "dir",
        /// RSAES-PKCS1-v1_5
        Rsa1_5 => "RSA1_5",
        /// RSAES OAEP using default parameters (SHA-1)
        RsaOaep => "RSA-OAEP",
        /// RSAES OAEP using SHA-256 and MGF1 with SHA-256
        RsaOaep256 => "RSA-OAEP-256",
        /// RSAES OAEP using SHA-384 and MGF1 with SHA-384
        RsaOaep384 => "RSA-OAEP-384",
        /// RSAES OAEP using SHA-512 and MGF1 with SHA-512
        RsaOaep512 => "RSA-OAEP-512",
        /// AES Key Wrap using a 128-bit key
        A128Kw => "A128KW",
        /// AES Key Wrap using a 256-bit key
        A256Kw => "A256KW",
        /// ECDH-ES using Concat KDF
        EcdhEs => "ECDH-ES",
        /// ECDH-ES using Concat KDF and CEK wrapped with "A128KW"
        EcdhEsA128Kw => "ECDH-ES+A128KW",
        /// ECDH-ES using Concat KDF and CEK wrapped with "A256KW"
        EcdhEsA256Kw => "ECDH-ES+A256KW",
        /// PBES2 with HMAC SHA-256 and "A128KW" wrapping
        Pbes2Hs256A128Kw => "PBES2-HS256+A128KW",
        /// PBES2 with HMAC SHA-512 and "A256KW" wrapping
        Pbes2Hs512A256Kw => "PBES2-HS512+A256KW",
        /// Key wrapping with AES GCM using a 128-bit key
        A128GcmKw => "A128GCMKW",
        /// Key wrapping with AES GCM using a 256-bit key
        A256GcmKw => "A256GCMKW",
    }
    unsupported: ["A192KW", "ECDH-ES+A192KW", "PBES2-HS384+A192KW", "A192GCMKW"]
}

string_algorithm! {
    /// JWE `enc`: the authenticated encryption of the plaintext,
    /// [`rfc7518, section 5`].
    ///
    /// [`rfc7518, section 5`]: https://datatracker.ietf.org/doc/html/rfc7518#section-5
    ContentEncryptionAlgorithm, "\"enc\" (Encryption Algorithm)" {
        /// AES GCM using a 128-bit key
        A128Gcm => "A128GCM",
        /// AES GCM using a 256-bit key
        A256Gcm => "A256GCM",
        /// AES_128_CBC_HMAC_SHA_256
        A128CbcHs256 => "A128CBC-HS256",
        /// AES_256_CBC_HMAC_SHA_512
        A256CbcHs512 => "A256CBC-HS512",
    }
    unsupported: ["A192GCM", "A192CBC-HS384"]
}

impl ContentEncryptionAlgorithm {
    /// Required length of the content encryption key in bytes.
    ///
    /// This is the only source of truth for CEK lengths.
    pub fn cek_len(self) -> usize {
        match self {
            Self::A128Gcm => 16,
            Self::A256Gcm | Self::A128CbcHs256 => 32,
            Self::A256CbcHs512 => 64,
        }
    }

    /// Required length of the initialization vector in bytes.
    pub fn iv_len(self) -> usize {
        match self {
            Self::A128Gcm | Self::A256Gcm => 12,
            Self::A128CbcHs256 | Self::A256CbcHs512 => 16,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
/// The families of [`KeyManagementAlgorithm`]s, each with its own side protocol.
pub enum KeyManagementFamily {
    /// `dir`
    Direct,
    /// `RSA1_5`, `RSA-OAEP*`
    RsaKeyWrap,
    /// `A*KW`
    AesKeyWrap,
    /// `ECDH-ES`
    KeyAgreement,
    /// `ECDH-ES+A*KW`
    KeyAgreementWithKeyWrap,
    /// `PBES2-*`
    Pbes2,
    /// `A*GCMKW`
    AesGcmKeyWrap,
}

impl KeyManagementAlgorithm {
    /// The family this algorithm belongs to.
    pub fn family(self) -> KeyManagementFamily {
        match self {
            Self::Dir => KeyManagementFamily::Direct,
            Self::Rsa1_5
            | Self::RsaOaep
            | Self::RsaOaep256
            | Self::RsaOaep384
            | Self::RsaOaep512 => KeyManagementFamily::RsaKeyWrap,
            Self::A128Kw | Self::A256Kw => KeyManagementFamily::AesKeyWrap,
            Self::EcdhEs => KeyManagementFamily::KeyAgreement,
            Self::EcdhEsA128Kw | Self::EcdhEsA256Kw => KeyManagementFamily::KeyAgreementWithKeyWrap,
            Self::Pbes2Hs256A128Kw | Self::Pbes2Hs512A256Kw => KeyManagementFamily::Pbes2,
            Self::A128GcmKw | Self::A256GcmKw => KeyManagementFamily::AesGcmKeyWrap,
        }
    }

    /// Returns true for the algorithms that make the CEK out of the key
    /// (or key agreement) itself, and so cannot transport a chosen CEK.
    pub fn is_direct(self) -> bool {
        matches!(self, Self::Dir | Self::EcdhEs)
    }

    /// Length in bytes of the AES key wrapping key, for the families that wrap with AES.
    pub(crate) fn wrap_key_len(self) -> Option<usize> {
        match self {
            Self::A128Kw | Self::EcdhEsA128Kw | Self::Pbes2Hs256A128Kw | Self::A128GcmKw => {
                Some(16)
            }
            Self::A256Kw | Self::EcdhEsA256Kw | Self::Pbes2Hs512A256Kw | Self::A256GcmKw => {
                Some(32)
            }
            Self::Dir
            | Self::Rsa1_5
            | Self::RsaOaep
            | Self::RsaOaep256
            | Self::RsaOaep384
            | Self::RsaOaep512
            | Self::EcdhEs => None,
        }
    }
}
