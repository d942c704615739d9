//! Minimal DER (and BER indefinite length) codec.
//!
//! This is ***NOT*** a general ASN.1 library. It knows exactly enough to
//! round-trip public and private keys as `SubjectPublicKeyInfo` and `PKCS#8`
//! structures, and to lift the `SubjectPublicKeyInfo` out of an X.509 certificate.
//!
//! All decoding is zero-copy: parsed [`Element`]s are views into the input buffer.
//! Bytes are only copied by the encoder, or by callers that need ownership.
//!
//! Defined in [ITU X.690](https://www.itu.int/ITU-T/studygroups/com17/languages/X.690-0207.pdf).

mod decode;
pub use decode::{Element, parse_element, parse_elements, unsigned_integer};

mod encode;
pub use encode::{SequenceBuilder, encode_integer, encode_length, encode_tlv};

mod oid;
pub use oid::Oid;

mod keys;
pub use keys::{
    EcPrivateKeyInfo, KeyAlgorithm, Pkcs8, RsaPrivateComponents, Spki, encode_ec_private_key,
    encode_okp_private_key, encode_pkcs8, encode_rsa_private_key, encode_rsa_public_key,
    encode_spki, parse_ec_private_key, parse_okp_private_key, parse_pkcs8, parse_rsa_private_key,
    parse_rsa_public_key, parse_spki, spki_from_x509,
};

/// Identifier tag for a DER encoded integer.
pub const TAG_INTEGER: u8 = 0x02;
/// Identifier tag for a DER encoded bit string.
pub const TAG_BIT_STRING: u8 = 0x03;
/// Identifier tag for a DER encoded octet string.
pub const TAG_OCTET_STRING: u8 = 0x04;
/// Identifier tag for a DER encoded null.
pub const TAG_NULL: u8 = 0x05;
/// Identifier tag for a DER encoded object identifier.
pub const TAG_OBJECT_IDENTIFIER: u8 = 0x06;
/// Identifier tag for a DER encoded (constructed) sequence.
pub const TAG_SEQUENCE: u8 = 0x30;
/// Identifier of the explicit context specific tag `[0]` (constructed).
pub const TAG_CONTEXT_0: u8 = 0xa0;
/// Identifier of the explicit context specific tag `[1]` (constructed).
pub const TAG_CONTEXT_1: u8 = 0xa1;

/// Maximum length of a DER encoded length in short form.
pub(crate) const LENGTH_SHORT_FORM_MAX: usize = 127;
/// First length octet of a BER indefinite length.
pub(crate) const LENGTH_INDEFINITE: u8 = 0x80;
/// Octet that indicates that no unused bits are present in a bit string.
pub(crate) const BIT_STRING_NO_UNUSED_BITS: u8 = 0x00;
/// Sign bit of the first content octet of an integer, also the long form length flag.
pub(crate) const HIGH_BIT: u8 = 0x80;
