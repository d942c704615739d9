use crate::JoseError;

use super::{
    BIT_STRING_NO_UNUSED_BITS, HIGH_BIT, LENGTH_SHORT_FORM_MAX, Oid, TAG_BIT_STRING, TAG_INTEGER,
    TAG_NULL, TAG_OBJECT_IDENTIFIER, TAG_OCTET_STRING, TAG_SEQUENCE,
};

/// Length encoding as defined in section 8.1.3 of
/// [ITU X.690](https://www.itu.int/ITU-T/studygroups/com17/languages/X.690-0207.pdf).
///
/// Short form up to 127, otherwise long form with the minimal amount of
/// length octets. Indefinite lengths are never produced.
pub fn encode_length(len: usize) -> Vec<u8> {
    if len <= LENGTH_SHORT_FORM_MAX {
        return vec![len as u8];
    }

    let len_bytes = len.to_be_bytes();
    let skip = len_bytes.iter().take_while(|b| **b == 0).count();
    let digits = &len_bytes[skip..];

    let mut result = Vec::with_capacity(1 + digits.len());
    result.push(HIGH_BIT | digits.len() as u8);
    result.extend_from_slice(digits);
    result
}

/// Encode a complete tag-length-value element.
pub fn encode_tlv(tag: u8, contents: &[u8]) -> Vec<u8> {
    let len = encode_length(contents.len());
    let mut result = Vec::with_capacity(1 + len.len() + contents.len());
    result.push(tag);
    result.extend_from_slice(&len);
    result.extend_from_slice(contents);
    result
}

/// Encode big-endian unsigned magnitude bytes as a DER INTEGER.
///
/// Redundant leading zero octets are stripped, and a single zero octet is
/// inserted when the high bit of the first remaining octet is set so the
/// value is not read back as negative. An empty input encodes zero.
pub fn encode_integer(value: &[u8]) -> Vec<u8> {
    let skip = value.iter().take_while(|b| **b == 0).count();
    let value = &value[skip..];

    match value.first() {
        None => encode_tlv(TAG_INTEGER, &[0]),
        Some(first) if first & HIGH_BIT != 0 => {
            let mut padded = Vec::with_capacity(value.len() + 1);
            padded.push(0);
            padded.extend_from_slice(value);
            encode_tlv(TAG_INTEGER, &padded)
        }
        Some(_) => encode_tlv(TAG_INTEGER, value),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// [`SequenceBuilder`] accumulates DER encoded elements and wraps them
/// in an outer SEQUENCE (or any other constructed tag).
pub struct SequenceBuilder {
    elements: Vec<u8>,
}

impl SequenceBuilder {
    /// Create a new empty [`SequenceBuilder`].
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    /// Append an element that is already DER encoded.
    pub fn add(mut self, encoded: impl AsRef<[u8]>) -> Self {
        self.elements.extend_from_slice(encoded.as_ref());
        self
    }

    #[must_use]
    /// Append the OBJECT IDENTIFIER for a known [`Oid`].
    pub fn oid(self, oid: Oid) -> Self {
        self.add(encode_tlv(TAG_OBJECT_IDENTIFIER, oid.content_bytes()))
    }

    /// Look up an OID by its name and append it.
    ///
    /// Fails with an unsupported algorithm error for any name outside the known table.
    pub fn try_oid_for(self, name: &str) -> Result<Self, JoseError> {
        Ok(self.oid(Oid::from_name(name)?))
    }

    #[must_use]
    /// Append INTEGER 0.
    pub fn zero(self) -> Self {
        self.add([TAG_INTEGER, 0x01, 0x00])
    }

    #[must_use]
    /// Append INTEGER 1.
    pub fn one(self) -> Self {
        self.add([TAG_INTEGER, 0x01, 0x01])
    }

    #[must_use]
    /// Append NULL.
    pub fn null(self) -> Self {
        self.add([TAG_NULL, 0x00])
    }

    #[must_use]
    /// Append a non-negative INTEGER from its big-endian magnitude.
    pub fn unsigned_integer(self, value: &[u8]) -> Self {
        self.add(encode_integer(value))
    }

    #[must_use]
    /// Append an OCTET STRING.
    pub fn octet_string(self, value: &[u8]) -> Self {
        self.add(encode_tlv(TAG_OCTET_STRING, value))
    }

    #[must_use]
    /// Append a BIT STRING without unused bits.
    pub fn bit_string(self, value: &[u8]) -> Self {
        let mut contents = Vec::with_capacity(value.len() + 1);
        contents.push(BIT_STRING_NO_UNUSED_BITS);
        contents.extend_from_slice(value);
        self.add(encode_tlv(TAG_BIT_STRING, &contents))
    }

    /// Wrap all accumulated elements in a SEQUENCE.
    pub fn end(self) -> Vec<u8> {
        self.end_with_tag(TAG_SEQUENCE)
    }

    /// Wrap all accumulated elements in the given constructed tag,
    /// e.g. an explicit context specific tag.
    pub fn end_with_tag(self, tag: u8) -> Vec<u8> {
        encode_tlv(tag, &self.elements)
    }
}

#[cfg(test)]
mod tests {
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    use super::*;
    use crate::der::{Element, parse_element, unsigned_integer};

    #[test]
    fn length_forms() {
        assert_eq!(encode_length(0), vec![0x00]);
        assert_eq!(encode_length(127), vec![0x7f]);
        assert_eq!(encode_length(128), vec![0x81, 0x80]);
        assert_eq!(encode_length(255), vec![0x81, 0xff]);
        assert_eq!(encode_length(256), vec![0x82, 0x01, 0x00]);
        assert_eq!(encode_length(65536), vec![0x83, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn integer_sign_padding() {
        assert_eq!(encode_integer(&[0x7f]), vec![0x02, 0x01, 0x7f]);
        assert_eq!(encode_integer(&[0x80]), vec![0x02, 0x02, 0x00, 0x80]);
        assert_eq!(encode_integer(&[0x00, 0x00, 0x01]), vec![0x02, 0x01, 0x01]);
        assert_eq!(encode_integer(&[]), vec![0x02, 0x01, 0x00]);
        assert_eq!(encode_integer(&[0x01, 0x00, 0x01]), vec![0x02, 0x03, 0x01, 0x00, 0x01]);
    }

    #[test]
    fn sequence_builder_layout() {
        let der = SequenceBuilder::new()
            .zero()
            .one()
            .null()
            .oid(Oid::Ed25519)
            .bit_string(&[0xaa])
            .end();
        assert_eq!(
            der,
            vec![
                0x30, 0x12, //
                0x02, 0x01, 0x00, //
                0x02, 0x01, 0x01, //
                0x05, 0x00, //
                0x06, 0x03, 0x2b, 0x65, 0x70, //
                0x03, 0x02, 0x00, 0xaa,
            ]
        );
    }

    #[test]
    fn oid_lookup_by_name() {
        let der = SequenceBuilder::new().try_oid_for("P-256").unwrap().end();
        assert_eq!(
            der,
            vec![0x30, 0x0a, 0x06, 0x08, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07]
        );

        let err = SequenceBuilder::new().try_oid_for("secp256k1").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::UnsupportedAlgorithm);
    }

    #[test]
    fn long_sequence_uses_long_form() {
        let der = SequenceBuilder::new().octet_string(&[0x11; 300]).end();
        assert_eq!(&der[..4], &[0x30, 0x82, 0x01, 0x30]);
        assert_eq!(der.len(), 4 + 304);
    }

    const OID_NAMES: [&str; 8] = [
        "rsaEncryption",
        "ecPublicKey",
        "P-256",
        "P-384",
        "P-521",
        "X25519",
        "Ed25519",
        "dsa",
    ];

    /// Any element the builder can append, with nested sequences up to two levels deep.
    #[derive(Debug, Clone)]
    enum Child {
        OctetString(Vec<u8>),
        Integer(Vec<u8>),
        BitString(Vec<u8>),
        Oid(&'static str),
        Null,
        Sequence(Vec<Child>),
    }

    impl Child {
        fn arbitrary_at(g: &mut Gen, depth: usize) -> Self {
            let kinds: &[u8] = if depth == 0 { &[0, 1, 2, 3, 4] } else { &[0, 1, 2, 3, 4, 5] };
            match g.choose(kinds).copied().unwrap_or(4) {
                0 => Self::OctetString(Vec::<u8>::arbitrary(g)),
                1 => Self::Integer(Vec::<u8>::arbitrary(g)),
                2 => Self::BitString(Vec::<u8>::arbitrary(g)),
                3 => Self::Oid(g.choose(&OID_NAMES).copied().unwrap_or("P-256")),
                4 => Self::Null,
                _ => {
                    let len = usize::arbitrary(g) % 4;
                    Self::Sequence(
                        (0..len)
                            .map(|_| Self::arbitrary_at(g, depth.saturating_sub(1)))
                            .collect(),
                    )
                }
            }
        }

        fn append(&self, builder: SequenceBuilder) -> SequenceBuilder {
            match self {
                Self::OctetString(value) => builder.octet_string(value),
                Self::Integer(value) => builder.unsigned_integer(value),
                Self::BitString(value) => builder.bit_string(value),
                Self::Oid(name) => builder.try_oid_for(name).unwrap(),
                Self::Null => builder.null(),
                Self::Sequence(children) => builder.add(encode_children(children)),
            }
        }

        fn matches(&self, element: &Element<'_>) -> bool {
            match self {
                Self::OctetString(value) => {
                    element.identifier() == TAG_OCTET_STRING && element.contents() == value.as_slice()
                }
                Self::Integer(value) => {
                    let skip = value.iter().take_while(|b| **b == 0).count();
                    let expected: &[u8] = if skip == value.len() { &[0] } else { &value[skip..] };
                    element.identifier() == TAG_INTEGER
                        && unsigned_integer(element).is_ok_and(|magnitude| magnitude == expected)
                }
                Self::BitString(value) => {
                    element.identifier() == TAG_BIT_STRING
                        && element.contents().split_first()
                            == Some((&BIT_STRING_NO_UNUSED_BITS, value.as_slice()))
                }
                Self::Oid(name) => {
                    element.identifier() == TAG_OBJECT_IDENTIFIER
                        && Oid::from_content(element.contents()).is_ok_and(|oid| oid.name() == *name)
                }
                Self::Null => element.identifier() == TAG_NULL && element.contents().is_empty(),
                Self::Sequence(children) => {
                    element.identifier() == TAG_SEQUENCE && children_match(children, element)
                }
            }
        }
    }

    impl Arbitrary for Child {
        fn arbitrary(g: &mut Gen) -> Self {
            Self::arbitrary_at(g, 2)
        }
    }

    fn encode_children(children: &[Child]) -> Vec<u8> {
        children
            .iter()
            .fold(SequenceBuilder::new(), |builder, child| child.append(builder))
            .end()
    }

    fn children_match(children: &[Child], element: &Element<'_>) -> bool {
        element.children().is_ok_and(|elements| {
            elements.len() == children.len()
                && elements
                    .iter()
                    .zip(children)
                    .all(|(element, child)| child.matches(element))
        })
    }

    #[quickcheck]
    fn sequence_round_trip(children: Vec<Child>) -> bool {
        let der = encode_children(&children);
        parse_element(&der).is_ok_and(|sequence| {
            sequence.byte_length() == der.len()
                && sequence.identifier() == TAG_SEQUENCE
                && children_match(&children, &sequence)
        })
    }
}
