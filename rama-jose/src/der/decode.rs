use crate::JoseError;

use super::{HIGH_BIT, LENGTH_INDEFINITE, TAG_INTEGER};

/// Low five bits of the identifier octet, `0x1f` announces the high tag number form.
const TAG_NUMBER_MASK: u8 = 0x1f;
/// Bit of the identifier octet that marks a constructed encoding.
const CONSTRUCTED_BIT: u8 = 0x20;
/// Longest high tag number form we accept, enough for any `u32` tag number.
const MAX_TAG_CONTINUATION_OCTETS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A single parsed tag-length-value element.
///
/// All slices borrow from the buffer the element was parsed from.
pub struct Element<'a> {
    identifier: u8,
    tag_number: u32,
    indefinite: bool,
    contents: &'a [u8],
    raw: &'a [u8],
}

impl<'a> Element<'a> {
    /// First identifier octet (class, constructed bit and low tag number).
    pub fn identifier(&self) -> u8 {
        self.identifier
    }

    /// Tag number, decoded from the high tag number form where needed.
    pub fn tag_number(&self) -> u32 {
        self.tag_number
    }

    /// Returns true if the constructed bit is set.
    pub fn is_constructed(&self) -> bool {
        self.identifier & CONSTRUCTED_BIT != 0
    }

    /// Returns true if the element used the BER indefinite length form.
    pub fn is_indefinite(&self) -> bool {
        self.indefinite
    }

    /// Content octets, excluding the end-of-contents marker of indefinite elements.
    pub fn contents(&self) -> &'a [u8] {
        self.contents
    }

    /// The complete encoding of this element, including identifier and length octets.
    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    /// Total encoded length, use it to advance a cursor past this element.
    pub fn byte_length(&self) -> usize {
        self.raw.len()
    }

    /// Parse the content octets of this (constructed) element.
    pub fn children(&self) -> Result<Vec<Self>, JoseError> {
        parse_elements(self.contents)
    }

    /// Fail unless this element carries the given identifier octet.
    pub(crate) fn expect(self, identifier: u8, what: &'static str) -> Result<Self, JoseError> {
        if self.identifier == identifier {
            Ok(self)
        } else {
            Err(JoseError::invalid_asn1(format!(
                "expected {what} (tag {identifier:#04x}), found tag {:#04x}",
                self.identifier
            )))
        }
    }
}

enum Length {
    Definite(usize),
    Indefinite,
}

struct Header {
    identifier: u8,
    tag_number: u32,
    length: Length,
    /// Number of identifier and length octets.
    size: usize,
}

fn truncated() -> JoseError {
    JoseError::invalid_asn1("truncated DER input")
}

fn parse_header(input: &[u8]) -> Result<Header, JoseError> {
    let identifier = *input.first().ok_or_else(truncated)?;
    let mut position = 1;

    let mut tag_number = u32::from(identifier & TAG_NUMBER_MASK);
    if tag_number == u32::from(TAG_NUMBER_MASK) {
        tag_number = 0;
        let mut octets = 0;
        loop {
            let octet = *input.get(position).ok_or_else(truncated)?;
            position += 1;
            octets += 1;
            if octets > MAX_TAG_CONTINUATION_OCTETS {
                return Err(JoseError::invalid_asn1("tag number too large"));
            }
            tag_number = (tag_number << 7) | u32::from(octet & !HIGH_BIT);
            if octet & HIGH_BIT == 0 {
                break;
            }
        }
    }

    let first = *input.get(position).ok_or_else(truncated)?;
    position += 1;
    let length = if first < HIGH_BIT {
        Length::Definite(usize::from(first))
    } else if first == LENGTH_INDEFINITE {
        Length::Indefinite
    } else {
        let digits = usize::from(first & !HIGH_BIT);
        if first == 0xff || digits > size_of::<usize>() {
            return Err(JoseError::invalid_asn1("malformed length encoding"));
        }
        let length_octets = input
            .get(position..position + digits)
            .ok_or_else(truncated)?;
        position += digits;
        let length = length_octets
            .iter()
            .try_fold(0usize, |acc, octet| {
                acc.checked_mul(256)?.checked_add(usize::from(*octet))
            })
            .ok_or_else(|| JoseError::invalid_asn1("malformed length encoding"))?;
        Length::Definite(length)
    };

    Ok(Header {
        identifier,
        tag_number,
        length,
        size: position,
    })
}

/// Find the end-of-contents marker of an indefinite length element.
///
/// `input` starts at the first content octet. Returns the number of content
/// octets preceding the marker. Nested elements are skipped by their header,
/// so `00 00` pairs inside primitive contents never terminate the scan, and
/// each nested indefinite element raises the depth until its own marker.
fn indefinite_content_length(input: &[u8]) -> Result<usize, JoseError> {
    let mut position = 0usize;
    let mut depth = 0usize;

    loop {
        let rest = input.get(position..).ok_or_else(truncated)?;
        match rest {
            [0, 0, ..] if depth == 0 => return Ok(position),
            [0, 0, ..] => {
                depth -= 1;
                position += 2;
            }
            [] | [_] => return Err(truncated()),
            _ => {
                let header = parse_header(rest)?;
                position += header.size;
                match header.length {
                    Length::Indefinite => depth += 1,
                    Length::Definite(length) => {
                        position = position.checked_add(length).ok_or_else(truncated)?;
                        if position > input.len() {
                            return Err(truncated());
                        }
                    }
                }
            }
        }
    }
}

/// Parse the element at the start of `input`.
///
/// Trailing bytes after the element are ignored, use [`Element::byte_length`]
/// to continue with the next element.
pub fn parse_element(input: &[u8]) -> Result<Element<'_>, JoseError> {
    let header = parse_header(input)?;
    let body = input.get(header.size..).ok_or_else(truncated)?;

    let (contents, byte_length, indefinite) = match header.length {
        Length::Definite(length) => {
            let contents = body.get(..length).ok_or_else(truncated)?;
            (contents, header.size + length, false)
        }
        Length::Indefinite => {
            let length = indefinite_content_length(body)?;
            let contents = body.get(..length).ok_or_else(truncated)?;
            (contents, header.size + length + 2, true)
        }
    };

    Ok(Element {
        identifier: header.identifier,
        tag_number: header.tag_number,
        indefinite,
        contents,
        raw: input.get(..byte_length).ok_or_else(truncated)?,
    })
}

/// Parse all consecutive elements in `input`.
pub fn parse_elements(input: &[u8]) -> Result<Vec<Element<'_>>, JoseError> {
    let mut elements = Vec::new();
    let mut next = 0;

    while let Some(rest) = input.get(next..).filter(|rest| !rest.is_empty()) {
        let element = parse_element(rest).inspect_err(|err| {
            tracing::trace!("failed to parse DER element at offset {next}: {err}");
        })?;
        next += element.byte_length();
        elements.push(element);
    }

    Ok(elements)
}

/// Content octets of a non-negative INTEGER with the sign padding removed.
pub fn unsigned_integer<'a>(element: &Element<'a>) -> Result<&'a [u8], JoseError> {
    let element = element.expect(TAG_INTEGER, "INTEGER")?;
    match element.contents() {
        [] => Err(JoseError::invalid_asn1("empty INTEGER")),
        [first, ..] if first & HIGH_BIT != 0 => {
            Err(JoseError::invalid_asn1("negative INTEGER where unsigned expected"))
        }
        [0, rest @ ..] if !rest.is_empty() => Ok(rest),
        contents => Ok(contents),
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::assert_err;

    use super::*;
    use crate::ErrorKind;

    #[test]
    fn parse_short_form() {
        let input = [0x02, 0x01, 0x05, 0xff];
        let element = parse_element(&input).unwrap();
        assert_eq!(element.identifier(), 0x02);
        assert_eq!(element.tag_number(), 2);
        assert_eq!(element.contents(), &[0x05]);
        assert_eq!(element.byte_length(), 3);
        assert!(!element.is_constructed());
    }

    #[test]
    fn parse_long_form() {
        let mut input = vec![0x04, 0x81, 0xc8];
        input.extend(std::iter::repeat_n(0xab, 200));
        let element = parse_element(&input).unwrap();
        assert_eq!(element.contents().len(), 200);
        assert_eq!(element.byte_length(), 203);

        let mut input = vec![0x04, 0x82, 0x01, 0x2c];
        input.extend(std::iter::repeat_n(0xab, 300));
        let element = parse_element(&input).unwrap();
        assert_eq!(element.contents().len(), 300);
    }

    #[test]
    fn parse_high_tag_number() {
        // [APPLICATION 201] primitive, tag number 201 = 0x81 0x49
        let input = [0x5f, 0x81, 0x49, 0x01, 0x07];
        let element = parse_element(&input).unwrap();
        assert_eq!(element.tag_number(), 201);
        assert_eq!(element.contents(), &[0x07]);
        assert_eq!(element.byte_length(), 5);
    }

    #[test]
    fn parse_indefinite_length() {
        let input = [0x30, 0x80, 0x02, 0x01, 0x01, 0x00, 0x00];
        let element = parse_element(&input).unwrap();
        assert!(element.is_indefinite());
        assert_eq!(element.contents(), &[0x02, 0x01, 0x01]);
        assert_eq!(element.byte_length(), input.len());
    }

    #[test]
    fn parse_nested_indefinite_length() {
        let input = [
            0x30, 0x80, // outer, indefinite
            0x30, 0x80, // nested, indefinite
            0x02, 0x01, 0x01, // INTEGER 1
            0x00, 0x00, // end of nested
            0x02, 0x01, 0x02, // INTEGER 2
            0x00, 0x00, // end of outer
            0x05, 0x00, // trailing NULL, not part of the element
        ];
        let element = parse_element(&input).unwrap();
        assert_eq!(element.byte_length(), 14);
        let children = element.children().unwrap();
        assert_eq!(children.len(), 2);
        assert!(children[0].is_indefinite());
        assert_eq!(children[0].contents(), &[0x02, 0x01, 0x01]);
        assert_eq!(children[1].contents(), &[0x02]);
    }

    #[test]
    fn parse_deeply_nested_indefinite_length() {
        let mut input = Vec::new();
        for _ in 0..5 {
            input.extend([0x30, 0x80]);
        }
        input.extend([0x04, 0x02, 0x00, 0x00]);
        for _ in 0..5 {
            input.extend([0x00, 0x00]);
        }
        let element = parse_element(&input).unwrap();
        assert_eq!(element.byte_length(), input.len());
        assert_eq!(element.contents().len(), input.len() - 4);
    }

    #[test]
    fn zero_pair_inside_primitive_does_not_terminate() {
        let input = [0x30, 0x80, 0x04, 0x02, 0x00, 0x00, 0x00, 0x00];
        let element = parse_element(&input).unwrap();
        assert_eq!(element.contents(), &[0x04, 0x02, 0x00, 0x00]);
    }

    #[test]
    fn truncated_inputs_are_rejected() {
        for input in [
            &[][..],
            &[0x30],
            &[0x30, 0x05, 0x02],
            &[0x30, 0x82, 0x01],
            &[0x30, 0x80, 0x02, 0x01, 0x01],
            &[0x30, 0x80, 0x30, 0x80, 0x00, 0x00],
            &[0x5f, 0x81],
        ] {
            let err = parse_element(input).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidAsn1, "input: {input:02x?}");
        }
    }

    #[test]
    fn malformed_lengths_are_rejected() {
        let err = parse_element(&[0x30, 0xff, 0x00]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAsn1);

        let err = parse_element(&[0x30, 0x89, 1, 1, 1, 1, 1, 1, 1, 1, 1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAsn1);

        let err = parse_element(&[0x30, 0x88, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidAsn1);
    }

    #[test]
    fn parse_consecutive_elements() {
        let input = [0x02, 0x01, 0x00, 0x05, 0x00, 0x04, 0x01, 0xaa];
        let elements = parse_elements(&input).unwrap();
        assert_eq!(elements.len(), 3);
        assert_eq!(elements[1].identifier(), 0x05);
        assert_eq!(elements[2].raw(), &[0x04, 0x01, 0xaa]);
    }

    #[test]
    fn unsigned_integer_strips_sign_padding() {
        let element = parse_element(&[0x02, 0x02, 0x00, 0x80]).unwrap();
        assert_eq!(unsigned_integer(&element).unwrap(), &[0x80]);

        let element = parse_element(&[0x02, 0x01, 0x00]).unwrap();
        assert_eq!(unsigned_integer(&element).unwrap(), &[0x00]);

        let element = parse_element(&[0x02, 0x01, 0x80]).unwrap();
        assert_err!(unsigned_integer(&element));
    }
}
