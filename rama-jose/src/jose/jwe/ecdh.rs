//! ECDH-ES key agreement, [`rfc7518, section 4.6`].
//!
//! [`rfc7518, section 4.6`]: https://datatracker.ietf.org/doc/html/rfc7518#section-4.6

use zeroize::Zeroizing;

use crate::{JoseError, key::EllipticCurve, primitives};

/// Output of one SHA-256 round, in bytes.
const HASH_LEN: usize = 32;

fn length_prefixed(out: &mut Vec<u8>, data: &[u8]) {
    // lengths always fit, header values are far below 4 GiB
    out.extend_from_slice(&u32::try_from(data.len()).unwrap_or(u32::MAX).to_be_bytes());
    out.extend_from_slice(data);
}

/// Concat KDF (NIST SP 800-56A, section 5.8.1) with SHA-256.
///
/// `algorithm_id` is the `enc` value for `ECDH-ES` and the `alg` value for
/// the key wrapping variants.
pub(crate) fn concat_kdf(
    shared_secret: &[u8],
    algorithm_id: &str,
    key_len: usize,
    apu: &[u8],
    apv: &[u8],
) -> Zeroizing<Vec<u8>> {
    let mut other_info = Vec::with_capacity(16 + algorithm_id.len() + apu.len() + apv.len());
    length_prefixed(&mut other_info, algorithm_id.as_bytes());
    length_prefixed(&mut other_info, apu);
    length_prefixed(&mut other_info, apv);
    other_info.extend_from_slice(
        &u32::try_from(key_len.saturating_mul(8))
            .unwrap_or(u32::MAX)
            .to_be_bytes(),
    );

    let rounds = key_len.div_ceil(HASH_LEN);
    let mut derived = Zeroizing::new(Vec::with_capacity(rounds * HASH_LEN));
    for counter in 1..=rounds {
        let mut ctx = primitives::sha256_context();
        ctx.update(&u32::try_from(counter).unwrap_or(u32::MAX).to_be_bytes());
        ctx.update(shared_secret);
        ctx.update(&other_info);
        derived.extend_from_slice(ctx.finish().as_ref());
    }
    derived.truncate(key_len);
    derived
}

/// Fail early for curves that can not do key agreement.
pub(crate) fn ensure_agreement_capable(curve: EllipticCurve) -> Result<(), JoseError> {
    if curve.is_agreement_capable() {
        Ok(())
    } else {
        Err(JoseError::unsupported_curve(format!(
            "ECDH-ES can not be used with {curve} keys"
        )))
    }
}

#[cfg(test)]
mod tests {
    use base64::{Engine as _, prelude::BASE64_URL_SAFE_NO_PAD};

    use super::*;

    #[test]
    fn rfc7518_appendix_c() {
        let z = [
            158, 86, 217, 29, 129, 113, 53, 211, 114, 131, 66, 131, 191, 132, 38, 156, 251, 49,
            110, 163, 218, 128, 106, 72, 246, 218, 167, 121, 140, 254, 144, 196,
        ];
        let derived = concat_kdf(&z, "A128GCM", 16, b"Alice", b"Bob");
        assert_eq!(
            BASE64_URL_SAFE_NO_PAD.encode(derived.as_slice()),
            "VqqN6vgjbSBcIijNcacQGg"
        );
    }

    #[test]
    fn multiple_rounds() {
        let derived = concat_kdf(&[0x01; 32], "A256CBC-HS512", 64, b"", b"");
        assert_eq!(derived.len(), 64);
        // the second round is not a copy of the first
        assert_ne!(derived[..32], derived[32..]);
    }

    #[test]
    fn ed25519_is_rejected() {
        let err = ensure_agreement_capable(EllipticCurve::Ed25519).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::UnsupportedCurve);
        ensure_agreement_capable(EllipticCurve::X25519).unwrap();
    }
}
