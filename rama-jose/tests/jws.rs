use rama_jose::{
    ErrorKind, JoseError,
    jose::{
        JWA, JWS, JWSBuilder, JwsVerifyOptions, RecognizedExtensions, SigningKey,
        ToVerifySignature, VerificationKey, Verifier,
    },
    key::{EcPrivateKey, EllipticCurve, SecretKey},
};
use tokio_test::{assert_err, assert_ok};

/// Verifies every signature with the key registered under its `kid`.
struct KeyRing(Vec<(&'static str, VerificationKey)>);

impl Verifier for KeyRing {
    type Error = JoseError;

    fn verify(
        &self,
        payload: &[u8],
        signatures: &[ToVerifySignature],
    ) -> Result<Vec<usize>, Self::Error> {
        for signature in signatures {
            let kid = signature
                .decoded_signature()
                .protected_headers()
                .get_str("kid")
                .unwrap_or_default();
            let (_, key) = self
                .0
                .iter()
                .find(|(id, _)| *id == kid)
                .ok_or_else(|| JoseError::new(ErrorKind::SignatureInvalid, "unknown kid"))?;
            key.verify(payload, std::slice::from_ref(signature))?;
        }
        // every party has to have signed
        Ok((0..signatures.len()).collect())
    }
}

#[test]
fn general_jws_signed_by_many_parties() {
    let hmac = SecretKey::generate(32).unwrap();
    let ec = EcPrivateKey::generate(EllipticCurve::P384).unwrap();

    let jws = JWSBuilder::new()
        .with_payload(r#"{"order":42}"#)
        .add_signature(
            &SigningKey::new(JWA::HS384, hmac.clone())
                .unwrap()
                .with_kid("shop"),
        )
        .unwrap()
        .build(&SigningKey::from_ec_key(ec.clone()).unwrap().with_kid("bank"))
        .unwrap();

    let json = serde_json::to_string(&jws).unwrap();
    let jws: JWS = serde_json::from_str(&json).unwrap();

    let ring = KeyRing(vec![
        ("shop", VerificationKey::new(hmac)),
        ("bank", VerificationKey::new(ec.public_key().clone())),
    ]);
    let decoded = assert_ok!(jws.clone().decode(&ring));
    assert_eq!(decoded.payload(), br#"{"order":42}"#);
    assert_eq!(decoded.signatures().len(), 2);

    let partial = KeyRing(vec![(
        "shop",
        VerificationKey::new(SecretKey::generate(32).unwrap()),
    )]);
    let err = assert_err!(jws.decode(&partial));
    assert_eq!(err.kind(), ErrorKind::SignatureInvalid);
}

#[test]
fn detached_unencoded_payload() {
    let key = SecretKey::generate(32).unwrap();
    let payload = "$.02";

    let jws = JWSBuilder::new()
        .with_payload(payload)
        .try_with_protected_header("b64", false)
        .unwrap()
        .try_with_protected_header("crit", ["b64"])
        .unwrap()
        .build_compact_detached(&SigningKey::new(JWA::HS256, key.clone()).unwrap())
        .unwrap();
    assert_eq!(jws.as_str().split('.').nth(1), Some(""));

    let verifier = VerificationKey::new(key);
    let options = JwsVerifyOptions::default();
    let decoded = assert_ok!(jws.decode_detached(payload, &verifier, &options));
    assert_eq!(decoded.payload(), payload.as_bytes());

    let err = assert_err!(jws.decode_detached("$.03", &verifier, &options));
    assert_eq!(err.kind(), ErrorKind::SignatureInvalid);
}

#[test]
fn application_defined_critical_extension() {
    let key = SecretKey::generate(32).unwrap();
    let audit = RecognizedExtensions::new().with_extension("http://example.com/audit", true);
    let builder = JWSBuilder::new()
        .with_payload("audited")
        .try_with_protected_header("http://example.com/audit", "2026-10-19")
        .unwrap()
        .try_with_protected_header("crit", ["http://example.com/audit"])
        .unwrap();
    let signer = SigningKey::new(JWA::HS256, key.clone()).unwrap();

    let err = assert_err!(builder.clone().build_compact(&signer));
    assert!(matches!(err.kind(), ErrorKind::InvalidHeader(_)));

    let jws = assert_ok!(builder.with_crit(audit.clone()).build_compact(&signer));
    let verifier = VerificationKey::new(key);

    let err = assert_err!(jws.decode(&verifier));
    assert!(matches!(err.kind(), ErrorKind::InvalidHeader(_)));

    let options = JwsVerifyOptions::new().with_crit(audit);
    let decoded = assert_ok!(jws.decode_with_options(&verifier, &options));
    assert_eq!(
        decoded.protected_headers().get_str("http://example.com/audit"),
        Some("2026-10-19")
    );
}
