use aws_lc_rs::{
    encoding::{AsDer, Pkcs8V1Der},
    rsa,
};
use rama_jose::{
    ErrorKind,
    jose::{
        ContentEncryptionAlgorithm, JWE, JWEBuilder, JWECompact, JweDecryptOptions,
        KeyManagementAlgorithm, Recipient,
        jwe::{KeyManagementOptions, produce_cek},
    },
    key::{EcPrivateKey, EllipticCurve, JoseKey, RsaPrivateKey, SecretKey},
};
use tokio_test::assert_ok;

const PLAINTEXT: &[u8] = b"Live long and prosper.";

fn rsa_key() -> RsaPrivateKey {
    let key_pair = rsa::KeyPair::generate(rsa::KeySize::Rsa2048).unwrap();
    let pkcs8 = AsDer::<Pkcs8V1Der<'static>>::as_der(&key_pair).unwrap();
    RsaPrivateKey::from_pkcs8(pkcs8.as_ref()).unwrap()
}

fn compact(
    alg: KeyManagementAlgorithm,
    enc: ContentEncryptionAlgorithm,
    recipient: &Recipient,
) -> JWECompact {
    JWEBuilder::new()
        .with_plaintext(PLAINTEXT)
        .try_with_protected_header("alg", alg)
        .unwrap()
        .try_with_protected_header("enc", enc)
        .unwrap()
        .build_compact(recipient)
        .unwrap()
}

/// Encrypt then decrypt with every content encryption algorithm.
fn round_trip(alg: KeyManagementAlgorithm, encrypt_with: JoseKey, decrypt_with: JoseKey) {
    for enc in [
        ContentEncryptionAlgorithm::A128Gcm,
        ContentEncryptionAlgorithm::A256Gcm,
        ContentEncryptionAlgorithm::A128CbcHs256,
        ContentEncryptionAlgorithm::A256CbcHs512,
    ] {
        let token = compact(alg, enc, &Recipient::new(encrypt_with.clone()));
        let decrypted = token.decrypt(&decrypt_with).unwrap();
        assert_eq!(decrypted.plaintext(), PLAINTEXT, "{alg} {enc}");
        assert_eq!(decrypted.key_management_algorithm(), alg);
        assert_eq!(decrypted.content_encryption_algorithm(), enc);
    }
}

#[test]
fn rsa_key_transport() {
    let key = rsa_key();
    for alg in [
        KeyManagementAlgorithm::Rsa1_5,
        KeyManagementAlgorithm::RsaOaep,
        KeyManagementAlgorithm::RsaOaep256,
        KeyManagementAlgorithm::RsaOaep384,
        KeyManagementAlgorithm::RsaOaep512,
    ] {
        round_trip(alg, key.public_key().clone().into(), key.clone().into());
    }
}

#[test]
fn aes_and_aes_gcm_key_wrap() {
    for (alg, len) in [
        (KeyManagementAlgorithm::A128Kw, 16),
        (KeyManagementAlgorithm::A256Kw, 32),
        (KeyManagementAlgorithm::A128GcmKw, 16),
        (KeyManagementAlgorithm::A256GcmKw, 32),
    ] {
        let key = SecretKey::generate(len).unwrap();
        round_trip(alg, key.clone().into(), key.into());
    }
}

#[test]
fn direct_encryption() {
    for enc in [
        ContentEncryptionAlgorithm::A128Gcm,
        ContentEncryptionAlgorithm::A256CbcHs512,
    ] {
        let key = SecretKey::generate(enc.cek_len()).unwrap();
        let token = compact(KeyManagementAlgorithm::Dir, enc, &Recipient::new(key.clone()));
        // no encrypted key for direct encryption
        assert_eq!(token.as_str().split('.').nth(1), Some(""));
        let decrypted = token.decrypt(&key.into()).unwrap();
        assert_eq!(decrypted.plaintext(), PLAINTEXT);
    }
}

#[test]
fn direct_key_must_match_cek_length() {
    let key = SecretKey::generate(16).unwrap();
    let err = JWEBuilder::new()
        .with_plaintext(PLAINTEXT)
        .try_with_protected_header("alg", "dir")
        .unwrap()
        .try_with_protected_header("enc", "A256GCM")
        .unwrap()
        .build_compact(&Recipient::new(key))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidKey);
}

#[test]
fn direct_cek_is_the_key() {
    let key = SecretKey::generate(32).unwrap();
    let produced = produce_cek(
        KeyManagementAlgorithm::Dir,
        ContentEncryptionAlgorithm::A256Gcm,
        &key.clone().into(),
        None,
        &KeyManagementOptions::new(),
    )
    .unwrap();
    assert_eq!(produced.cek(), key.as_bytes());
    assert!(produced.encrypted_key().is_none());
}

#[test]
fn ecdh_key_agreement() {
    for curve in [
        EllipticCurve::P256,
        EllipticCurve::P384,
        EllipticCurve::P521,
        EllipticCurve::X25519,
    ] {
        let key = EcPrivateKey::generate(curve).unwrap();
        for alg in [
            KeyManagementAlgorithm::EcdhEs,
            KeyManagementAlgorithm::EcdhEsA128Kw,
            KeyManagementAlgorithm::EcdhEsA256Kw,
        ] {
            round_trip(alg, key.public_key().clone().into(), key.clone().into());
        }
    }
}

#[test]
fn ecdh_uses_a_fresh_ephemeral_key() {
    let key = EcPrivateKey::generate(EllipticCurve::P256).unwrap();
    let recipient = Recipient::new(key.public_key().clone());
    let first = compact(
        KeyManagementAlgorithm::EcdhEs,
        ContentEncryptionAlgorithm::A128Gcm,
        &recipient,
    );
    let second = compact(
        KeyManagementAlgorithm::EcdhEs,
        ContentEncryptionAlgorithm::A128Gcm,
        &recipient,
    );

    let key = JoseKey::from(key);
    let epk = |token: &JWECompact| {
        token
            .decrypt(&key)
            .unwrap()
            .protected_headers()
            .get("epk")
            .cloned()
            .unwrap()
    };
    assert_ne!(epk(&first), epk(&second));
}

#[test]
fn ecdh_party_info_is_bound() {
    let key = EcPrivateKey::generate(EllipticCurve::P384).unwrap();
    let recipient = Recipient::new(key.public_key().clone()).with_options(
        KeyManagementOptions::new()
            .with_apu(b"Alice".to_vec())
            .with_apv(b"Bob".to_vec()),
    );
    let token = compact(
        KeyManagementAlgorithm::EcdhEsA128Kw,
        ContentEncryptionAlgorithm::A128Gcm,
        &recipient,
    );
    let decrypted = token.decrypt(&key.into()).unwrap();
    assert_eq!(
        decrypted.protected_headers().get_str("apu"),
        Some("QWxpY2U")
    );
    assert_eq!(decrypted.protected_headers().get_str("apv"), Some("Qm9i"));
}

#[test]
fn pbes2_password_based() {
    for alg in [
        KeyManagementAlgorithm::Pbes2Hs256A128Kw,
        KeyManagementAlgorithm::Pbes2Hs512A256Kw,
    ] {
        let password = SecretKey::from("correct horse battery staple");
        let recipient = Recipient::new(password.clone())
            .with_options(KeyManagementOptions::new().with_p2c(1000));
        let token = compact(alg, ContentEncryptionAlgorithm::A128CbcHs256, &recipient);
        let decrypted = token.decrypt(&password.into()).unwrap();
        assert_eq!(decrypted.plaintext(), PLAINTEXT);
        assert_eq!(
            decrypted.protected_headers().get("p2c"),
            Some(&serde_json::json!(1000))
        );

        let err = token
            .decrypt(&SecretKey::from("Tr0ub4dor&3").into())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecryptionFailed);
    }
}

#[test]
fn pbes2_count_above_maximum_is_rejected() {
    let password = SecretKey::from("password");
    let recipient =
        Recipient::new(password.clone()).with_options(KeyManagementOptions::new().with_p2c(20_000));
    let token = compact(
        KeyManagementAlgorithm::Pbes2Hs256A128Kw,
        ContentEncryptionAlgorithm::A128Gcm,
        &recipient,
    );

    let password = JoseKey::from(password);
    let err = token.decrypt(&password).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidHeader(_)));

    let options = JweDecryptOptions::new().with_max_pbes2_count(20_000);
    assert_ok!(token.decrypt_with_options(&password, &options));
}

#[test]
fn wrong_key_failures_are_uniform() {
    let wrap_key = SecretKey::generate(16).unwrap();
    let ec_key = EcPrivateKey::generate(EllipticCurve::P256).unwrap();
    let rsa = rsa_key();

    let tokens = [
        (
            compact(
                KeyManagementAlgorithm::A128Kw,
                ContentEncryptionAlgorithm::A128Gcm,
                &Recipient::new(wrap_key),
            ),
            JoseKey::from(SecretKey::generate(16).unwrap()),
        ),
        (
            compact(
                KeyManagementAlgorithm::EcdhEs,
                ContentEncryptionAlgorithm::A128Gcm,
                &Recipient::new(ec_key.public_key().clone()),
            ),
            JoseKey::from(EcPrivateKey::generate(EllipticCurve::P256).unwrap()),
        ),
        (
            compact(
                KeyManagementAlgorithm::RsaOaep256,
                ContentEncryptionAlgorithm::A128Gcm,
                &Recipient::new(rsa.public_key().clone()),
            ),
            JoseKey::from(rsa_key()),
        ),
    ];

    let messages: Vec<String> = tokens
        .iter()
        .map(|(token, key)| {
            let err = token.decrypt(key).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::DecryptionFailed);
            err.to_string()
        })
        .collect();
    assert!(messages.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn general_serialization_for_many_recipients() {
    let aes = SecretKey::generate(32).unwrap();
    let ec = EcPrivateKey::generate(EllipticCurve::X25519).unwrap();
    let rsa = rsa_key();

    let jwe = JWEBuilder::new()
        .with_plaintext(PLAINTEXT)
        .with_aad(b"shared context")
        .try_with_protected_header("enc", "A256GCM")
        .unwrap()
        .build_jwe(&[
            Recipient::new(aes.clone())
                .try_with_header("alg", "A256KW")
                .unwrap()
                .try_with_header("kid", "aes")
                .unwrap(),
            Recipient::new(ec.public_key().clone())
                .try_with_header("alg", "ECDH-ES+A256KW")
                .unwrap(),
            Recipient::new(rsa.public_key().clone())
                .try_with_header("alg", "RSA-OAEP-256")
                .unwrap(),
        ])
        .unwrap();
    assert_eq!(jwe.recipient_count(), 3);

    let json = serde_json::to_string(&jwe).unwrap();
    let jwe: JWE = serde_json::from_str(&json).unwrap();

    for key in [
        JoseKey::from(aes),
        JoseKey::from(ec),
        JoseKey::from(rsa),
    ] {
        let decrypted = jwe.decrypt(&key).unwrap();
        assert_eq!(decrypted.plaintext(), PLAINTEXT);
        assert_eq!(decrypted.aad(), Some(&b"shared context"[..]));
    }

    let err = jwe
        .decrypt(&SecretKey::generate(32).unwrap().into())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DecryptionFailed);
}

#[test]
fn flattened_to_compact() {
    let key = SecretKey::generate(16).unwrap();
    let flattened = JWEBuilder::new()
        .with_plaintext(PLAINTEXT)
        .try_with_protected_header("alg", "A128GCMKW")
        .unwrap()
        .try_with_protected_header("enc", "A128GCM")
        .unwrap()
        .build_flattened(&Recipient::new(key.clone()))
        .unwrap();

    let compact = flattened.as_compact().unwrap();
    let key = JoseKey::from(key);
    assert_eq!(compact.decrypt(&key).unwrap().plaintext(), PLAINTEXT);
    assert_eq!(flattened.decrypt(&key).unwrap().plaintext(), PLAINTEXT);
}

#[test]
fn algorithm_allow_lists() {
    let key = SecretKey::generate(16).unwrap();
    let token = compact(
        KeyManagementAlgorithm::A128Kw,
        ContentEncryptionAlgorithm::A128Gcm,
        &Recipient::new(key.clone()),
    );
    let key = JoseKey::from(key);

    let options = JweDecryptOptions::new().with_key_management_algorithms(["A256KW"]);
    let err = token.decrypt_with_options(&key, &options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedAlgorithm);

    let options = JweDecryptOptions::new().with_content_encryption_algorithms(["A256GCM"]);
    let err = token.decrypt_with_options(&key, &options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedAlgorithm);

    let options = JweDecryptOptions::new()
        .with_key_management_algorithms(["A128KW"])
        .with_content_encryption_algorithms(["A128GCM"]);
    assert_ok!(token.decrypt_with_options(&key, &options));
}
