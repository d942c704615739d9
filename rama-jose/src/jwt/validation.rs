use jiff::{SignedDuration, Timestamp};
use serde_json::Value;

use crate::{
    JoseError,
    jose::{
        Headers, JWECompact, JWSCompact, JweDecryptOptions, JwsVerifyOptions, Verifier,
    },
    key::JoseKey,
};

use super::JwtClaims;

const TIMESTAMP_CLAIMS: &[&str] = &["exp", "nbf", "iat", "auth_time"];
const STRING_CLAIMS: &[&str] = &["iss", "sub", "jti", "nonce", "acr", "azp"];
const STRING_OR_ARRAY_CLAIMS: &[&str] = &["aud", "amr"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Policy a JWT Claims Set is validated against.
///
/// Every option is independent. Without any option set only the shape of the
/// registered claims and the `exp`, `nbf` and `iat` times are checked.
pub struct JwtClaimsValidation {
    now: Option<Timestamp>,
    clock_tolerance: SignedDuration,
    issuer: Option<String>,
    audience: Option<Vec<String>>,
    subject: Option<String>,
    jti: Option<String>,
    nonce: Option<String>,
    typ: Option<String>,
    max_token_age: Option<SignedDuration>,
    max_auth_age: Option<SignedDuration>,
    ignore_exp: bool,
    ignore_nbf: bool,
    ignore_iat: bool,
    required_claims: Vec<String>,
}

macro_rules! option_setter {
    ($(#[$doc:meta])* $field:ident: $ty:ty, $with:ident, $set:ident) => {
        #[must_use]
        $(#[$doc])*
        pub fn $with(mut self, value: $ty) -> Self {
            self.$set(value);
            self
        }

        $(#[$doc])*
        pub fn $set(&mut self, value: $ty) -> &mut Self {
            self.$field = value.into();
            self
        }
    };
}

macro_rules! string_setter {
    ($(#[$doc:meta])* $field:ident, $with:ident, $set:ident) => {
        #[must_use]
        $(#[$doc])*
        pub fn $with(mut self, value: impl Into<String>) -> Self {
            self.$set(value);
            self
        }

        $(#[$doc])*
        pub fn $set(&mut self, value: impl Into<String>) -> &mut Self {
            self.$field = Some(value.into());
            self
        }
    };
}

fn seconds(timestamp: Timestamp) -> f64 {
    // whole seconds, fractional claims compare against the start of the second
    timestamp.as_second() as f64
}

fn is_non_empty_string(value: &Value) -> bool {
    value.as_str().is_some_and(|value| !value.is_empty())
}

/// Registered claims must have their registered shape, whatever the policy.
fn check_shapes(claims: &JwtClaims) -> Result<(), JoseError> {
    for claim in TIMESTAMP_CLAIMS {
        if let Some(value) = claims.get(claim)
            && !value.is_number()
        {
            return Err(JoseError::claim_invalid(
                *claim,
                format!("\"{claim}\" claim must be a number"),
            ));
        }
    }
    for claim in STRING_CLAIMS {
        if let Some(value) = claims.get(claim)
            && !is_non_empty_string(value)
        {
            return Err(JoseError::claim_invalid(
                *claim,
                format!("\"{claim}\" claim must be a string"),
            ));
        }
    }
    for claim in STRING_OR_ARRAY_CLAIMS {
        let valid = match claims.get(claim) {
            None => true,
            Some(Value::Array(values)) => {
                !values.is_empty() && values.iter().all(is_non_empty_string)
            }
            Some(value) => is_non_empty_string(value),
        };
        if !valid {
            return Err(JoseError::claim_invalid(
                *claim,
                format!("\"{claim}\" claim must be a string or array of strings"),
            ));
        }
    }
    Ok(())
}

fn normalize_typ(typ: &str) -> String {
    let typ = typ.to_ascii_lowercase();
    match typ.strip_prefix("application/") {
        Some(subtype) => subtype.to_owned(),
        None => typ,
    }
}

fn claim_seconds(claims: &JwtClaims, claim: &str) -> Option<f64> {
    claims.get(claim).and_then(Value::as_f64)
}

impl JwtClaimsValidation {
    /// Create a policy with no options set.
    pub fn new() -> Self {
        Self::default()
    }

    option_setter!(
        /// Reference instant for the time checks, the current time when not set.
        now: Timestamp, with_now, set_now
    );

    option_setter!(
        /// Leeway applied to every time check.
        clock_tolerance: SignedDuration, with_clock_tolerance, set_clock_tolerance
    );

    string_setter!(
        /// Expected `iss` (Issuer).
        issuer, with_issuer, set_issuer
    );

    string_setter!(
        /// Expected `sub` (Subject).
        subject, with_subject, set_subject
    );

    string_setter!(
        /// Expected `jti` (JWT ID).
        jti, with_jti, set_jti
    );

    string_setter!(
        /// Expected `nonce`.
        nonce, with_nonce, set_nonce
    );

    string_setter!(
        /// Expected `typ` protected header, compared case insensitively without `application/`.
        typ, with_typ, set_typ
    );

    option_setter!(
        /// Maximum time since `iat`, requires the `iat` claim.
        max_token_age: SignedDuration, with_max_token_age, set_max_token_age
    );

    option_setter!(
        /// Maximum time since `auth_time`, requires the `auth_time` claim.
        max_auth_age: SignedDuration, with_max_auth_age, set_max_auth_age
    );

    option_setter!(
        /// Skip the `exp` check.
        ignore_exp: bool, with_ignore_exp, set_ignore_exp
    );

    option_setter!(
        /// Skip the `nbf` check.
        ignore_nbf: bool, with_ignore_nbf, set_ignore_nbf
    );

    option_setter!(
        /// Skip the `iat` check, can not be combined with a maximum token age.
        ignore_iat: bool, with_ignore_iat, set_ignore_iat
    );

    #[must_use]
    /// Accept the token if its `aud` contains this audience.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.set_audience(audience);
        self
    }

    /// Accept the token if its `aud` contains this audience.
    pub fn set_audience(&mut self, audience: impl Into<String>) -> &mut Self {
        self.audience = Some(vec![audience.into()]);
        self
    }

    #[must_use]
    /// Accept the token if its `aud` contains any of these audiences.
    pub fn with_audiences<A: Into<String>>(mut self, audiences: impl IntoIterator<Item = A>) -> Self {
        self.set_audiences(audiences);
        self
    }

    /// Accept the token if its `aud` contains any of these audiences.
    pub fn set_audiences<A: Into<String>>(
        &mut self,
        audiences: impl IntoIterator<Item = A>,
    ) -> &mut Self {
        self.audience = Some(audiences.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    /// Claims that must be present, whatever their value.
    pub fn with_required_claims<A: Into<String>>(
        mut self,
        claims: impl IntoIterator<Item = A>,
    ) -> Self {
        self.set_required_claims(claims);
        self
    }

    /// Claims that must be present, whatever their value.
    pub fn set_required_claims<A: Into<String>>(
        &mut self,
        claims: impl IntoIterator<Item = A>,
    ) -> &mut Self {
        self.required_claims = claims.into_iter().map(Into::into).collect();
        self
    }

    /// Fails for option combinations that make no sense, before any token is looked at.
    pub fn check_configuration(&self) -> Result<(), JoseError> {
        if self.ignore_iat && self.max_token_age.is_some() {
            return Err(JoseError::configuration(
                "ignore_iat and max_token_age can not be used together",
            ));
        }
        for (name, age) in [
            ("clock_tolerance", Some(self.clock_tolerance)),
            ("max_token_age", self.max_token_age),
            ("max_auth_age", self.max_auth_age),
        ] {
            if age.is_some_and(|age| age.is_negative()) {
                return Err(JoseError::configuration(format!(
                    "{name} can not be negative"
                )));
            }
        }
        Ok(())
    }

    fn required(&self) -> impl Iterator<Item = &str> {
        let implied = [
            self.issuer.as_ref().map(|_| "iss"),
            self.subject.as_ref().map(|_| "sub"),
            self.audience.as_ref().map(|_| "aud"),
            self.jti.as_ref().map(|_| "jti"),
            self.nonce.as_ref().map(|_| "nonce"),
        ];
        self.required_claims
            .iter()
            .map(String::as_str)
            .chain(implied.into_iter().flatten())
    }

    /// Validate a claims set, `protected` is the protected header it came with.
    pub fn validate(&self, claims: &JwtClaims, protected: &Headers) -> Result<(), JoseError> {
        self.check_configuration()?;

        if let Some(expected) = &self.typ {
            let matches = protected
                .get_str("typ")
                .is_some_and(|typ| normalize_typ(typ) == normalize_typ(expected));
            if !matches {
                return Err(JoseError::claim_invalid(
                    "typ",
                    "unexpected \"typ\" JWT header value",
                ));
            }
        }

        if let Some(missing) = self.required().find(|claim| claims.get(claim).is_none()) {
            return Err(JoseError::claim_invalid(
                missing.to_owned(),
                format!("missing required \"{missing}\" claim"),
            ));
        }

        check_shapes(claims)?;
        self.check_times(claims)?;

        for (claim, option, expected) in [
            ("iss", "issuer", &self.issuer),
            ("sub", "subject", &self.subject),
            ("jti", "jti", &self.jti),
            ("nonce", "nonce", &self.nonce),
        ] {
            if let Some(expected) = expected
                && claims.get(claim).and_then(Value::as_str) != Some(expected.as_str())
            {
                return Err(JoseError::claim_invalid(claim, format!("{option} mismatch")));
            }
        }

        if let Some(expected) = &self.audience {
            let audience = claims.audience();
            if !expected.iter().any(|aud| audience.contains(&aud.as_str())) {
                return Err(JoseError::claim_invalid("aud", "audience mismatch"));
            }
        }

        Ok(())
    }

    /// Time based checks, all widened by the clock tolerance.
    ///
    /// Expiry is inclusive: a token with `exp` equal to now minus the
    /// tolerance is expired, so `exp == now` fails without a tolerance.
    /// `nbf` and `iat` only fail strictly after now plus the tolerance.
    fn check_times(&self, claims: &JwtClaims) -> Result<(), JoseError> {
        let now = seconds(self.now.unwrap_or_else(Timestamp::now));
        let tolerance = self.clock_tolerance.as_secs_f64();

        if !self.ignore_exp
            && let Some(exp) = claim_seconds(claims, "exp")
            && exp <= now - tolerance
        {
            return Err(JoseError::claim_invalid("exp", "token is expired"));
        }

        if !self.ignore_nbf
            && let Some(nbf) = claim_seconds(claims, "nbf")
            && nbf > now + tolerance
        {
            return Err(JoseError::claim_invalid("nbf", "token is not active yet"));
        }

        if !self.ignore_iat
            && let Some(iat) = claim_seconds(claims, "iat")
            && iat > now + tolerance
        {
            return Err(JoseError::claim_invalid("iat", "token issued in the future"));
        }

        if let Some(max_age) = self.max_token_age {
            let iat = claim_seconds(claims, "iat")
                .ok_or_else(|| JoseError::claim_invalid("iat", "missing iat claim"))?;
            if now - iat - tolerance > max_age.as_secs_f64() {
                return Err(JoseError::claim_invalid("iat", "maxTokenAge exceeded"));
            }
        }

        if let Some(max_age) = self.max_auth_age {
            let auth_time = claim_seconds(claims, "auth_time")
                .ok_or_else(|| JoseError::claim_invalid("auth_time", "missing auth_time"))?;
            if now - auth_time - tolerance > max_age.as_secs_f64() {
                return Err(JoseError::claim_invalid(
                    "auth_time",
                    "too much time has elapsed since the last End-User authentication",
                ));
            }
        }

        Ok(())
    }

    /// Verify a signed JWT and validate its claims.
    pub fn verify(
        &self,
        token: &JWSCompact,
        verifier: &impl Verifier,
    ) -> Result<VerifiedJwt, JoseError> {
        self.verify_with_options(token, verifier, &JwsVerifyOptions::default())
    }

    /// Verify a signed JWT with custom JWS options and validate its claims.
    pub fn verify_with_options(
        &self,
        token: &JWSCompact,
        verifier: &impl Verifier,
        options: &JwsVerifyOptions,
    ) -> Result<VerifiedJwt, JoseError> {
        self.check_configuration()?;
        let decoded = token.decode_with_options(verifier, options)?;
        let protected = decoded.protected_headers().clone();
        if protected.get("b64").and_then(Value::as_bool) == Some(false) {
            return Err(JoseError::jwt_invalid("JWTs MUST NOT use unencoded payload"));
        }

        let claims = JwtClaims::from_payload(decoded.payload())?;
        self.validate(&claims, &protected)
            .inspect_err(|err| tracing::debug!("JWT claims rejected: {err}"))?;
        tracing::trace!("JWT verified, {} claims", claims.as_map().len());
        Ok(VerifiedJwt { claims, protected })
    }

    /// Decrypt an encrypted JWT and validate its claims.
    pub fn decrypt(&self, token: &JWECompact, key: &JoseKey) -> Result<VerifiedJwt, JoseError> {
        self.decrypt_with_options(token, key, &JweDecryptOptions::default())
    }

    /// Decrypt an encrypted JWT with custom JWE options and validate its claims.
    ///
    /// Claims replicated as header parameters, [`rfc7519, section 5.3`],
    /// must equal the claims they replicate.
    ///
    /// [`rfc7519, section 5.3`]: https://datatracker.ietf.org/doc/html/rfc7519#section-5.3
    pub fn decrypt_with_options(
        &self,
        token: &JWECompact,
        key: &JoseKey,
        options: &JweDecryptOptions,
    ) -> Result<VerifiedJwt, JoseError> {
        self.check_configuration()?;
        let decrypted = token.decrypt_with_options(key, options)?;
        let claims = JwtClaims::from_payload(decrypted.plaintext())?;
        let protected = decrypted.protected_headers().clone();

        for claim in ["iss", "sub", "aud"] {
            if let Some(replicated) = protected.get(claim)
                && claims.get(claim) != Some(replicated)
            {
                return Err(JoseError::claim_invalid(
                    claim,
                    format!("replicated \"{claim}\" claim header parameter mismatch"),
                ));
            }
        }

        self.validate(&claims, &protected)
            .inspect_err(|err| tracing::debug!("JWT claims rejected: {err}"))?;
        tracing::trace!("JWT decrypted, {} claims", claims.as_map().len());
        Ok(VerifiedJwt { claims, protected })
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Claims of a JWT that passed verification or decryption and validation.
pub struct VerifiedJwt {
    claims: JwtClaims,
    protected: Headers,
}

impl VerifiedJwt {
    /// The validated claims.
    pub fn claims(&self) -> &JwtClaims {
        &self.claims
    }

    /// Consume and return the validated claims.
    pub fn into_claims(self) -> JwtClaims {
        self.claims
    }

    /// The protected header of the envelope.
    pub fn protected_headers(&self) -> &Headers {
        &self.protected
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::{ErrorKind, jwt::parse_timespan};

    const T: i64 = 1_700_000_000;

    fn claims(value: Value) -> JwtClaims {
        JwtClaims::from_payload(value.to_string().as_bytes()).unwrap()
    }

    fn at(seconds: i64) -> JwtClaimsValidation {
        JwtClaimsValidation::new().with_now(Timestamp::from_second(seconds).unwrap())
    }

    fn fails(validation: &JwtClaimsValidation, claims: &JwtClaims, message: &str) {
        let err = assert_err!(validation.validate(claims, &Headers::new()));
        assert_eq!(err.kind(), ErrorKind::ClaimInvalid, "{err:?}");
        assert_eq!(err.message(), message);
    }

    #[test]
    fn shapes_are_checked_without_options() {
        for (value, claim) in [
            (json!({"exp": "tomorrow"}), "exp"),
            (json!({"iss": 1}), "iss"),
            (json!({"sub": ""}), "sub"),
            (json!({"aud": [1]}), "aud"),
            (json!({"amr": []}), "amr"),
        ] {
            let err = assert_err!(at(T).validate(&claims(value), &Headers::new()));
            assert_eq!(err.kind(), ErrorKind::ClaimInvalid);
            assert_eq!(err.claim(), Some(claim));
        }
        assert_ok!(at(T).validate(&claims(json!({"aud": "a", "amr": ["pwd"]})), &Headers::new()));
    }

    #[test]
    fn exp_boundary_is_exclusive() {
        let token = claims(json!({"exp": T}));
        fails(&at(T), &token, "token is expired");
        assert_ok!(
            at(T)
                .with_clock_tolerance(parse_timespan("1s").unwrap())
                .validate(&token, &Headers::new())
        );
        assert_ok!(at(T).with_ignore_exp(true).validate(&token, &Headers::new()));
    }

    #[test]
    fn nbf_and_iat_in_the_future() {
        fails(&at(T), &claims(json!({"nbf": T + 10})), "token is not active yet");
        fails(&at(T), &claims(json!({"iat": T + 10})), "token issued in the future");
        assert_ok!(
            at(T)
                .with_clock_tolerance(SignedDuration::from_secs(10))
                .validate(&claims(json!({"nbf": T + 10, "iat": T + 10})), &Headers::new())
        );
    }

    #[test]
    fn max_auth_age() {
        let token = claims(json!({"auth_time": T - 31}));
        let validation = at(T).with_max_auth_age(parse_timespan("30s").unwrap());
        fails(
            &validation,
            &token,
            "too much time has elapsed since the last End-User authentication",
        );
        assert_ok!(
            validation
                .clone()
                .with_clock_tolerance(parse_timespan("1s").unwrap())
                .validate(&token, &Headers::new())
        );
        fails(&validation, &claims(json!({})), "missing auth_time");
    }

    #[test]
    fn max_token_age() {
        let validation = at(T).with_max_token_age(parse_timespan("1h").unwrap());
        fails(&validation, &claims(json!({})), "missing iat claim");
        fails(&validation, &claims(json!({"iat": T - 3601})), "maxTokenAge exceeded");
        assert_ok!(validation.validate(&claims(json!({"iat": T - 3600})), &Headers::new()));
    }

    #[test]
    fn ignore_iat_with_max_token_age_is_a_configuration_error() {
        let validation = at(T)
            .with_ignore_iat(true)
            .with_max_token_age(parse_timespan("2d").unwrap());
        let err = assert_err!(validation.check_configuration());
        assert!(err.is_configuration());
        let err = assert_err!(validation.validate(&claims(json!({})), &Headers::new()));
        assert!(err.is_configuration());
    }

    #[test]
    fn audience_intersection() {
        let token = claims(json!({"aud": ["foo", "bar"]}));
        assert_ok!(at(T).with_audience("foo").validate(&token, &Headers::new()));
        assert_ok!(at(T).with_audiences(["baz", "bar"]).validate(&token, &Headers::new()));
        fails(&at(T).with_audience("baz"), &token, "audience mismatch");
    }

    #[test]
    fn equality_checks() {
        let token = claims(json!({"iss": "me", "sub": "you", "jti": "1", "nonce": "n"}));
        assert_ok!(
            at(T)
                .with_issuer("me")
                .with_subject("you")
                .with_jti("1")
                .with_nonce("n")
                .validate(&token, &Headers::new())
        );
        fails(&at(T).with_issuer("other"), &token, "issuer mismatch");
        fails(&at(T).with_subject("other"), &token, "subject mismatch");
        fails(&at(T).with_jti("2"), &token, "jti mismatch");
        fails(&at(T).with_nonce("m"), &token, "nonce mismatch");
        fails(&at(T).with_issuer("me"), &claims(json!({})), "missing required \"iss\" claim");
    }

    #[test]
    fn required_claims_and_typ() {
        let token = claims(json!({"iss": "me"}));
        fails(
            &at(T).with_required_claims(["iss", "custom"]),
            &token,
            "missing required \"custom\" claim",
        );

        let protected = Headers::new().try_with_header("typ", "application/JWT").unwrap();
        assert_ok!(at(T).with_typ("jwt").validate(&token, &protected));
        let err = assert_err!(at(T).with_typ("at+jwt").validate(&token, &protected));
        assert_eq!(err.claim(), Some("typ"));
    }
}
