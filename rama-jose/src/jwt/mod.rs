//! JSON Web Token, [`rfc7519`].
//!
//! A JWT is a [`JwtClaims`] set carried as the payload of a JWS or the
//! plaintext of a JWE. [`JwtClaimsValidation`] is the verification policy:
//! it opens the envelope and checks the claims.
//!
//! ```
//! use rama_jose::{
//!     jose::{JWA, SigningKey, VerificationKey},
//!     jwt::{JwtClaims, JwtClaimsValidation, parse_timespan},
//!     key::SecretKey,
//! };
//!
//! let key = SecretKey::generate(32).unwrap();
//! let now = jiff::Timestamp::now();
//! let token = JwtClaims::new()
//!     .with_issuer("urn:example:issuer")
//!     .with_audience("urn:example:audience")
//!     .with_issued_at(now)
//!     .with_expiration(now + parse_timespan("2h").unwrap())
//!     .sign(&SigningKey::new(JWA::HS256, key.clone()).unwrap())
//!     .unwrap();
//!
//! let verified = JwtClaimsValidation::new()
//!     .with_issuer("urn:example:issuer")
//!     .with_audience("urn:example:audience")
//!     .verify(&token, &VerificationKey::new(key))
//!     .unwrap();
//! assert_eq!(verified.claims().issuer(), Some("urn:example:issuer"));
//! ```
//!
//! [`rfc7519`]: https://datatracker.ietf.org/doc/html/rfc7519

mod claims;
pub use claims::JwtClaims;

mod timespan;
pub use timespan::parse_timespan;

mod validation;
pub use validation::{JwtClaimsValidation, VerifiedJwt};
