//! JOSE envelope engine used by rama.
//!
//! This includes but is not limited to:
//! - JSON Web Signature (JWS), Encryption (JWE), Key (JWK) and Token (JWT)
//! - Header merging and `crit` (critical) parameter processing
//! - Key management for every JWE `alg` family
//! - A minimal DER codec to move keys in and out of SPKI, PKCS#8 and X.509
//!
//! Cryptographic primitives are provided by [`aws-lc-rs`](https://docs.rs/aws-lc-rs).
//!
//! # Rama
//!
//! Crate used by the end-user `rama` crate and `rama` crate authors alike.
//!
//! Learn more about `rama`:
//!
//! - Github: <https://github.com/plabayo/rama>
//! - Book: <https://ramaproxy.org/book/>

#![doc(
    html_favicon_url = "https://raw.githubusercontent.com/plabayo/rama/main/docs/img/old_logo.png"
)]
#![doc(html_logo_url = "https://raw.githubusercontent.com/plabayo/rama/main/docs/img/old_logo.png")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(test, allow(clippy::float_cmp))]
#![cfg_attr(not(test), warn(clippy::print_stdout, clippy::dbg_macro))]

mod error;
pub use error::{Envelope, ErrorKind, JoseError};

pub mod der;
pub mod jose;
pub mod jwt;
pub mod key;

mod primitives;

pub mod dep {
    //! Dependencies for rama jose modules.
    //!
    //! Exported for your convenience

    pub mod aws_lc_rs {
        //! Re-export of the [`aws-lc-rs`] crate.
        //!
        //! [`aws-lc-rs`]: https://docs.rs/aws-lc-rs

        #[doc(inline)]
        pub use aws_lc_rs::*;
    }

    pub mod jiff {
        //! Re-export of the [`jiff`] crate.
        //!
        //! [`jiff`]: https://docs.rs/jiff

        #[doc(inline)]
        pub use jiff::*;
    }

    pub mod pki_types {
        //! Re-export of the [`rustls-pki-types`] crate.
        //!
        //! [`rustls-pki-types`]: https://docs.rs/rustls-pki-types

        #[doc(inline)]
        pub use rustls_pki_types::*;
    }
}
