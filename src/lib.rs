//! Chosen-plaintext attacks on ECB and CBC.
//!
//! The building blocks are a PKCS#7 codec and ECB/CBC modes on top of a raw AES block. The
//! attacks only ever talk to an [`Oracle`]: something that encrypts what we hand it under a key
//! we never see.
//!
//! - [`detect`]: tell ECB from CBC by counting repeated blocks.
//! - [`byte_at_a_time`]: read a secret an ECB oracle appends to our input, with or without a
//!   random prefix in front of it.
//! - [`cut_paste`]: splice ECB blocks into an admin profile.
//! - [`bitflip`]: flip CBC ciphertext bits to inject `;admin=true;` past a sanitizer.
#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod bitflip;
pub mod byte_at_a_time;
mod bytes_ext;
pub mod cipher;
pub mod config;
pub mod cut_paste;
pub mod detect;
pub mod error;
pub mod mode;
pub mod oracle;
pub mod pkcs7;

pub use config::AttackConfig;
pub use error::{Error, Interrupted, Result};
pub use oracle::{Mode, Oracle};
