//! A streaming keystream codec for a family of six versioned XOR file
//! ciphers used by a mobile rhythm-game's regional asset stores.
//!
//! Given a file name (keying material) and a regional prefix (or a
//! [`region::Region`]), the codec derives a keystream and XORs it against
//! file bytes to encrypt or decrypt, reading or writing a small plaintext
//! header that identifies the algorithm version.
//!
//! # Modules
//! | Module | Purpose |
//! |--------|---------|
//! | [`region`]    | Regional prefixes, canonical name sums, key tables |
//! | [`tables`]    | The raw V3+ key tables and LCG parameter table |
//! | [`context`]   | [`context::Version`] and [`context::Context`], the codec's mutable state |
//! | [`init`]      | Decrypt/encrypt initialization (key derivation, header synthesis) |
//! | [`keystream`] | The `apply` engine: XORs a buffer in place, advancing state |
//! | [`seek`]      | Recompute state to resume at an arbitrary byte offset |
//!
//! # Scope
//! This crate is the keystream codec only. File I/O, CLI argument parsing,
//! and the MD5 primitive (consumed as an opaque hasher via the [`md5`]
//! crate) are callers' responsibility. The design goal is byte-exact
//! compatibility with an existing cipher family, not cryptographic
//! strength - see each module's docs for the per-version quirks this
//! implies.
//!
//! # Example
//! ```
//! use honokami_codec::context::{Context, Version};
//! use honokami_codec::init;
//! use honokami_codec::region::Region;
//!
//! let filename = "live_icon_1.png";
//! let mut plaintext = b"hello honoka".to_vec();
//!
//! let mut header = [0u8; 16];
//! let mut enc = Context::new();
//! let request = init::EncryptRequest::region(Region::En).version(Version::V3);
//! init::encrypt_init(&mut enc, request, filename, &mut header).unwrap();
//! let mut ciphertext = plaintext.clone();
//! enc.apply(&mut ciphertext);
//!
//! let mut dec = Context::new();
//! init::decrypt_init(
//!     &mut dec,
//!     init::DecryptRequest::region(Region::En),
//!     filename,
//!     &header[..4],
//! )
//! .unwrap();
//! if init::needs_phase2(&dec) {
//!     init::decrypt_phase2(&mut dec, init::Phase2Request::region(Region::En), filename, &header[4..16])
//!         .unwrap();
//! }
//! dec.apply(&mut ciphertext);
//! assert_eq!(ciphertext, plaintext);
//! # let _ = &mut plaintext;
//! ```

pub mod context;
pub mod error;
pub mod init;
pub mod keystream;
pub mod region;
pub mod seek;
pub mod tables;
pub mod util;

pub use error::{Error, Result};
