//! A library for parsing, verifying and resealing segmented firmware images.
//!
//! The image format is the one loaded by ESP32-class bootloaders: a 24-byte
//! header, a list of segments, a one-byte XOR checksum and a 32-byte SHA-256
//! digest trailer. Whenever segment data is edited the checksum and the digest
//! have to be recomputed, in that order, or the bootloader rejects the image.
//!
//! # Layout
//!
//! | Offset | Size | Field |
//! |---|---|---|
//! | 0 | 1 | magic (`0xE9`) |
//! | 1 | 1 | segment count |
//! | 2 | 6 | header tail (kept verbatim) |
//! | 8 | 16 | extension header (kept verbatim) |
//! | 24 | | segments: load address, data length, data |
//! | len - 33 | 1 | checksum: `0xEF` XOR every segment data byte |
//! | len - 32 | 32 | SHA-256 of everything before it |
//!
//! # Example
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = std::fs::read("firmware.bin")?;
//! let mut image = fwseal::parse(bytes)?;
//!
//! println!("Segments: {}", image.segment_count());
//! println!("{}", image.verify());
//!
//! // Patch the first segment, then fix checksum and digest.
//! if let Some(data) = image.segment_data_mut(0) {
//!     data[0] = 0x00;
//! }
//! let report = image.reseal()?;
//! println!("{report}");
//!
//! std::fs::write("firmware.patched.bin", image.into_inner())?;
//! # Ok(())
//! # }
//! ```
//!
//! # Integrity contract
//!
//! The digest covers the checksum byte, so [`reseal()`] always writes the new
//! checksum first and hashes the updated buffer afterwards. This matches the
//! images produced by ESP-IDF; check it against the bootloader documentation
//! before relying on it for another target.

pub mod checksum;
pub mod diagnose;
pub mod digest;
pub mod error;
pub mod header;
pub mod image;
pub mod reseal;
pub mod segment;

pub use self::checksum::{compute_checksum, compute_checksum_parallel};
pub use self::diagnose::{Diagnosis, diagnose};
pub use self::digest::compute_digest;
pub use self::error::{Field, FormatError};
pub use self::image::{Findings, ParsedImage, Verification, parse};
pub use self::reseal::{Resealed, reseal, reseal_in_place};
