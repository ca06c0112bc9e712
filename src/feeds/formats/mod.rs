//! Archive encodings of a feed and their integrity checks.
//!
//! - `gz` - `.json.gz` archives (`flate2`)
//! - `zip_archive` - `.json.zip` archives (`zip`)
//!
//! Feeds travel unauthenticated over plain HTTP; comparing sizes and the
//! SHA-256 against the descriptor is the only corruption/tamper guard.

pub mod gz;
pub mod zip_archive;

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::NvdError;
use crate::model::{ArchiveKind, Descriptor};

pub use self::gz::gunzip;
pub use self::zip_archive::unzip;

/// Decompresses an archive of the given encoding.
pub fn decompress(kind: ArchiveKind, archive: &[u8]) -> Result<Vec<u8>, NvdError> {
    match kind {
        ArchiveKind::Gz => gunzip(archive),
        ArchiveKind::Zip => unzip(archive),
    }
}

/// SHA-256 of `data` as 64 uppercase hex characters.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(data))
}

/// Checks the downloaded archive length against `gzSize` / `zipSize`.
pub fn verify_archive(
    descriptor: &Descriptor,
    kind: ArchiveKind,
    archive: &[u8],
) -> Result<(), NvdError> {
    let field = match kind {
        ArchiveKind::Gz => "gzSize",
        ArchiveKind::Zip => "zipSize",
    };
    check_size(field, descriptor.archive_size(kind), archive.len())
}

/// Checks the decompressed document against `size` and `sha256`.
pub fn verify_payload(descriptor: &Descriptor, payload: &[u8]) -> Result<(), NvdError> {
    check_size("size", &descriptor.size, payload.len())?;

    let actual = sha256_hex(payload);
    if !actual.eq_ignore_ascii_case(&descriptor.sha256) {
        return Err(NvdError::Integrity {
            field: "sha256",
            expected: descriptor.sha256.clone(),
            actual,
        });
    }
    Ok(())
}

fn check_size(field: &'static str, published: &str, actual: usize) -> Result<(), NvdError> {
    // Descriptor sizes are only required to contain digits somewhere.
    let Ok(expected) = published.parse::<u64>() else {
        warn!(field, published, "Size is not a plain number, skipping size check");
        return Ok(());
    };
    if expected != actual as u64 {
        return Err(NvdError::Integrity {
            field,
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}
