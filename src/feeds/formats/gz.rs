use std::io::Read;

use flate2::read::GzDecoder;

use crate::error::NvdError;

/// Decompresses a `.json.gz` archive.
pub fn gunzip(archive: &[u8]) -> Result<Vec<u8>, NvdError> {
    let mut decoder = GzDecoder::new(archive);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| NvdError::Archive(format!("invalid gzip stream: {}", e)))?;
    Ok(out)
}
