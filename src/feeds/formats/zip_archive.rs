use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::error::NvdError;

/// Extracts the JSON document from a `.json.zip` archive.
///
/// Feed archives hold exactly one file; the first regular file entry is used.
pub fn unzip(archive: &[u8]) -> Result<Vec<u8>, NvdError> {
    let mut zip = ZipArchive::new(Cursor::new(archive))
        .map_err(|e| NvdError::Archive(format!("invalid zip archive: {}", e)))?;

    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| NvdError::Archive(format!("unreadable zip entry {}: {}", index, e)))?;
        if !entry.is_file() {
            continue;
        }
        let mut out = Vec::new();
        entry
            .read_to_end(&mut out)
            .map_err(|e| NvdError::Archive(format!("corrupted zip entry {}: {}", entry.name(), e)))?;
        return Ok(out);
    }

    Err(NvdError::Archive("zip archive contains no file".to_string()))
}
