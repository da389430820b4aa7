//! Filesystem layer extraction.
//!
//! Layers are applied on top of each other in manifest order: later layers
//! overwrite files laid down by earlier ones.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use nestbox_common::error::{NestboxError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];
const TAR_BLOCK: usize = 512;
const USTAR_OFFSET: usize = 257;

/// Container format of a downloaded layer blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Gzip-compressed tar stream.
    GzipTar,
    /// Uncompressed tar stream.
    Tar,
}

/// Result of applying one layer to a root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLayer {
    /// Detected archive format.
    pub format: ArchiveFormat,
    /// Size of the archive on disk in bytes.
    pub size_bytes: u64,
}

/// Detects the archive format from the first block of a blob.
///
/// # Errors
///
/// Returns `NestboxError::LayerExtract` for zstd blobs and for anything that
/// is neither gzip nor tar.
pub fn detect_format(head: &[u8]) -> Result<ArchiveFormat> {
    if head.starts_with(&GZIP_MAGIC) {
        return Ok(ArchiveFormat::GzipTar);
    }
    if head.starts_with(&ZSTD_MAGIC) {
        return Err(NestboxError::layer_extract(
            "zstd-compressed layers are not supported",
        ));
    }
    if head.len() >= USTAR_OFFSET + 5 && &head[USTAR_OFFSET..USTAR_OFFSET + 5] == b"ustar" {
        return Ok(ArchiveFormat::Tar);
    }
    // An archive holding no entries is just zeroed end-of-archive blocks.
    if head.len() == TAR_BLOCK && head.iter().all(|b| *b == 0) {
        return Ok(ArchiveFormat::Tar);
    }
    Err(NestboxError::layer_extract(
        "unrecognized layer archive format",
    ))
}

/// Extracts a layer archive into `target`, overwriting existing entries.
///
/// Supports gzip-compressed and plain tar archives, detected by content.
///
/// # Errors
///
/// Returns `NestboxError::LayerExtract` if the archive cannot be read,
/// has an unsupported format, or fails to unpack.
pub fn extract_layer(archive_path: &Path, target: &Path) -> Result<ExtractedLayer> {
    tracing::debug!(
        archive = %archive_path.display(),
        target = %target.display(),
        "extracting layer"
    );

    let mut file = File::open(archive_path).map_err(|e| {
        NestboxError::layer_extract_caused(
            format!("cannot open layer archive {}", archive_path.display()),
            e,
        )
    })?;
    let size_bytes = file
        .metadata()
        .map_err(|e| NestboxError::layer_extract_caused("cannot stat layer archive", e))?
        .len();

    let format = detect_format(&read_head(&mut file)?)?;
    let reader = BufReader::new(file);

    match format {
        ArchiveFormat::GzipTar => unpack(flate2::read::GzDecoder::new(reader), target)?,
        ArchiveFormat::Tar => unpack(reader, target)?,
    }

    tracing::debug!(?format, size = size_bytes, "layer extracted");
    Ok(ExtractedLayer { format, size_bytes })
}

/// Reads up to one tar block from the start of `file` and rewinds it.
fn read_head(file: &mut File) -> Result<Vec<u8>> {
    let mut head = Vec::with_capacity(TAR_BLOCK);
    let _ = file
        .by_ref()
        .take(TAR_BLOCK as u64)
        .read_to_end(&mut head)
        .map_err(|e| NestboxError::layer_extract_caused("cannot read layer archive", e))?;
    let _ = file
        .seek(SeekFrom::Start(0))
        .map_err(|e| NestboxError::layer_extract_caused("cannot rewind layer archive", e))?;
    Ok(head)
}

fn unpack(reader: impl Read, target: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive.set_overwrite(true);
    archive.set_preserve_permissions(true);
    archive.set_unpack_xattrs(false);
    archive.unpack(target).map_err(|e| {
        NestboxError::layer_extract_caused(
            format!("failed to unpack layer into {}", target.display()),
            e,
        )
    })
}
