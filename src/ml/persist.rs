//! Binary model file format.
//!
//! A file is a 32-byte header, the 32-byte BLAKE3 digest of the payload, and
//! the `postcard`-encoded [`RandomForestModel`].
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       4     Magic ("CVDF")
//! 4       1     Version major
//! 5       1     Version minor
//! 6       2     Flags (reserved, zero)
//! 8       4     Payload size (bytes)
//! 12      4     Number of features
//! 16      4     Number of trees
//! 20      4     Number of classes
//! 24      8     Reserved
//! 32      32    BLAKE3 digest of payload
//! 64      ...   Payload
//! ```
//!
//! All integers are little-endian.

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::forest::RandomForestModel;

/// Magic bytes identifying a model file.
pub const MAGIC: &[u8; 4] = b"CVDF";
pub const VERSION_MAJOR: u8 = 1;
pub const VERSION_MINOR: u8 = 0;
pub const HEADER_SIZE: usize = 32;
const DIGEST_SIZE: usize = 32;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("encoding error: {0}")]
    Encoding(#[from] postcard::Error),
    #[error("payload of {0} bytes does not fit the header")]
    PayloadTooLarge(usize),
    #[error("not a cvd-forest model file")]
    NotAModel,
    #[error("model requires format {major}.{minor} or later")]
    UnsupportedVersion { major: u8, minor: u8 },
    #[error("file truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("payload checksum mismatch")]
    ChecksumMismatch,
    #[error("header does not match payload: {0}")]
    HeaderMismatch(&'static str),
    #[error("invalid model: {0}")]
    InvalidModel(String),
}

/// Fixed-size file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatHeader {
    pub version_major: u8,
    pub version_minor: u8,
    pub flags: u16,
    pub payload_size: u32,
    pub num_features: u32,
    pub num_trees: u32,
    pub num_classes: u32,
}

impl FormatHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4] = self.version_major;
        buf[5] = self.version_minor;
        buf[6..8].copy_from_slice(&self.flags.to_le_bytes());
        buf[8..12].copy_from_slice(&self.payload_size.to_le_bytes());
        buf[12..16].copy_from_slice(&self.num_features.to_le_bytes());
        buf[16..20].copy_from_slice(&self.num_trees.to_le_bytes());
        buf[20..24].copy_from_slice(&self.num_classes.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Result<Self, PersistError> {
        if &buf[0..4] != MAGIC {
            return Err(PersistError::NotAModel);
        }
        let version_major = buf[4];
        let version_minor = buf[5];
        if version_major != VERSION_MAJOR {
            return Err(PersistError::UnsupportedVersion {
                major: version_major,
                minor: version_minor,
            });
        }
        let u32_at = |offset: usize| {
            u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
        };
        Ok(Self {
            version_major,
            version_minor,
            flags: u16::from_le_bytes([buf[6], buf[7]]),
            payload_size: u32_at(8),
            num_features: u32_at(12),
            num_trees: u32_at(16),
            num_classes: u32_at(20),
        })
    }
}

/// Serialize a model into the file format.
pub fn encode_model(model: &RandomForestModel) -> Result<Vec<u8>, PersistError> {
    let payload = postcard::to_allocvec(model)?;
    let header = FormatHeader {
        version_major: VERSION_MAJOR,
        version_minor: VERSION_MINOR,
        flags: 0,
        payload_size: u32::try_from(payload.len())
            .map_err(|_| PersistError::PayloadTooLarge(payload.len()))?,
        num_features: model.n_features() as u32,
        num_trees: model.trees.len() as u32,
        num_classes: model.classes.len() as u32,
    };
    let mut out = Vec::with_capacity(HEADER_SIZE + DIGEST_SIZE + payload.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(blake3::hash(&payload).as_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Parse and validate a model from the file format.
pub fn decode_model(bytes: &[u8]) -> Result<RandomForestModel, PersistError> {
    let prefix = HEADER_SIZE + DIGEST_SIZE;
    if bytes.len() < prefix {
        if bytes.len() >= MAGIC.len() && &bytes[..MAGIC.len()] != MAGIC {
            return Err(PersistError::NotAModel);
        }
        return Err(PersistError::Truncated {
            expected: prefix,
            actual: bytes.len(),
        });
    }
    let mut header_buf = [0u8; HEADER_SIZE];
    header_buf.copy_from_slice(&bytes[..HEADER_SIZE]);
    let header = FormatHeader::from_bytes(&header_buf)?;

    let expected = prefix + header.payload_size as usize;
    if bytes.len() < expected {
        return Err(PersistError::Truncated {
            expected,
            actual: bytes.len(),
        });
    }
    let payload = &bytes[prefix..expected];
    if blake3::hash(payload).as_bytes() != &bytes[HEADER_SIZE..prefix] {
        return Err(PersistError::ChecksumMismatch);
    }

    let model: RandomForestModel = postcard::from_bytes(payload)?;
    if model.n_features() != header.num_features as usize {
        return Err(PersistError::HeaderMismatch("feature count"));
    }
    if model.trees.len() != header.num_trees as usize {
        return Err(PersistError::HeaderMismatch("tree count"));
    }
    if model.classes.len() != header.num_classes as usize {
        return Err(PersistError::HeaderMismatch("class count"));
    }
    model.validate().map_err(PersistError::InvalidModel)?;
    Ok(model)
}

/// Write a model to `path`, replacing any existing file.
pub fn save_model(path: &Path, model: &RandomForestModel) -> Result<(), PersistError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| PersistError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let bytes = encode_model(model)?;
    std::fs::write(path, bytes).map_err(|source| PersistError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a model written by [`save_model`].
pub fn load_model(path: &Path) -> Result<RandomForestModel, PersistError> {
    let bytes = std::fs::read(path).map_err(|source| PersistError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    decode_model(&bytes)
}
