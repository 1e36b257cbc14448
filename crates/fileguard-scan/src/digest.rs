//! Streaming content digests.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use fileguard_core::{ContentHash, DigestAlgorithm, FileStat, ScanError};

enum Hasher {
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            DigestAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn finalize(self) -> ContentHash {
        match self {
            Self::Sha256(h) => {
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(&h.finalize());
                ContentHash::new(bytes)
            }
            Self::Blake3(h) => ContentHash::new(*h.finalize().as_bytes()),
        }
    }
}

/// Digest everything readable from `reader`, reading `buf.len()` bytes at a time.
pub fn hash_reader<R: Read>(
    reader: &mut R,
    algorithm: DigestAlgorithm,
    buf: &mut [u8],
) -> std::io::Result<ContentHash> {
    let mut hasher = Hasher::new(algorithm);
    loop {
        match reader.read(buf) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(hasher.finalize())
}

/// Digest an in-memory buffer.
pub fn hash_bytes(data: &[u8], algorithm: DigestAlgorithm) -> ContentHash {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finalize()
}

/// Open `path`, stat the handle and digest its contents.
///
/// The stat comes from the same handle that is read, so size and mtime
/// describe the bytes that were hashed.
pub fn hash_file(
    path: &Path,
    algorithm: DigestAlgorithm,
    buf: &mut [u8],
) -> Result<(FileStat, ContentHash), ScanError> {
    let mut file = File::open(path).map_err(|e| ScanError::io(path, e))?;
    let metadata = file.metadata().map_err(|e| ScanError::io(path, e))?;
    if !metadata.is_file() {
        return Err(ScanError::NotAFile {
            path: path.to_path_buf(),
        });
    }
    let digest = hash_reader(&mut file, algorithm, buf).map_err(|e| ScanError::io(path, e))?;
    Ok((FileStat::from_metadata(&metadata), digest))
}
