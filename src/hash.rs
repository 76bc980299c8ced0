//! BLAKE3 streaming hashing: full-content digests and head/tail signatures.

use blake3::Hasher;
use memmap2::Mmap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::ScanError;

/// Files at or above this size are mmap'd for hashing rather than read in chunks.
pub const HASH_MMAP_THRESHOLD: u64 = 100 * 1024 * 1024;
/// Chunk size for streaming reads below the mmap threshold.
pub const HASH_READ_CHUNK_SIZE: usize = 64 * 1024;
/// Size of the head and tail windows used for the cheap duplicate-candidate signature.
pub const HEAD_TAIL_WINDOW: usize = 16 * 1024;

/// Hash the full contents of a file with BLAKE3. Uses memory-mapped I/O above
/// [`HASH_MMAP_THRESHOLD`], chunked streaming reads otherwise. Checks `cancel` between chunks.
pub fn hash_file(
    path: &Path,
    size: u64,
    cancel: Option<&Arc<AtomicBool>>,
) -> Result<[u8; 32], ScanError> {
    let file = File::open(path).map_err(|source| ScanError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = Hasher::new();

    if size >= HASH_MMAP_THRESHOLD {
        let mmap = unsafe { Mmap::map(&file) }.map_err(|source| ScanError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        hasher.update(&mmap);
    } else {
        let mut reader = std::io::BufReader::with_capacity(HASH_READ_CHUNK_SIZE, file);
        let mut buffer = vec![0u8; HASH_READ_CHUNK_SIZE];
        loop {
            if let Some(c) = cancel
                && c.load(Ordering::Relaxed)
            {
                return Err(ScanError::Cancelled);
            }
            let n = reader.read(&mut buffer).map_err(|source| ScanError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
    }

    Ok(*hasher.finalize().as_bytes())
}

/// Cheap duplicate-candidate signature: BLAKE3 of the first 16KiB concatenated with the
/// last 16KiB. For files smaller than two windows, this degenerates to the whole-file hash
/// (the head and tail windows fully overlap or cover the file).
pub fn head_tail_signature(path: &Path, size: u64) -> Result<[u8; 32], ScanError> {
    let open = |p: &Path| {
        File::open(p).map_err(|source| ScanError::Io {
            path: p.to_path_buf(),
            source,
        })
    };

    if size <= (HEAD_TAIL_WINDOW * 2) as u64 {
        return hash_file(path, size, None);
    }

    let mut file = open(path)?;
    let mut hasher = Hasher::new();

    let mut head = [0u8; HEAD_TAIL_WINDOW];
    file.read_exact(&mut head).map_err(|source| ScanError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    hasher.update(&head);

    use std::io::{Seek, SeekFrom};
    file.seek(SeekFrom::End(-(HEAD_TAIL_WINDOW as i64)))
        .map_err(|source| ScanError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let mut tail = [0u8; HEAD_TAIL_WINDOW];
    file.read_exact(&mut tail).map_err(|source| ScanError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    hasher.update(&tail);

    Ok(*hasher.finalize().as_bytes())
}
