//! Core data model: file attributes, timestamps, and the file entry stored in the index.

use bitflags::bitflags;
use std::path::PathBuf;

use crate::ids::{FileId, PathId, VolumeId};

bitflags! {
    /// File attribute flags, as a typed flag set instead of separate `bool` fields.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct FileAttributes: u16 {
        const READ_ONLY          = 1 << 0;
        const HIDDEN             = 1 << 1;
        const SYSTEM              = 1 << 2;
        const DIRECTORY           = 1 << 3;
        const ARCHIVE             = 1 << 4;
        const TEMPORARY           = 1 << 5;
        const SPARSE              = 1 << 6;
        const REPARSE_POINT       = 1 << 7;
        const COMPRESSED          = 1 << 8;
        const ENCRYPTED           = 1 << 9;
        const OFFLINE             = 1 << 10;
        const NOT_CONTENT_INDEXED = 1 << 11;
        const VIRTUAL_FILE        = 1 << 12;
    }
}

/// FILETIME-style timestamps: 100-nanosecond intervals since 1601-01-01 UTC.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileTimestamps {
    pub creation_time: u64,
    pub last_write_time: u64,
    pub last_access_time: u64,
    pub change_time: u64,
}

/// One indexed file (or directory) and everything known about it.
#[derive(Clone, Debug, PartialEq)]
pub struct FileEntry {
    pub volume_id: VolumeId,
    pub file_id: FileId,
    pub path_id: PathId,
    pub full_path: PathBuf,
    pub size_logical: u64,
    pub size_on_disk: u64,
    pub attributes: FileAttributes,
    pub timestamps: FileTimestamps,

    /// 16KiB head + 16KiB tail BLAKE3 signature (or whole-file hash for files < 32KiB).
    pub head_tail_signature: Option<[u8; 32]>,
    /// Full-content BLAKE3 digest.
    pub content_hash: Option<[u8; 32]>,
    /// Perceptual hash of image/audio content. Never populated (no Non-goal media engine).
    pub perceptual_hash: Option<Vec<u8>>,
    /// (width, height) for image files. Never populated.
    pub image_dimensions: Option<(u32, u32)>,
    /// Duration in milliseconds for audio files. Never populated.
    pub audio_duration: Option<u64>,
}

impl FileEntry {
    pub fn new(volume_id: VolumeId, file_id: FileId, path_id: PathId, full_path: PathBuf) -> Self {
        Self {
            volume_id,
            file_id,
            path_id,
            full_path,
            size_logical: 0,
            size_on_disk: 0,
            attributes: FileAttributes::empty(),
            timestamps: FileTimestamps::default(),
            head_tail_signature: None,
            content_hash: None,
            perceptual_hash: None,
            image_dimensions: None,
            audio_duration: None,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.attributes.contains(FileAttributes::DIRECTORY)
    }

    pub fn extension(&self) -> Option<&str> {
        self.full_path.extension().and_then(|e| e.to_str())
    }
}

/// A chunk of a file's content, used for content-defined chunking. Kept for index-format
/// compatibility; not populated by the scanner or dedup cascade (no chunk-level dedup in scope).
#[derive(Clone, Debug)]
pub struct FileChunk {
    pub offset: u64,
    pub length: u64,
    pub hash: [u8; 32],
}
