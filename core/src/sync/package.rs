// Sync package — zstd-compressed tar of JSON files
//
//   index.json           [{id, title, created_at, updated_at}, ...]
//   threads/<id>.json    [{id, thread_id, timestamp, updated_at, author, body}, ...]
//
// Archives are built with fixed header metadata so equal contents give
// byte-identical packages, and `package_id` is a stable content address.

use super::SyncError;
use crate::store::messages::{MessageRecord, ThreadSummary};
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use tar::{Archive, Builder, EntryType, Header};

const INDEX_PATH: &str = "index.json";
const THREADS_DIR: &str = "threads";
/// Upper bound on a decompressed package
const MAX_UNPACKED_BYTES: u64 = 256 * 1024 * 1024;
const ZSTD_LEVEL: i32 = 3;

/// Parsed contents of a sync package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPackage {
    pub index: Vec<ThreadSummary>,
    /// Message lists keyed by thread id
    pub threads: BTreeMap<String, Vec<MessageRecord>>,
}

/// Reject ids that would escape `threads/` or be ambiguous as file names
pub fn validate_thread_id(id: &str) -> Result<(), SyncError> {
    let bad = id.is_empty()
        || id == "."
        || id == ".."
        || id.chars().any(|c| matches!(c, '/' | '\\' | '\0'));
    if bad {
        return Err(SyncError::InvalidThreadId(id.to_string()));
    }
    Ok(())
}

/// BLAKE3 content address of a packed archive
pub fn package_id(archive: &[u8]) -> String {
    hex::encode(blake3::hash(archive).as_bytes())
}

fn file_header(len: usize) -> Header {
    let mut header = Header::new_gnu();
    header.set_size(len as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_entry_type(EntryType::Regular);
    header
}

fn archive_err(e: impl std::fmt::Display) -> SyncError {
    SyncError::Archive(e.to_string())
}

impl SyncPackage {
    /// Compress into the wire format
    pub fn pack(&self) -> Result<Vec<u8>, SyncError> {
        for thread in &self.index {
            validate_thread_id(&thread.id)?;
        }

        let mut builder = Builder::new(Vec::new());

        let index = serde_json::to_vec(&self.index).map_err(archive_err)?;
        builder
            .append_data(&mut file_header(index.len()), INDEX_PATH, index.as_slice())
            .map_err(archive_err)?;

        let mut dir = Header::new_gnu();
        dir.set_entry_type(EntryType::Directory);
        dir.set_size(0);
        dir.set_mode(0o755);
        dir.set_mtime(0);
        builder
            .append_data(&mut dir, format!("{}/", THREADS_DIR), std::io::empty())
            .map_err(archive_err)?;

        for thread in &self.index {
            let messages = self.threads.get(&thread.id).map(Vec::as_slice).unwrap_or(&[]);
            let body = serde_json::to_vec(messages).map_err(archive_err)?;
            let path = format!("{}/{}.json", THREADS_DIR, thread.id);
            builder
                .append_data(&mut file_header(body.len()), path, body.as_slice())
                .map_err(archive_err)?;
        }

        let tar = builder.into_inner().map_err(archive_err)?;
        zstd::encode_all(tar.as_slice(), ZSTD_LEVEL).map_err(archive_err)
    }

    /// Decompress and parse the whole package
    ///
    /// Fails on any decompression, archive or JSON error, and when the index
    /// names a thread with no message file.
    pub fn unpack(bytes: &[u8]) -> Result<Self, SyncError> {
        let decoder = zstd::stream::read::Decoder::new(bytes).map_err(archive_err)?;
        let mut tar = Vec::new();
        decoder
            .take(MAX_UNPACKED_BYTES + 1)
            .read_to_end(&mut tar)
            .map_err(archive_err)?;
        if tar.len() as u64 > MAX_UNPACKED_BYTES {
            return Err(SyncError::Archive(format!(
                "package exceeds {} bytes unpacked",
                MAX_UNPACKED_BYTES
            )));
        }

        let mut index: Option<Vec<ThreadSummary>> = None;
        let mut files: BTreeMap<String, Vec<u8>> = BTreeMap::new();

        let mut archive = Archive::new(Cursor::new(tar));
        for entry in archive.entries().map_err(archive_err)? {
            let mut entry = entry.map_err(archive_err)?;
            if entry.header().entry_type().is_dir() {
                continue;
            }
            let path = entry
                .path()
                .map_err(archive_err)?
                .to_string_lossy()
                .into_owned();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).map_err(archive_err)?;

            if path == INDEX_PATH {
                let parsed = serde_json::from_slice(&data)
                    .map_err(|e| SyncError::Malformed(format!("{}: {}", INDEX_PATH, e)))?;
                index = Some(parsed);
            } else if let Some(name) = path
                .strip_prefix(THREADS_DIR)
                .and_then(|p| p.strip_prefix('/'))
                .and_then(|p| p.strip_suffix(".json"))
            {
                files.insert(name.to_string(), data);
            } else {
                tracing::debug!(path = %path, "Ignoring unexpected package entry");
            }
        }

        let index = index.ok_or_else(|| SyncError::Malformed(format!("missing {}", INDEX_PATH)))?;
        let mut threads = BTreeMap::new();
        for thread in &index {
            validate_thread_id(&thread.id)?;
            let data = files.get(&thread.id).ok_or_else(|| {
                SyncError::Malformed(format!("missing {}/{}.json", THREADS_DIR, thread.id))
            })?;
            let messages: Vec<MessageRecord> = serde_json::from_slice(data).map_err(|e| {
                SyncError::Malformed(format!("{}/{}.json: {}", THREADS_DIR, thread.id, e))
            })?;
            threads.insert(thread.id.clone(), messages);
        }

        Ok(Self { index, threads })
    }

    pub fn message_count(&self) -> usize {
        self.threads.values().map(Vec::len).sum()
    }
}
