//! xxHash-based content hashing for duplicate detection
//!
//! Three tiers, cheapest first:
//! - quick fingerprint: first 4 KiB of content plus the file size
//! - full hash: the whole file streamed in 64 KiB chunks
//! - byte comparison: two files read in lock-step
//!
//! Fingerprint and full hash fail closed: an I/O error yields an empty
//! string, and an empty string never equals anything.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::trace;
use xxhash_rust::xxh3::{Xxh3, xxh3_64};

/// Bytes read from the head of a file for the quick fingerprint
pub const FINGERPRINT_BLOCK: usize = 4096;

/// Chunk size for streaming hashes and comparisons
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Compute the quick fingerprint of a file, or an empty string on any I/O error
pub fn quick_fingerprint(path: &Path) -> String {
    match try_quick_fingerprint(path) {
        Ok(fingerprint) => fingerprint,
        Err(e) => {
            trace!(?path, error = %e, "Fingerprint unavailable");
            String::new()
        }
    }
}

fn try_quick_fingerprint(path: &Path) -> io::Result<String> {
    let file_size = std::fs::metadata(path)?.len();
    let file = File::open(path)?;

    let mut data = Vec::with_capacity(FINGERPRINT_BLOCK + 8);
    file.take(FINGERPRINT_BLOCK as u64).read_to_end(&mut data)?;
    data.extend_from_slice(&file_size.to_le_bytes());

    let hash = xxh3_64(&data);
    trace!(?path, file_size, hash, "Computed quick fingerprint");
    Ok(format!("{:016x}", hash))
}

/// Compute the full content hash of a file, or an empty string on any I/O error
pub fn full_hash(path: &Path) -> String {
    match try_full_hash(path) {
        Ok(hash) => hash,
        Err(e) => {
            trace!(?path, error = %e, "Full hash unavailable");
            String::new()
        }
    }
}

fn try_full_hash(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Xxh3::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:032x}", hasher.digest128()))
}

/// Fingerprint equality where an empty fingerprint never matches
pub fn fingerprints_match(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && a == b
}

/// Compare two files byte for byte
///
/// Returns false on a size mismatch or on any I/O error.
pub fn bytes_identical(a: &Path, b: &Path) -> bool {
    try_bytes_identical(a, b).unwrap_or(false)
}

fn try_bytes_identical(a: &Path, b: &Path) -> io::Result<bool> {
    if std::fs::metadata(a)?.len() != std::fs::metadata(b)?.len() {
        return Ok(false);
    }

    let mut file_a = File::open(a)?;
    let mut file_b = File::open(b)?;
    let mut buf_a = vec![0u8; CHUNK_SIZE];
    let mut buf_b = vec![0u8; CHUNK_SIZE];

    loop {
        let read_a = read_full(&mut file_a, &mut buf_a)?;
        let read_b = read_full(&mut file_b, &mut buf_b)?;
        if read_a != read_b || buf_a[..read_a] != buf_b[..read_b] {
            return Ok(false);
        }
        if read_a == 0 {
            return Ok(true);
        }
    }
}

/// Fill as much of `buf` as the reader allows; short only at EOF
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Escalating content check: fingerprint, then full hash, then bytes
///
/// `source_fingerprint` lets callers reuse a fingerprint they already hold.
pub fn same_content(candidate: &Path, source: &Path, source_fingerprint: &str) -> bool {
    if !fingerprints_match(&quick_fingerprint(candidate), source_fingerprint) {
        return false;
    }
    let candidate_hash = full_hash(candidate);
    if candidate_hash.is_empty() || candidate_hash != full_hash(source) {
        return false;
    }
    bytes_identical(candidate, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_with(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_fingerprint_same_content() {
        let file1 = temp_with(b"test content");
        let file2 = temp_with(b"test content");

        let fp1 = quick_fingerprint(file1.path());
        assert!(!fp1.is_empty());
        assert_eq!(fp1, quick_fingerprint(file2.path()));
    }

    #[test]
    fn test_fingerprint_includes_size() {
        // Same first 4 KiB, different tail length
        let mut long = vec![7u8; FINGERPRINT_BLOCK];
        let file1 = temp_with(&long);
        long.extend_from_slice(b"tail");
        let file2 = temp_with(&long);

        assert_ne!(quick_fingerprint(file1.path()), quick_fingerprint(file2.path()));
    }

    #[test]
    fn test_fingerprint_fails_closed() {
        let missing = Path::new("/definitely/not/here.jpg");
        assert_eq!(quick_fingerprint(missing), "");
        assert_eq!(full_hash(missing), "");
        assert!(!fingerprints_match("", ""));
        assert!(!fingerprints_match("abc", ""));
        assert!(fingerprints_match("abc", "abc"));
    }

    #[test]
    fn test_full_hash_sees_past_fingerprint_block() {
        let mut a = vec![1u8; FINGERPRINT_BLOCK * 3];
        let file1 = temp_with(&a);
        a[FINGERPRINT_BLOCK * 2] = 2;
        let file2 = temp_with(&a);

        assert_eq!(quick_fingerprint(file1.path()), quick_fingerprint(file2.path()));
        assert_ne!(full_hash(file1.path()), full_hash(file2.path()));
        assert!(!bytes_identical(file1.path(), file2.path()));
        assert!(!same_content(
            file1.path(),
            file2.path(),
            &quick_fingerprint(file2.path())
        ));
    }

    #[test]
    fn test_bytes_identical() {
        let big: Vec<u8> = (0..(CHUNK_SIZE * 2 + 17)).map(|i| (i % 251) as u8).collect();
        let file1 = temp_with(&big);
        let file2 = temp_with(&big);
        let file3 = temp_with(b"short");

        assert!(bytes_identical(file1.path(), file2.path()));
        assert!(!bytes_identical(file1.path(), file3.path()));
        assert!(same_content(
            file1.path(),
            file2.path(),
            &quick_fingerprint(file2.path())
        ));
    }

    #[test]
    fn test_empty_files_are_identical() {
        let file1 = temp_with(b"");
        let file2 = temp_with(b"");
        assert!(bytes_identical(file1.path(), file2.path()));
    }
}
