//! Content fingerprinting for exact duplicate detection.
//!
//! A fingerprint is the hex-encoded SHA-256 digest of an asset's exact byte
//! sequence. Input is consumed in bounded chunks so large videos never have
//! to be held in memory at once.

use std::io::{self, Read};

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::types::Fingerprint;

/// Default read size when hashing a stream.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Fingerprint an in-memory buffer.
///
/// # Example
///
/// ```
/// use mediakeep_core::fingerprint::fingerprint_bytes;
///
/// let fp = fingerprint_bytes(b"hello");
/// assert_eq!(fp.len(), 64);
/// ```
#[must_use]
pub fn fingerprint_bytes(data: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(data);
    Fingerprint::new(hex::encode(hasher.finalize()))
}

/// Fingerprint a blocking reader, `chunk_size` bytes at a time.
///
/// A zero `chunk_size` falls back to [`DEFAULT_CHUNK_SIZE`]. The digest does
/// not depend on the chunk size. If the reader fails part way through, the
/// error is returned and no fingerprint is produced.
pub fn fingerprint_reader<R: Read>(mut reader: R, chunk_size: usize) -> io::Result<Fingerprint> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; effective_chunk_size(chunk_size)];

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }

    Ok(Fingerprint::new(hex::encode(hasher.finalize())))
}

/// Fingerprint an async reader, `chunk_size` bytes at a time.
pub async fn fingerprint_async_reader<R>(mut reader: R, chunk_size: usize) -> io::Result<Fingerprint>
where
    R: AsyncRead + Unpin,
{
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; effective_chunk_size(chunk_size)];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(Fingerprint::new(hex::encode(hasher.finalize())))
}

fn effective_chunk_size(chunk_size: usize) -> usize {
    if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// SHA-256 of the empty string.
    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    struct FailingReader {
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.served {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "upload aborted"));
            }
            self.served = true;
            buf[0] = b'x';
            Ok(1)
        }
    }

    #[test]
    fn empty_input_has_known_digest() {
        assert_eq!(fingerprint_bytes(b"").as_str(), EMPTY_SHA256);
        let fp = fingerprint_reader(io::empty(), 16).unwrap();
        assert_eq!(fp.as_str(), EMPTY_SHA256);
    }

    #[test]
    fn digest_is_independent_of_chunk_size() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let expected = fingerprint_bytes(&data);

        for chunk in [1, 7, 64, 4096, 100_000] {
            let fp = fingerprint_reader(data.as_slice(), chunk).unwrap();
            assert_eq!(fp, expected, "chunk size {chunk} changed the digest");
        }
    }

    #[test]
    fn zero_chunk_size_uses_default() {
        let fp = fingerprint_reader(&b"photo bytes"[..], 0).unwrap();
        assert_eq!(fp, fingerprint_bytes(b"photo bytes"));
    }

    #[test]
    fn different_bytes_differ() {
        assert_ne!(fingerprint_bytes(b"a"), fingerprint_bytes(b"b"));
    }

    #[test]
    fn read_error_surfaces() {
        let err = fingerprint_reader(FailingReader { served: false }, 4).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn async_reader_matches_sync() {
        let data = vec![42u8; 9_000];
        let fp = fingerprint_async_reader(data.as_slice(), 512).await.unwrap();
        assert_eq!(fp, fingerprint_bytes(&data));
    }
}
