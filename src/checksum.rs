//! Streaming SHA-256 content identities.
//!
//! Media assets are hashed in fixed-size chunks so memory use is
//! independent of asset size. Documents are hashed over a canonical
//! serialization with their volatile fields removed, so a document can
//! carry its own checksum without circularity.

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Chunk size for incremental hashing.
const CHUNK_SIZE: usize = 8192;

/// Fields stripped from a document before computing its self-checksum:
/// the checksum itself (circular) and the creation timestamp (varies
/// between otherwise identical runs).
const VOLATILE_FIELDS: [&str; 2] = ["checksum_sha256", "created_at"];

/// Hash an in-memory buffer.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hash a byte stream incrementally. Identical bytes yield an
/// identical digest regardless of which backend produced the stream.
pub async fn hash_reader<R>(mut reader: R) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Self-checksum of a serializable document.
///
/// The document is converted to a JSON value, volatile fields are
/// removed, and the result is re-serialized with serde_json's default
/// map (a BTreeMap, so keys come out sorted) — the digest is therefore
/// stable across serializers and field orderings.
pub fn hash_document<T: Serialize>(document: &T) -> serde_json::Result<String> {
    let mut value = serde_json::to_value(document)?;
    if let Some(object) = value.as_object_mut() {
        for field in VOLATILE_FIELDS {
            object.remove(field);
        }
    }
    let canonical = serde_json::to_vec(&value)?;
    Ok(hash_bytes(&canonical))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[tokio::test]
    async fn reader_and_buffer_agree() {
        let data = vec![7u8; 3 * CHUNK_SIZE + 17];
        let streamed = hash_reader(data.as_slice()).await.unwrap();
        assert_eq!(streamed, hash_bytes(&data));
    }

    #[tokio::test]
    async fn empty_input_hashes_to_sha256_of_nothing() {
        let digest = hash_reader(&b""[..]).await.unwrap();
        assert_eq!(
            digest,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[derive(Serialize)]
    struct Doc {
        format_version: u32,
        manifest_refs: Vec<String>,
        checksum_sha256: String,
        created_at: String,
    }

    #[test]
    fn document_hash_ignores_volatile_fields() {
        let a = Doc {
            format_version: 1,
            manifest_refs: vec!["x_video_manifest.json".to_string()],
            checksum_sha256: String::new(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
        };
        let b = Doc {
            format_version: 1,
            manifest_refs: vec!["x_video_manifest.json".to_string()],
            checksum_sha256: "deadbeef".to_string(),
            created_at: "2026-06-30T12:00:00Z".to_string(),
        };
        assert_eq!(hash_document(&a).unwrap(), hash_document(&b).unwrap());
    }

    #[test]
    fn document_hash_sees_content_changes() {
        let a = Doc {
            format_version: 1,
            manifest_refs: vec!["a.json".to_string()],
            checksum_sha256: String::new(),
            created_at: String::new(),
        };
        let b = Doc {
            format_version: 1,
            manifest_refs: vec!["b.json".to_string()],
            checksum_sha256: String::new(),
            created_at: String::new(),
        };
        assert_ne!(hash_document(&a).unwrap(), hash_document(&b).unwrap());
    }
}
