use crate::{Envelope, GZIP_MAGIC};
use flate2::write::GzEncoder;
use flate2::Compression;
use prost::Message as _;
use std::io::Write;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("compressed envelope of {0} bytes exceeds the {1} byte limit")]
    PayloadTooLarge(usize, usize),
    #[error("failed to decode envelope: {0}")]
    Malformed(#[from] prost::DecodeError),
    #[error("compression failure: {0}")]
    Io(#[from] std::io::Error),
}

/// The size, in bytes, past which [`encode`] compresses and below which it ships raw bytes.
/// Mirrors the bus-reported maximum payload size when the bus advertises one smaller than
/// [`crate::DEFAULT_SIZE_LIMIT`].
#[derive(Clone, Copy, Debug)]
pub struct CompressionLimit(pub usize);

impl Default for CompressionLimit {
    fn default() -> Self {
        Self(crate::DEFAULT_SIZE_LIMIT)
    }
}

/// Serialises `envelope`, compressing with maximum-effort gzip if the raw encoding exceeds
/// `limit`. Fails with [`Error::PayloadTooLarge`] if the compressed form still exceeds `limit`.
///
/// This is `async` so callers never need to special-case it; the work itself is in-memory and
/// bounded by `limit`, so it never actually suspends.
pub async fn encode(envelope: &Envelope, limit: CompressionLimit) -> Result<Vec<u8>, Error> {
    let raw = envelope.encode_to_vec();
    if raw.len() <= limit.0 {
        return Ok(raw);
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(&raw)?;
    let compressed = encoder.finish()?;

    if compressed.len() > limit.0 {
        return Err(Error::PayloadTooLarge(compressed.len(), limit.0));
    }

    tracing::debug!(
        raw_bytes = raw.len(),
        compressed_bytes = compressed.len(),
        "compressed oversized envelope before publish"
    );
    Ok(compressed)
}

/// Decodes `bytes` into an [`Envelope`], transparently decompressing if it starts with the gzip
/// magic prefix.
pub async fn decode(bytes: &[u8]) -> Result<Envelope, Error> {
    let payload = if bytes.starts_with(&GZIP_MAGIC) {
        let mut decoder = flate2::read::GzDecoder::new(bytes);
        let mut decompressed = Vec::new();
        std::io::Read::read_to_end(&mut decoder, &mut decompressed)?;
        decompressed
    } else {
        bytes.to_vec()
    };

    Ok(Envelope::decode(payload.as_slice())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MessageType;

    #[derive(Clone, PartialEq, ::prost::Message)]
    struct Blob {
        #[prost(bytes, tag = "1")]
        data: Vec<u8>,
    }

    fn envelope_with_payload_len(n: usize) -> Envelope {
        let payload = crate::pack(&Blob { data: vec![0u8; n] }).unwrap();
        Envelope::new_request("req-1", "node-a", payload, "t0")
    }

    #[tokio::test]
    async fn round_trips_a_small_envelope_uncompressed() {
        let envelope = envelope_with_payload_len(16);
        let bytes = encode(&envelope, CompressionLimit::default()).await.unwrap();
        assert!(!bytes.starts_with(&GZIP_MAGIC));

        let decoded = decode(&bytes).await.unwrap();
        assert_eq!(decoded, envelope);
    }

    #[tokio::test]
    async fn compresses_oversized_repetitive_payloads() {
        // Repetitive bytes compress well and stay under the limit.
        let envelope = envelope_with_payload_len(2 * 1024 * 1024);
        let bytes = encode(&envelope, CompressionLimit::default()).await.unwrap();
        assert!(bytes.starts_with(&GZIP_MAGIC));
        assert!(bytes.len() <= crate::DEFAULT_SIZE_LIMIT);

        let decoded = decode(&bytes).await.unwrap();
        assert_eq!(decoded, envelope);
    }

    #[tokio::test]
    async fn rejects_payloads_that_do_not_compress_under_the_limit() {
        use rand::RngCore;
        let mut noise = vec![0u8; 2 * crate::DEFAULT_SIZE_LIMIT];
        rand::thread_rng().fill_bytes(&mut noise);
        let envelope = Envelope::new_request(
            "req-1",
            "node-a",
            crate::pack(&Blob { data: noise }).unwrap(),
            "t0",
        );

        let err = encode(&envelope, CompressionLimit::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge(_, _)));
    }

    #[tokio::test]
    async fn honors_a_bus_reported_limit_smaller_than_the_default() {
        let envelope = envelope_with_payload_len(4096);
        let bytes = encode(&envelope, CompressionLimit(512)).await.unwrap();
        assert!(bytes.starts_with(&GZIP_MAGIC));
    }

    #[test]
    fn message_type_round_trips_through_i32() {
        assert_eq!(MessageType::Error as i32, 1);
    }
}
