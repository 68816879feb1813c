//! Content encoding negotiation for request and response bodies.
//!
//! A [`ContentEncoder`] compresses outgoing bodies and decompresses incoming
//! ones under one negotiated [`Scheme`]. Encoders are built from an
//! [`EncodingConfig`] by [`ContentEncoder::new`]; an unset or unrecognized
//! scheme yields `None`, which callers treat as "send and read bodies as-is".
//!
//! # Schemes
//!
//! | Scheme | Header value | Backend | Pooled state |
//! |--------|--------------|---------|--------------|
//! | [`Scheme::Gzip`] | `gzip` | `flate2` raw deflate + gzip framing | `flate2::Compress`, buffers |
//! | [`Scheme::Deflate`] | `deflate` | `flate2` zlib framing | `flate2::Compress`, buffers |
//! | [`Scheme::Brotli`] | `br` | `brotli` | buffers |
//!
//! # Error Reporting
//!
//! [`EncodingError`] keeps compression-format failures
//! ([`EncodingError::Decompress`]) apart from JSON failures
//! ([`EncodingError::Json`]) so callers can tell "this was not gzip" from
//! "this was not valid JSON".
//!
//! # Examples
//!
//! ```
//! use docsearch_http::encoding::{BufferPool, ContentEncoder, EncodingConfig, Scheme};
//! use std::sync::Arc;
//!
//! let buffers = Arc::new(BufferPool::new());
//! let encoder = ContentEncoder::new(&EncodingConfig::new(Scheme::Gzip), buffers).unwrap();
//!
//! let compressed = encoder.encode_bytes(br#"{"q":"dune"}"#).unwrap();
//! let value: serde_json::Value = encoder.decode(&compressed).unwrap();
//! assert_eq!(value["q"], "dune");
//! ```

mod br;
mod flate;
pub mod pool;

pub use pool::{BufferPool, Pool, Pooled};

use serde::de::DeserializeOwned;
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;

/// Size of the scratch chunk used when copying from a reader.
const SCRATCH_SIZE: usize = 32 * 1024;

/// Compression scheme negotiated with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scheme {
    /// Bodies are sent and read uncompressed.
    #[default]
    None,
    /// RFC 1952 gzip.
    Gzip,
    /// HTTP `deflate`, i.e. RFC 1950 zlib framing.
    Deflate,
    /// RFC 7932 brotli.
    Brotli,
}

impl Scheme {
    /// Value used in `Content-Encoding` and `Accept-Encoding` headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::None => "",
            Scheme::Gzip => "gzip",
            Scheme::Deflate => "deflate",
            Scheme::Brotli => "br",
        }
    }

    /// Look up a scheme by header value or common name.
    ///
    /// Returns `None` for unrecognized names.
    pub fn from_name(name: &str) -> Option<Scheme> {
        match name.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Some(Scheme::Gzip),
            "deflate" => Some(Scheme::Deflate),
            "br" | "brotli" => Some(Scheme::Brotli),
            _ => None,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::None => f.write_str("identity"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Compression level requested for outgoing bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionLevel {
    /// Backend default (flate2 level 6, brotli quality 6).
    #[default]
    Default,
    /// Fastest setting.
    BestSpeed,
    /// Smallest output.
    BestCompression,
    /// Store without compressing (brotli quality 0).
    NoCompression,
    /// Explicit level, clamped to 0-9 for flate2 and 0-11 for brotli.
    Level(u32),
}

impl CompressionLevel {
    pub(crate) fn flate2(&self) -> flate2::Compression {
        match self {
            CompressionLevel::Default => flate2::Compression::default(),
            CompressionLevel::BestSpeed => flate2::Compression::fast(),
            CompressionLevel::BestCompression => flate2::Compression::best(),
            CompressionLevel::NoCompression => flate2::Compression::none(),
            CompressionLevel::Level(level) => flate2::Compression::new((*level).min(9)),
        }
    }

    pub(crate) fn brotli_quality(&self) -> u32 {
        match self {
            CompressionLevel::Default => 6,
            CompressionLevel::BestSpeed | CompressionLevel::NoCompression => 0,
            CompressionLevel::BestCompression => 11,
            CompressionLevel::Level(level) => (*level).min(11),
        }
    }
}

/// Encoding settings of one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodingConfig {
    /// Scheme used for request bodies and advertised for responses.
    pub scheme: Scheme,
    /// Compression level for request bodies.
    pub level: CompressionLevel,
}

impl EncodingConfig {
    /// Use `scheme` at the default level.
    pub fn new(scheme: Scheme) -> Self {
        EncodingConfig {
            scheme,
            level: CompressionLevel::Default,
        }
    }

    /// Set the compression level.
    #[must_use]
    pub fn with_level(mut self, level: CompressionLevel) -> Self {
        self.level = level;
        self
    }
}

/// Errors produced while encoding or decoding bodies.
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    /// Compressing the source failed (including reads from the source).
    #[error("{scheme} compression failed: {source}")]
    Compress {
        /// Scheme in use.
        scheme: Scheme,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The input is not valid data for the declared scheme.
    #[error("{scheme} decompression failed: {source}")]
    Decompress {
        /// Scheme in use.
        scheme: Scheme,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The decompressed body is not valid JSON for the target type.
    #[error("JSON decoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl EncodingError {
    /// Check if the failure came from the compression format.
    pub fn is_decompression(&self) -> bool {
        matches!(self, EncodingError::Decompress { .. })
    }
}

/// One compression scheme's implementation.
pub(crate) trait Codec: Send + Sync {
    /// Compress everything `src` yields, copying through `scratch`.
    fn compress(&self, src: &mut dyn Read, scratch: &mut Vec<u8>, out: &mut Vec<u8>)
        -> io::Result<()>;

    /// Compress an in-memory slice without an intermediate copy.
    fn compress_slice(&self, src: &[u8], out: &mut Vec<u8>) -> io::Result<()>;

    /// Decompress `src`, appending to `out`.
    fn decompress(&self, src: &[u8], out: &mut Vec<u8>) -> io::Result<()>;
}

/// Pooled encoder/decoder for one negotiated scheme.
pub struct ContentEncoder {
    scheme: Scheme,
    codec: Box<dyn Codec>,
    buffers: Arc<BufferPool>,
}

impl ContentEncoder {
    /// Build the encoder for `config`.
    ///
    /// Returns `None` for [`Scheme::None`]: no encoding is applied.
    pub fn new(config: &EncodingConfig, buffers: Arc<BufferPool>) -> Option<Self> {
        let codec: Box<dyn Codec> = match config.scheme {
            Scheme::None => return None,
            Scheme::Gzip => Box::new(flate::FlateCodec::gzip(config.level.flate2())),
            Scheme::Deflate => Box::new(flate::FlateCodec::zlib(config.level.flate2())),
            Scheme::Brotli => Box::new(br::BrotliCodec::new(config.level.brotli_quality())),
        };

        Some(ContentEncoder {
            scheme: config.scheme,
            codec,
            buffers,
        })
    }

    /// Build the encoder for a scheme name such as `gzip` or `br`.
    ///
    /// Unrecognized names yield `None` rather than an error.
    pub fn from_name(name: &str, level: CompressionLevel, buffers: Arc<BufferPool>) -> Option<Self> {
        let scheme = Scheme::from_name(name)?;
        Self::new(&EncodingConfig { scheme, level }, buffers)
    }

    /// The scheme this encoder implements.
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Compress everything read from `src`.
    pub fn encode(&self, src: &mut dyn Read) -> Result<Vec<u8>, EncodingError> {
        let mut scratch = self.buffers.get();
        scratch.resize(SCRATCH_SIZE, 0);
        let mut out = Vec::new();
        self.codec
            .compress(src, &mut scratch, &mut out)
            .map_err(|source| EncodingError::Compress {
                scheme: self.scheme,
                source,
            })?;
        Ok(out)
    }

    /// Compress an in-memory body.
    pub fn encode_bytes(&self, src: &[u8]) -> Result<Vec<u8>, EncodingError> {
        let mut out = Vec::with_capacity(src.len() / 2 + 64);
        self.codec
            .compress_slice(src, &mut out)
            .map_err(|source| EncodingError::Compress {
                scheme: self.scheme,
                source,
            })?;
        Ok(out)
    }

    /// Decompress `src`, appending the plain bytes to `out`.
    pub fn decompress_into(&self, src: &[u8], out: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.codec
            .decompress(src, out)
            .map_err(|source| EncodingError::Decompress {
                scheme: self.scheme,
                source,
            })
    }

    /// Decompress `src` into a new buffer.
    pub fn decompress(&self, src: &[u8]) -> Result<Vec<u8>, EncodingError> {
        let mut out = Vec::with_capacity(src.len() * 2);
        self.decompress_into(src, &mut out)?;
        Ok(out)
    }

    /// Decompress `src` and decode the JSON it holds.
    pub fn decode<T: DeserializeOwned>(&self, src: &[u8]) -> Result<T, EncodingError> {
        let mut plain = self.buffers.get();
        self.decompress_into(src, &mut plain)?;
        Ok(serde_json::from_slice(&plain)?)
    }
}

impl fmt::Debug for ContentEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentEncoder")
            .field("scheme", &self.scheme)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    struct Document {
        id: u64,
        title: String,
        genres: Vec<String>,
    }

    fn encoder(scheme: Scheme) -> ContentEncoder {
        ContentEncoder::new(&EncodingConfig::new(scheme), Arc::new(BufferPool::new())).unwrap()
    }

    const SCHEMES: [Scheme; 3] = [Scheme::Gzip, Scheme::Deflate, Scheme::Brotli];

    #[test]
    fn test_round_trip_document() {
        let doc = Document {
            id: 42,
            title: "Dune".into(),
            genres: vec!["sci-fi".into(), "classic".into()],
        };
        let json = serde_json::to_vec(&doc).unwrap();
        for scheme in SCHEMES {
            let enc = encoder(scheme);
            let compressed = enc.encode_bytes(&json).unwrap();
            let back: Document = enc.decode(&compressed).unwrap();
            assert_eq!(back, doc, "scheme {}", scheme);
        }
    }

    #[test]
    fn test_round_trip_zero_value_and_empty_bytes() {
        let json = serde_json::to_vec(&Document::default()).unwrap();
        for scheme in SCHEMES {
            let enc = encoder(scheme);
            let back: Document = enc.decode(&enc.encode_bytes(&json).unwrap()).unwrap();
            assert_eq!(back, Document::default());

            let empty = enc.encode_bytes(&[]).unwrap();
            assert!(enc.decompress(&empty).unwrap().is_empty(), "scheme {}", scheme);
        }
    }

    #[test]
    fn test_reader_path_matches_slice_path() {
        let body = "{\"q\":\"x\"}".repeat(20_000);
        for scheme in SCHEMES {
            let enc = encoder(scheme);
            let mut reader = body.as_bytes();
            let compressed = enc.encode(&mut reader).unwrap();
            assert!(compressed.len() < body.len());
            assert_eq!(enc.decompress(&compressed).unwrap(), body.as_bytes());
        }
    }

    #[test]
    fn test_wrong_scheme_is_decompression_error() {
        for written in SCHEMES {
            let data = encoder(written).encode_bytes(b"{\"a\":1}").unwrap();
            for read in SCHEMES.into_iter().filter(|s| *s != written) {
                let err = encoder(read).decode::<serde_json::Value>(&data).unwrap_err();
                assert!(err.is_decompression(), "{} read as {}", written, read);
                assert!(
                    matches!(err, EncodingError::Decompress { scheme, .. } if scheme == read),
                    "{} read as {}",
                    written,
                    read
                );
            }
        }
    }

    #[test]
    fn test_invalid_json_is_json_error() {
        let enc = encoder(Scheme::Gzip);
        let data = enc.encode_bytes(b"not json").unwrap();
        let err = enc.decode::<serde_json::Value>(&data).unwrap_err();
        assert!(matches!(err, EncodingError::Json(_)));
        assert!(!err.is_decompression());
    }

    #[test]
    fn test_unknown_scheme_yields_no_encoder() {
        let buffers = Arc::new(BufferPool::new());
        assert!(ContentEncoder::from_name("zstd", CompressionLevel::Default, buffers.clone()).is_none());
        assert!(ContentEncoder::new(&EncodingConfig::default(), buffers.clone()).is_none());
        let br = ContentEncoder::from_name("br", CompressionLevel::BestSpeed, buffers).unwrap();
        assert_eq!(br.scheme(), Scheme::Brotli);
    }

    #[test]
    fn test_levels_are_clamped() {
        assert_eq!(CompressionLevel::Level(42).flate2().level(), 9);
        assert_eq!(CompressionLevel::Level(42).brotli_quality(), 11);
        assert_eq!(CompressionLevel::NoCompression.flate2().level(), 0);
    }

    #[test]
    fn test_scratch_buffers_return_to_pool() {
        let buffers = Arc::new(BufferPool::new());
        let enc = ContentEncoder::new(&EncodingConfig::new(Scheme::Deflate), buffers.clone()).unwrap();
        let mut reader: &[u8] = b"{\"ok\":true}";
        let data = enc.encode(&mut reader).unwrap();
        let _: serde_json::Value = enc.decode(&data).unwrap();
        assert_eq!(buffers.idle(), 1);
    }

    #[test]
    fn test_concurrent_encoding() {
        let enc = Arc::new(encoder(Scheme::Gzip));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let enc = enc.clone();
                std::thread::spawn(move || {
                    let body = format!("{{\"worker\":{}}}", i);
                    let data = enc.encode_bytes(body.as_bytes()).unwrap();
                    let value: serde_json::Value = enc.decode(&data).unwrap();
                    assert_eq!(value["worker"], i);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
