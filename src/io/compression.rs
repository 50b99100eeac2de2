//! Block compression for binary leaves.
//!
//! When enabled via feature flags, the following codecs are available:
//! - **zstd** via `zstd` (feature: `compression-zstd`)
//! - **gzip** via `flate2` (feature: `compression-gzip`)
//! - **xz** via `xz2` (feature: `compression-xz`)
//! - **bzip2** via `bzip2` (feature: `compression-bzip2`)
//!
//! Codecs live in a [`CompressionRegistry`] owned by the backend that uses
//! them; there is no process-wide table. Custom codecs are added with
//! [`CompressionRegistry::register`].
//!
//! ```
//! use sheaf::io::compression::CompressionCodec;
//!
//! struct Identity;
//!
//! impl CompressionCodec for Identity {
//!     fn name(&self) -> &str { "identity" }
//!     fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> { Ok(data.to_vec()) }
//!     fn decompress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> { Ok(data.to_vec()) }
//! }
//! ```

use std::io;
use std::sync::Arc;

/// A block compression algorithm.
///
/// Implementations must be `Send + Sync`: a registry is shared by every save
/// running on the worker pool.
pub trait CompressionCodec: Send + Sync {
    /// Name recorded in the layout side-car (e.g. `"zstd"`).
    fn name(&self) -> &str;

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>>;

    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>>;
}

/// Name of the codec [`crate::io::SaveOptions::default`] asks for: the first
/// compiled of zstd, gzip, xz, bzip2.
pub fn default_codec_name() -> Option<&'static str> {
    [
        (cfg!(feature = "compression-zstd"), "zstd"),
        (cfg!(feature = "compression-gzip"), "gzip"),
        (cfg!(feature = "compression-xz"), "xz"),
        (cfg!(feature = "compression-bzip2"), "bzip2"),
    ]
    .into_iter()
    .find_map(|(on, name)| on.then_some(name))
}

/// Codecs by name.
#[derive(Clone, Default)]
pub struct CompressionRegistry {
    codecs: Vec<Arc<dyn CompressionCodec>>,
}

impl CompressionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every codec compiled into this build.
    pub fn builtin() -> Self {
        Self {
            codecs: vec![
                #[cfg(feature = "compression-zstd")]
                Arc::new(ZstdCodec),
                #[cfg(feature = "compression-gzip")]
                Arc::new(GzipCodec),
                #[cfg(feature = "compression-xz")]
                Arc::new(XzCodec),
                #[cfg(feature = "compression-bzip2")]
                Arc::new(Bzip2Codec),
            ],
        }
    }

    /// Add a codec. A codec with the same name is replaced.
    pub fn register(&mut self, codec: Arc<dyn CompressionCodec>) {
        self.codecs.retain(|c| c.name() != codec.name());
        self.codecs.push(codec);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CompressionCodec>> {
        self.codecs.iter().find(|c| c.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.codecs.iter().map(|c| c.name()).collect()
    }
}

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data)?;
        enc.finish()
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        use flate2::read::GzDecoder;
        use std::io::Read;
        let mut out = Vec::new();
        GzDecoder::new(data).read_to_end(&mut out)?;
        Ok(out)
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        zstd::stream::encode_all(data, 3)
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        zstd::stream::decode_all(data)
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &str {
        "bzip2"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        use bzip2::Compression;
        use bzip2::write::BzEncoder;
        use std::io::Write;
        let mut enc = BzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data)?;
        enc.finish()
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        use bzip2::read::BzDecoder;
        use std::io::Read;
        let mut out = Vec::new();
        BzDecoder::new(data).read_to_end(&mut out)?;
        Ok(out)
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &str {
        "xz"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        use std::io::Write;
        use xz2::write::XzEncoder;
        let mut enc = XzEncoder::new(Vec::new(), 6);
        enc.write_all(data)?;
        enc.finish()
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        use std::io::Read;
        use xz2::read::XzDecoder;
        let mut out = Vec::new();
        XzDecoder::new(data).read_to_end(&mut out)?;
        Ok(out)
    }
}
