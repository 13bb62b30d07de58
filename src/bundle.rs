//! Persisted index bundles.
//!
//! Layout: `b"CQIX"`, a format version byte, a compression byte, then the
//! (optionally LZ4/ZSTD compressed) bincode body. The body records the
//! fingerprint of the corpus the indexes were fitted on, so a bundle that
//! no longer matches its data file can be detected and rebuilt.

use crate::{index::TfidfIndex, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use xxhash_rust::xxh3::Xxh3;

/// File magic
pub const MAGIC: &[u8; 4] = b"CQIX";
/// Current bundle format version
pub const FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = MAGIC.len() + 2;

/// Compression algorithm for the bundle body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Store bincode as-is
    None,
    /// LZ4 - fast (default)
    #[default]
    Lz4,
    /// ZSTD - better ratio, slower
    Zstd,
}

impl Compression {
    /// Algorithm name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
        }
    }

    const fn tag(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Lz4 => 1,
            Self::Zstd => 2,
        }
    }

    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Self::None),
            1 => Ok(Self::Lz4),
            2 => Ok(Self::Zstd),
            other => Err(Error::InvalidFormat(format!(
                "unknown compression tag {other}"
            ))),
        }
    }

    /// Compress data using this algorithm
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::None => Ok(data.to_vec()),
            Self::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
            Self::Zstd => zstd::encode_all(data, 3)
                .map_err(|e| Error::Encoding(format!("zstd compression failed: {e}"))),
        }
    }

    /// Decompress data using this algorithm
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::None => Ok(data.to_vec()),
            Self::Lz4 => lz4_flex::decompress_size_prepended(data)
                .map_err(|e| Error::Encoding(format!("lz4 decompression failed: {e}"))),
            Self::Zstd => zstd::decode_all(data)
                .map_err(|e| Error::Encoding(format!("zstd decompression failed: {e}"))),
        }
    }
}

/// Corpus fingerprint: xxh3 over the indexed texts, in order
#[must_use]
pub fn fingerprint<'a, I>(texts: I) -> u64
where
    I: IntoIterator<Item = &'a str>,
{
    let mut hasher = Xxh3::new();
    for text in texts {
        hasher.update(text.as_bytes());
        // 0xff never occurs in UTF-8
        hasher.update(&[0xff]);
    }
    hasher.digest()
}

/// Named TF-IDF indexes fitted on one corpus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexBundle {
    fingerprint: u64,
    indexes: BTreeMap<String, TfidfIndex>,
}

impl IndexBundle {
    /// Empty bundle for a corpus with the given fingerprint
    #[must_use]
    pub fn new(fingerprint: u64) -> Self {
        Self {
            fingerprint,
            indexes: BTreeMap::new(),
        }
    }

    /// Add an index under a field name
    #[must_use]
    pub fn with_index(mut self, field: impl Into<String>, index: TfidfIndex) -> Self {
        self.indexes.insert(field.into(), index);
        self
    }

    /// Fingerprint of the corpus the indexes were fitted on
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Index for a field
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&TfidfIndex> {
        self.indexes.get(field)
    }

    /// Remove and return the index for a field
    pub fn take(&mut self, field: &str) -> Result<TfidfIndex> {
        self.indexes
            .remove(field)
            .ok_or_else(|| Error::InvalidFormat(format!("bundle has no '{field}' index")))
    }

    /// Field names, sorted
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.indexes.keys().map(String::as_str)
    }

    /// Fail with [`Error::StaleIndex`] unless the bundle was built from a
    /// corpus with fingerprint `actual`
    pub fn verify(&self, actual: u64) -> Result<()> {
        if self.fingerprint != actual {
            return Err(Error::StaleIndex {
                expected: self.fingerprint,
                actual,
            });
        }
        Ok(())
    }

    /// Encode with header
    pub fn to_bytes(&self, compression: Compression) -> Result<Vec<u8>> {
        let body = bincode::serialize(self)
            .map_err(|e| Error::Encoding(format!("bincode serialization failed: {e}")))?;
        let body = compression.compress(&body)?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
        bytes.extend_from_slice(MAGIC);
        bytes.push(FORMAT_VERSION);
        bytes.push(compression.tag());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    /// Decode bytes produced by [`IndexBundle::to_bytes`]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN || &data[..MAGIC.len()] != MAGIC {
            return Err(Error::InvalidFormat("not an index bundle".to_string()));
        }
        let version = data[MAGIC.len()];
        if version != FORMAT_VERSION {
            return Err(Error::InvalidFormat(format!(
                "unsupported bundle version {version} (expected {FORMAT_VERSION})"
            )));
        }
        let compression = Compression::from_tag(data[MAGIC.len() + 1])?;
        let body = compression.decompress(&data[HEADER_LEN..])?;
        let bundle: Self = bincode::deserialize(&body)
            .map_err(|e| Error::Encoding(format!("bincode deserialization failed: {e}")))?;
        for index in bundle.indexes.values() {
            index.validate()?;
        }
        Ok(bundle)
    }

    /// Write the bundle to `path`, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>, compression: Compression) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = self.to_bytes(compression)?;
        std::fs::write(path, &bytes)?;
        tracing::info!(
            path = %path.display(),
            bytes = bytes.len(),
            compression = compression.as_str(),
            fields = self.indexes.len(),
            "saved index bundle"
        );
        Ok(())
    }

    /// Read a bundle from `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::MissingFile(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        let bundle = Self::from_bytes(&bytes)?;
        tracing::info!(
            path = %path.display(),
            fingerprint = %format!("{:016x}", bundle.fingerprint),
            "loaded index bundle"
        );
        Ok(bundle)
    }
}
