//! Framed binary encoding of [`NodesConfiguration`].
//!
//! ```text
//! +-------+--------+-------+----------------+------------------------+
//! | "NCF" | format | flags | version (u64be)| bincode body (maybe    |
//! | 3B    | 1B     | 1B    | 8B             | zlib compressed)       |
//! +-------+--------+-------+----------------+------------------------+
//! ```
//!
//! The version is duplicated in the header so stores can order values
//! without decoding the body. An empty byte string is the encoding of a
//! store location that was never written.

use std::io::Read;
use std::io::Write;

use bytes::BufMut;
use bytes::Bytes;
use bytes::BytesMut;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::CodecError;
use crate::MembershipVersion;
use crate::NodesConfiguration;

const MAGIC: &[u8; 3] = b"NCF";
const FORMAT_VERSION: u8 = 1;
const FLAG_COMPRESSED: u8 = 0b0000_0001;
pub(crate) const HEADER_LEN: usize = 3 + 1 + 1 + 8;
/// Upper bound on an inflated body
pub(crate) const MAX_DECOMPRESSED_LEN: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct NodesConfigurationCodec {
    compress: bool,
}

impl NodesConfigurationCodec {
    pub fn new(compress: bool) -> Self {
        Self { compress }
    }

    pub fn serialize(
        &self,
        config: &NodesConfiguration,
    ) -> Result<Bytes, CodecError> {
        let body = bincode::serialize(config)?;
        let (flags, body) = if self.compress {
            let mut encoder = ZlibEncoder::new(Vec::with_capacity(body.len() / 2), Compression::default());
            encoder.write_all(&body)?;
            (FLAG_COMPRESSED, encoder.finish()?)
        } else {
            (0, body)
        };

        let mut buf = BytesMut::with_capacity(HEADER_LEN + body.len());
        buf.put_slice(MAGIC);
        buf.put_u8(FORMAT_VERSION);
        buf.put_u8(flags);
        buf.put_u64(config.version().val());
        buf.put_slice(&body);
        Ok(buf.freeze())
    }

    /// Decodes and validates a serialized configuration.
    ///
    /// Both the header and the body must agree on the version, and the
    /// decoded payload must pass [`NodesConfiguration::validate`].
    pub fn deserialize(data: &[u8]) -> Result<NodesConfiguration, CodecError> {
        if data.is_empty() {
            return Ok(NodesConfiguration::empty());
        }

        let header_version = Self::extract_config_version(data)?;
        let flags = data[4];
        let body = &data[HEADER_LEN..];

        let config: NodesConfiguration = if flags & FLAG_COMPRESSED != 0 {
            let decoded = inflate(body, MAX_DECOMPRESSED_LEN)?;
            bincode::deserialize(&decoded)?
        } else {
            bincode::deserialize(body)?
        };

        if config.version() != header_version || !config.validate() {
            return Err(CodecError::Invalid(config.version()));
        }
        Ok(config)
    }

    /// Reads the version from the header without decoding the body.
    pub fn extract_config_version(data: &[u8]) -> Result<MembershipVersion, CodecError> {
        if data.is_empty() {
            return Ok(MembershipVersion::EMPTY_VERSION);
        }
        if data.len() < HEADER_LEN {
            return Err(CodecError::Truncated(data.len()));
        }
        if &data[0..3] != MAGIC {
            return Err(CodecError::BadMagic);
        }
        if data[3] != FORMAT_VERSION {
            return Err(CodecError::UnsupportedFormat(data[3]));
        }

        let mut version = [0u8; 8];
        version.copy_from_slice(&data[5..HEADER_LEN]);
        Ok(MembershipVersion::new(u64::from_be_bytes(version)))
    }
}

/// Inflates a zlib body, refusing to produce more than `limit` bytes.
pub(crate) fn inflate(
    body: &[u8],
    limit: u64,
) -> Result<Vec<u8>, CodecError> {
    let mut decoded = Vec::new();
    ZlibDecoder::new(body).take(limit + 1).read_to_end(&mut decoded)?;
    if decoded.len() as u64 > limit {
        return Err(CodecError::TooLarge(limit));
    }
    Ok(decoded)
}
