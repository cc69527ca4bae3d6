//! Stateless payload inflation.
//!
//! Every call owns its decoder, so concurrent extraction contexts never share
//! decompressor state. The output-length contract is strict: producing
//! anything other than the declared uncompressed size is an error, never a
//! silent truncation.

use crate::error::{ExtractError, ExtractResult};
use flate2::write::ZlibDecoder;
use lzzzz::{lz4, lz4f};
use std::io::Write;

/// Which codec an archive's compressed payloads use.
///
/// BA2 archives default to zlib; a version 3 header may select raw LZ4
/// blocks via its compression flag. SSE-era BSA archives (version 105) store
/// LZ4 frames, earlier versions zlib.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Codec {
    #[default]
    Zlib,
    Lz4,
    Lz4Frame,
}

/// Inflates `input` into `out`, which ends up holding exactly `expected`
/// bytes on success.
pub(crate) fn decompress_into(
    codec: Codec,
    input: &[u8],
    out: &mut Vec<u8>,
    expected: usize,
) -> ExtractResult<()> {
    out.clear();
    let actual = match codec {
        Codec::Zlib => {
            out.reserve_exact(expected);
            let mut decoder = ZlibDecoder::new(&mut *out);
            decoder.write_all(input)?;
            decoder.try_finish()?;
            decoder.total_out() as usize
        }
        Codec::Lz4 => {
            out.resize(expected, 0);
            lz4::decompress(input, out)?
        }
        Codec::Lz4Frame => {
            out.reserve_exact(expected);
            lz4f::decompress_to_vec(input, out)?
        }
    };

    if actual == expected {
        Ok(())
    } else {
        Err(ExtractError::DecompressionMismatch {
            expected,
            actual,
        })
    }
}

#[cfg(test)]
pub(crate) fn compress(codec: Codec, input: &[u8]) -> Vec<u8> {
    use flate2::{write::ZlibEncoder, Compression};

    match codec {
        Codec::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(input).unwrap();
            encoder.finish().unwrap()
        }
        Codec::Lz4 => {
            let mut out = Vec::new();
            lz4::compress_to_vec(input, &mut out, lz4::ACC_LEVEL_DEFAULT).unwrap();
            out
        }
        Codec::Lz4Frame => {
            let mut out = Vec::new();
            lz4f::compress_to_vec(input, &mut out, &Default::default()).unwrap();
            out
        }
    }
}
