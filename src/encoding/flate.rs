//! gzip and deflate codecs on top of `flate2`.
//!
//! Both schemes share one pooled raw compressor type. `deflate` lets
//! `flate2::Compress` emit zlib framing itself; `gzip` runs a raw deflate
//! stream and writes the RFC 1952 header and CRC trailer around it, since
//! `flate2`'s gzip writer cannot be reset and reused.

use super::pool::Pool;
use super::Codec;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::{Compress, Compression, Crc, FlushCompress, Status};
use std::io::{self, Read};

/// Minimal gzip member header: deflate, no flags, no mtime, unknown OS.
const GZIP_HEADER: [u8; 10] = [0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff];

/// Spare output capacity kept available for each compressor call.
const MIN_SPARE: usize = 4 * 1024;

/// Idle compressors kept per codec.
const MAX_IDLE_COMPRESSORS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Gzip,
    Zlib,
}

pub(crate) struct FlateCodec {
    framing: Framing,
    compressors: Pool<Compress>,
}

impl FlateCodec {
    pub(crate) fn gzip(level: Compression) -> Self {
        Self::new(Framing::Gzip, level)
    }

    pub(crate) fn zlib(level: Compression) -> Self {
        Self::new(Framing::Zlib, level)
    }

    fn new(framing: Framing, level: Compression) -> Self {
        let zlib_header = framing == Framing::Zlib;
        let compressors = Pool::with_factory(
            move || Compress::new(level, zlib_header),
            |compress: &mut Compress| {
                compress.reset();
                true
            },
        )
        .with_max_idle(MAX_IDLE_COMPRESSORS);

        FlateCodec {
            framing,
            compressors,
        }
    }

    fn begin(&self, out: &mut Vec<u8>) {
        if self.framing == Framing::Gzip {
            out.extend_from_slice(&GZIP_HEADER);
        }
    }

    fn finish(&self, compress: &mut Compress, crc: &Crc, out: &mut Vec<u8>) -> io::Result<()> {
        deflate_into(compress, &[], out, FlushCompress::Finish)?;
        if self.framing == Framing::Gzip {
            out.extend_from_slice(&crc.sum().to_le_bytes());
            out.extend_from_slice(&crc.amount().to_le_bytes());
        }
        Ok(())
    }
}

impl Codec for FlateCodec {
    fn compress(
        &self,
        src: &mut dyn Read,
        scratch: &mut Vec<u8>,
        out: &mut Vec<u8>,
    ) -> io::Result<()> {
        let mut compress = self.compressors.get();
        let mut crc = Crc::new();
        self.begin(out);

        loop {
            let n = match src.read(scratch) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            crc.update(&scratch[..n]);
            deflate_into(&mut compress, &scratch[..n], out, FlushCompress::None)?;
        }

        self.finish(&mut compress, &crc, out)
    }

    fn compress_slice(&self, src: &[u8], out: &mut Vec<u8>) -> io::Result<()> {
        let mut compress = self.compressors.get();
        let mut crc = Crc::new();
        crc.update(src);
        self.begin(out);
        deflate_into(&mut compress, src, out, FlushCompress::None)?;
        self.finish(&mut compress, &crc, out)
    }

    fn decompress(&self, src: &[u8], out: &mut Vec<u8>) -> io::Result<()> {
        match self.framing {
            Framing::Gzip => GzDecoder::new(src).read_to_end(out)?,
            Framing::Zlib => ZlibDecoder::new(src).read_to_end(out)?,
        };
        Ok(())
    }
}

/// Feed `input` through `compress`, growing `out` as needed.
///
/// With `FlushCompress::Finish` this runs until the stream end marker is
/// written; otherwise until all input is consumed.
fn deflate_into(
    compress: &mut Compress,
    mut input: &[u8],
    out: &mut Vec<u8>,
    flush: FlushCompress,
) -> io::Result<()> {
    loop {
        if out.capacity() - out.len() < MIN_SPARE {
            out.reserve(input.len() / 2 + MIN_SPARE);
        }

        let before = compress.total_in();
        let status = compress
            .compress_vec(input, out, flush)
            .map_err(io::Error::other)?;
        let consumed = (compress.total_in() - before) as usize;
        input = &input[consumed..];

        let done = match flush {
            FlushCompress::Finish => status == Status::StreamEnd,
            _ => input.is_empty() && out.len() < out.capacity(),
        };
        if done {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compressed(codec: &FlateCodec, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        codec.compress_slice(data, &mut out).unwrap();
        out
    }

    #[test]
    fn test_gzip_output_is_readable_by_flate2() {
        let codec = FlateCodec::gzip(Compression::default());
        let data = compressed(&codec, b"hello gzip");
        assert_eq!(&data[..2], &[0x1f, 0x8b]);

        let mut plain = String::new();
        GzDecoder::new(&data[..]).read_to_string(&mut plain).unwrap();
        assert_eq!(plain, "hello gzip");
    }

    #[test]
    fn test_zlib_header() {
        let codec = FlateCodec::zlib(Compression::default());
        let data = compressed(&codec, b"hello zlib");
        assert_eq!(data[0], 0x78);
    }

    #[test]
    fn test_compressor_reused_after_reset() {
        let codec = FlateCodec::gzip(Compression::fast());
        let first = compressed(&codec, b"same input");
        assert_eq!(codec.compressors.idle(), 1);
        let second = compressed(&codec, b"same input");
        assert_eq!(first, second);
        assert_eq!(codec.compressors.idle(), 1);
    }

    #[test]
    fn test_large_input_grows_output() {
        let codec = FlateCodec::zlib(Compression::none());
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let out = compressed(&codec, &data);
        let mut plain = Vec::new();
        codec.decompress(&out, &mut plain).unwrap();
        assert_eq!(plain, data);
    }

    #[test]
    fn test_truncated_gzip_fails() {
        let codec = FlateCodec::gzip(Compression::default());
        let data = compressed(&codec, b"{\"truncated\":true}");
        let mut plain = Vec::new();
        assert!(codec.decompress(&data[..data.len() - 6], &mut plain).is_err());
    }
}
