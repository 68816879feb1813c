//! Brotli codec on top of the `brotli` crate.
//!
//! The brotli encoder state cannot be reset between streams, so a fresh
//! `CompressorWriter` is built per call; only the scratch buffer comes from
//! the pool.

use super::Codec;
use std::io::{self, Read, Write};

/// Internal buffer size handed to the brotli reader and writer.
const BUFFER_SIZE: usize = 4096;

/// Sliding window size (log2) used for encoding.
const LG_WINDOW: u32 = 22;

pub(crate) struct BrotliCodec {
    quality: u32,
}

impl BrotliCodec {
    pub(crate) fn new(quality: u32) -> Self {
        BrotliCodec { quality }
    }

    fn writer<'a>(&self, out: &'a mut Vec<u8>) -> brotli::CompressorWriter<&'a mut Vec<u8>> {
        brotli::CompressorWriter::new(out, BUFFER_SIZE, self.quality, LG_WINDOW)
    }
}

impl Codec for BrotliCodec {
    fn compress(
        &self,
        src: &mut dyn Read,
        scratch: &mut Vec<u8>,
        out: &mut Vec<u8>,
    ) -> io::Result<()> {
        let mut writer = self.writer(out);
        loop {
            let n = match src.read(scratch) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            writer.write_all(&scratch[..n])?;
        }
        // into_inner writes the final meta-block
        writer.into_inner();
        Ok(())
    }

    fn compress_slice(&self, src: &[u8], out: &mut Vec<u8>) -> io::Result<()> {
        let mut writer = self.writer(out);
        writer.write_all(src)?;
        writer.into_inner();
        Ok(())
    }

    fn decompress(&self, src: &[u8], out: &mut Vec<u8>) -> io::Result<()> {
        brotli::Decompressor::new(src, BUFFER_SIZE).read_to_end(out)?;
        Ok(())
    }
}
