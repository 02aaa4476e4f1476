//! Transparent decompression of source streams.
//!
//! Detection is extension-first (`.gz`, `.gzip`, which also covers
//! `.tar.gz`), falling back to the gzip magic bytes so a mislabelled file
//! still decodes. Anything else is read as plain text.
//!
//! Decoding is always streaming: no decompressed copy is written to disk.

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

const GZIP_EXTENSIONS: &[&str] = &[".gz", ".gzip"];
const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];

/// How a source stream is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Gzip,
    Plain,
}

impl Codec {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Plain => "plain",
        }
    }
}

fn detect_from_extension(path: &Path) -> Option<Codec> {
    let lower = path.to_string_lossy().to_lowercase();
    GZIP_EXTENSIONS
        .iter()
        .any(|ext| lower.ends_with(ext))
        .then_some(Codec::Gzip)
}

/// Peek at the start of the stream without consuming it.
fn detect_from_magic<R: BufRead>(reader: &mut R) -> io::Result<Codec> {
    let buf = reader.fill_buf()?;
    if buf.starts_with(GZIP_MAGIC) {
        Ok(Codec::Gzip)
    } else {
        Ok(Codec::Plain)
    }
}

/// Wrap `reader` with a decoder chosen from `path_hint` or the stream's magic bytes.
///
/// # Errors
/// Propagates I/O errors from peeking at the stream.
pub fn auto_detect_reader<R: Read + 'static>(
    reader: R,
    path_hint: impl AsRef<Path>,
) -> io::Result<(Codec, Box<dyn Read>)> {
    let mut buffered = BufReader::new(reader);
    let codec = match detect_from_extension(path_hint.as_ref()) {
        Some(codec) => codec,
        None => detect_from_magic(&mut buffered)?,
    };
    let decoded: Box<dyn Read> = match codec {
        Codec::Gzip => Box::new(MultiGzDecoder::new(buffered)),
        Codec::Plain => Box::new(buffered),
    };
    Ok((codec, decoded))
}

/// Open a file as a decompressing byte stream.
///
/// # Errors
/// Fails when the file cannot be opened or peeked.
pub fn open_source(path: impl AsRef<Path>) -> io::Result<(Codec, Box<dyn Read>)> {
    let path = path.as_ref();
    let file = File::open(path)?;
    auto_detect_reader(file, path)
}
