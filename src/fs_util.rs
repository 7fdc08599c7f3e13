use std::fs;
use std::io::{self, Read, Write};

use camino::Utf8Path;
use flate2::read::GzDecoder;

use crate::cancel::CancelToken;
use crate::error::CollectorError;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
}

impl Compression {
    fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "gz" | "gzip" => Some(Compression::Gzip),
            _ => None,
        }
    }
}

pub fn split_compression(file_name: &str) -> (&str, Option<Compression>) {
    if let Some((stem, ext)) = file_name.rsplit_once('.') {
        if !stem.is_empty() {
            if let Some(compression) = Compression::from_extension(ext) {
                return (stem, Some(compression));
            }
        }
    }
    (file_name, None)
}

pub fn last_extension(file_name: &str) -> Option<&str> {
    Utf8Path::new(file_name).extension()
}

#[derive(Debug)]
pub enum CopyError {
    Read(io::Error),
    Write(io::Error),
    Cancelled,
}

pub fn copy_cancellable<R, W>(
    reader: &mut R,
    writer: &mut W,
    cancel: &CancelToken,
) -> Result<u64, CopyError>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Err(CopyError::Cancelled);
        }
        let read = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(CopyError::Read(err)),
        };
        writer.write_all(&buf[..read]).map_err(CopyError::Write)?;
        total += read as u64;
    }
    writer.flush().map_err(CopyError::Write)?;
    Ok(total)
}

pub fn decompress_into(
    source: &Utf8Path,
    compression: Compression,
    destination: &mut dyn Write,
    cancel: &CancelToken,
) -> Result<u64, CollectorError> {
    let file = fs::File::open(source.as_std_path())
        .map_err(|err| CollectorError::fs(format!("open {source}: {err}")))?;
    let mut reader: Box<dyn Read> = match compression {
        Compression::Gzip => Box::new(GzDecoder::new(io::BufReader::new(file))),
    };
    copy_cancellable(&mut reader, destination, cancel).map_err(|err| match err {
        CopyError::Read(err) => CollectorError::DecompressionFailed {
            path: source.to_path_buf(),
            reason: err.to_string(),
        },
        CopyError::Write(err) => CollectorError::fs(err),
        CopyError::Cancelled => CollectorError::Cancelled,
    })
}

pub fn copy_file_into(
    source: &Utf8Path,
    destination: &mut dyn Write,
    cancel: &CancelToken,
) -> Result<u64, CollectorError> {
    let mut file = fs::File::open(source.as_std_path())
        .map_err(|err| CollectorError::fs(format!("open {source}: {err}")))?;
    copy_cancellable(&mut file, destination, cancel).map_err(|err| match err {
        CopyError::Read(err) | CopyError::Write(err) => CollectorError::fs(err),
        CopyError::Cancelled => CollectorError::Cancelled,
    })
}
