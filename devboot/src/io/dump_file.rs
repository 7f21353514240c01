//! Reading dump files for size checks and progress estimation.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use tracing::debug;
use zip::ZipArchive;

use crate::core::dump::DumpFormat;
use crate::core::lines::{LineCounter, LineRule};
use crate::error::EngineError;

const READ_BUFFER_BYTES: usize = 64 * 1024;

pub fn file_size(path: &Path) -> Result<u64, EngineError> {
    fs::metadata(path)
        .map(|meta| meta.len())
        .map_err(|e| EngineError::io(format!("stat {}", path.display()), e))
}

/// Count qualifying lines in the SQL the dump decodes to, i.e. what the
/// import pipeline's first stage would write.
///
/// Gzip members are read back to back. Zip entries are read in archive order,
/// directories skipped, as one continuous stream. The handle is dropped on
/// every return path, including read errors.
pub fn count_qualifying_lines(
    path: &Path,
    format: DumpFormat,
    rule: LineRule,
) -> Result<u64, EngineError> {
    let file =
        File::open(path).map_err(|e| EngineError::io(format!("open {}", path.display()), e))?;
    let mut counter = LineCounter::new(rule);
    match format {
        DumpFormat::PlainSql => feed_reader(file, &mut counter, path)?,
        DumpFormat::Gzip => feed_reader(MultiGzDecoder::new(BufReader::new(file)), &mut counter, path)?,
        DumpFormat::Zip => {
            let mut archive = ZipArchive::new(BufReader::new(file)).map_err(|e| {
                EngineError::io(format!("open archive {}", path.display()), io::Error::other(e))
            })?;
            for index in 0..archive.len() {
                let entry = archive.by_index(index).map_err(|e| {
                    EngineError::io(
                        format!("read entry {index} of {}", path.display()),
                        io::Error::other(e),
                    )
                })?;
                if entry.is_dir() {
                    continue;
                }
                feed_reader(entry, &mut counter, path)?;
            }
        }
    }
    let lines = counter.finish();
    debug!(path = %path.display(), ?format, lines, "counted qualifying lines");
    Ok(lines)
}

fn feed_reader<R: Read>(
    reader: R,
    counter: &mut LineCounter,
    path: &Path,
) -> Result<(), EngineError> {
    let mut reader = BufReader::with_capacity(READ_BUFFER_BYTES, reader);
    loop {
        let buf = match reader.fill_buf() {
            Ok(buf) => buf,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(EngineError::io(format!("read {}", path.display()), e)),
        };
        if buf.is_empty() {
            return Ok(());
        }
        counter.feed(buf);
        let consumed = buf.len();
        reader.consume(consumed);
    }
}
