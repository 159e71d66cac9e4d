use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Take};
use std::mem;
use std::path::Path;

use crate::boundary::BoundaryTracker;

/// Splits a PGN byte stream into raw game records.
///
/// Bytes before the first record start (blank or escape lines) belong to no
/// record. A record runs up to the next record start or the end of the stream.
pub struct RecordReader<R> {
    inner: R,
    tracker: BoundaryTracker,
    current: Vec<u8>,
    in_record: bool,
    line: Vec<u8>,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            tracker: BoundaryTracker::new(),
            current: Vec::new(),
            in_record: false,
            line: Vec::new(),
        }
    }

    pub fn next_record(&mut self) -> io::Result<Option<Vec<u8>>> {
        loop {
            self.line.clear();
            if self.inner.read_until(b'\n', &mut self.line)? == 0 {
                if !self.in_record {
                    return Ok(None);
                }
                self.in_record = false;
                return Ok(Some(mem::take(&mut self.current)));
            }

            let starts = self.tracker.feed(&self.line);
            if starts && self.in_record {
                let record = mem::replace(&mut self.current, self.line.clone());
                return Ok(Some(record));
            }
            if starts {
                self.in_record = true;
            }
            if self.in_record {
                self.current.extend_from_slice(&self.line);
            }
        }
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Opens the byte range `[start, end)` of `path` for record reading.
pub fn open_chunk(
    path: &Path,
    start: u64,
    end: u64,
) -> io::Result<RecordReader<BufReader<Take<File>>>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(start))?;
    let range = file.take(end.saturating_sub(start));
    Ok(RecordReader::new(BufReader::new(range)))
}
