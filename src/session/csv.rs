use std::io::{self, Read};

use heapless::{String, Vec};
use sdcard::BlockDevice;

use super::{SdSession, Volume};
use crate::{
    console::{console_line, Console},
    error::{FsError, FsResult},
    paths::copy_truncated,
    CSV_FIELD_MAX, SD_LINE_MAX,
};

const CSV_MAX_TOKENS: usize = 3;
const CSV_READ_CHUNK: usize = 512;

/// One `field1,field2,value` line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CsvRecord {
    pub field1: String<CSV_FIELD_MAX>,
    pub field2: String<CSV_FIELD_MAX>,
    pub value: i32,
}

impl CsvRecord {
    /// Fills the record from a raw line, without its terminator. Returns
    /// false when the line holds no tokens.
    pub fn parse_line(&mut self, line: &[u8]) -> bool {
        let tokens: Vec<&[u8], CSV_MAX_TOKENS> = line
            .split(|b| *b == b',')
            .filter(|token| !token.is_empty())
            .take(CSV_MAX_TOKENS)
            .collect();
        if tokens.is_empty() {
            return false;
        }

        *self = CsvRecord::default();
        self.field1 = copy_truncated(&std::string::String::from_utf8_lossy(tokens[0]));
        if let Some(token) = tokens.get(1) {
            self.field2 = copy_truncated(&std::string::String::from_utf8_lossy(token));
        }
        if let Some(token) = tokens.get(2) {
            self.value = parse_leading_int(token);
        }
        true
    }
}

/// Leading-integer parse: optional whitespace and sign, then digits. Stops at
/// the first other byte and saturates at the `i32` range.
pub fn parse_leading_int(token: &[u8]) -> i32 {
    let mut bytes = token
        .iter()
        .copied()
        .skip_while(|b| b.is_ascii_whitespace() || *b == 0x0b)
        .peekable();
    let negative = match bytes.peek() {
        Some(b'-') => {
            bytes.next();
            true
        }
        Some(b'+') => {
            bytes.next();
            false
        }
        _ => false,
    };

    let mut value: i64 = 0;
    for b in bytes.take_while(u8::is_ascii_digit) {
        value = value * 10 + i64::from(b - b'0');
        if value > i64::from(i32::MAX) + 1 {
            break;
        }
    }
    let value = if negative { -value } else { value };
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Line reader over a byte stream. A line ends after `\n` or once
/// `SD_LINE_MAX - 1` bytes are collected; the remainder is the next line.
/// A read error ends the stream.
pub(crate) struct LineReader<R> {
    inner: R,
    chunk: [u8; CSV_READ_CHUNK],
    pos: usize,
    len: usize,
    done: bool,
}

impl<R: Read> LineReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            chunk: [0; CSV_READ_CHUNK],
            pos: 0,
            len: 0,
            done: false,
        }
    }

    pub(crate) fn into_inner(self) -> R {
        self.inner
    }

    /// Reads the next line into `line`, terminator included. Returns false at
    /// the end of the stream.
    pub(crate) fn next_line(&mut self, line: &mut Vec<u8, SD_LINE_MAX>) -> bool {
        line.clear();
        while line.len() < SD_LINE_MAX - 1 {
            if self.pos == self.len && !self.refill() {
                break;
            }
            let byte = self.chunk[self.pos];
            self.pos += 1;
            // Capacity is SD_LINE_MAX, the loop stops one short of it.
            let _ = line.push(byte);
            if byte == b'\n' {
                break;
            }
        }
        !line.is_empty()
    }

    fn refill(&mut self) -> bool {
        if self.done {
            return false;
        }
        loop {
            match self.inner.read(&mut self.chunk) {
                Ok(0) => {
                    self.done = true;
                    return false;
                }
                Ok(n) => {
                    self.pos = 0;
                    self.len = n;
                    return true;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    log::warn!("sdfat: csv_read_error io={}", err);
                    self.done = true;
                    return false;
                }
            }
        }
    }
}

fn strip_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

impl<D: BlockDevice, C: Console> SdSession<D, C> {
    /// Parses `filename` into `records`, one record per non-empty line, and
    /// returns how many were filled.
    pub fn read_csv(&mut self, filename: &str, records: &mut [CsvRecord]) -> FsResult<usize> {
        let SdSession {
            fs,
            console,
            config,
            ..
        } = self;
        let opened = match fs.as_ref() {
            Some(fs) => {
                let volume = Volume { fs, config };
                volume.resolve_entry(filename).and_then(|rel| {
                    volume
                        .root()
                        .open_file(rel)
                        .map_err(|err| volume.path_error(rel, &err))
                })
            }
            None => Err(FsError::NotEnabled),
        };
        let file = match opened {
            Ok(file) => file,
            Err(code) => {
                log::warn!("sdfat: csv_open_error path={} err={}", filename, code.label());
                console_line!(*console, "Failed to open CSV: {} ({})", filename, code.code());
                return Err(code);
            }
        };
        console_line!(*console, "📄 Reading CSV: {}", filename);

        let mut reader = LineReader::new(file);
        let mut line: Vec<u8, SD_LINE_MAX> = Vec::new();
        let mut count = 0usize;
        while count < records.len() && reader.next_line(&mut line) {
            if records[count].parse_line(strip_line_end(&line)) {
                count += 1;
            }
        }

        let mut file = reader.into_inner();
        if let Err(err) = io::Write::flush(&mut file) {
            log::warn!("sdfat: csv_close_error path={} io={}", filename, err);
        }
        drop(file);

        for (idx, record) in records.iter().take(count).enumerate() {
            console_line!(
                *console,
                "[{}] {} | {} | {}",
                idx,
                record.field1,
                record.field2,
                record.value
            );
        }
        log::debug!("sdfat: csv_ok path={} records={}", filename, count);
        Ok(count)
    }
}
