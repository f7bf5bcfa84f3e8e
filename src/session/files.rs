use std::io::{self, Read, Seek, SeekFrom, Write};

use sdcard::BlockDevice;

use super::{listing::ListedEntry, ok_label, SdSession, Volume};
use crate::{
    console::{console_line, Console},
    error::{FsError, FsResult},
    paths,
};

type SdFile<'a, D> = fatfs::File<'a, crate::storage::BlockStorage<D>>;

/// Outcome of a write step: bytes the library accepted and the first error.
struct WriteOutcome {
    written: usize,
    error: Option<io::Error>,
}

fn write_payload<W: Write>(file: &mut W, data: &[u8]) -> WriteOutcome {
    let mut written = 0usize;
    while written < data.len() {
        match file.write(&data[written..]) {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => {
                return WriteOutcome {
                    written,
                    error: Some(err),
                }
            }
        }
    }
    WriteOutcome {
        written,
        error: None,
    }
}

/// Closes `file`, writing back its directory entry.
fn close_file<D: BlockDevice>(mut file: SdFile<'_, D>) -> io::Result<()> {
    file.flush()
}

/// Final code of a write or append: the write step's error, then a short
/// write, then the close.
fn settle_write(
    volume: &Volume<'_, impl BlockDevice>,
    rel: &str,
    requested: usize,
    outcome: &WriteOutcome,
    closed: io::Result<()>,
) -> FsResult<()> {
    if let Some(err) = &outcome.error {
        return Err(FsError::from_write_io(err));
    }
    if outcome.written != requested {
        return Err(FsError::DiskErr);
    }
    closed.map_err(|err| volume.path_error(rel, &err))
}

impl<D: BlockDevice, C: Console> SdSession<D, C> {
    /// Creates or truncates `filename` and writes `text` to it.
    pub fn write(&mut self, filename: &str, text: &str) -> FsResult<()> {
        let volume = match self.volume() {
            Ok(volume) => volume,
            Err(code) => {
                log::warn!("sdfat: write_error path={} err={}", filename, code.label());
                return Err(code);
            }
        };
        let (rel, mut file) = match volume.resolve_entry(filename).and_then(|rel| {
            let mut file = volume
                .root()
                .create_file(rel)
                .map_err(|err| volume.path_error(rel, &err))?;
            file.truncate().map_err(|err| volume.path_error(rel, &err))?;
            Ok((rel, file))
        }) {
            Ok(opened) => opened,
            Err(code) => {
                log::warn!("sdfat: write_open_error path={} err={}", filename, code.label());
                return Err(code);
            }
        };

        let outcome = write_payload(&mut file, text.as_bytes());
        let closed = close_file(file);
        let result = settle_write(&volume, rel, text.len(), &outcome, closed);
        match result {
            Ok(()) => log::debug!("sdfat: write_ok path={} bytes={}", filename, outcome.written),
            Err(code) => log::warn!(
                "sdfat: write_error path={} bytes={} err={}",
                filename,
                outcome.written,
                code.label()
            ),
        }
        console_line!(self.console, "Write {} bytes to {}", outcome.written, filename);
        result
    }

    /// Opens or creates `filename` and writes `text` at its end.
    pub fn append(&mut self, filename: &str, text: &str) -> FsResult<()> {
        let volume = match self.volume() {
            Ok(volume) => volume,
            Err(code) => {
                log::warn!("sdfat: append_error path={} err={}", filename, code.label());
                return Err(code);
            }
        };
        let (rel, mut file) = match volume.resolve_entry(filename).and_then(|rel| {
            volume
                .root()
                .create_file(rel)
                .map(|file| (rel, file))
                .map_err(|err| volume.path_error(rel, &err))
        }) {
            Ok(opened) => opened,
            Err(code) => {
                log::warn!("sdfat: append_open_error path={} err={}", filename, code.label());
                return Err(code);
            }
        };

        if let Err(err) = file.seek(SeekFrom::End(0)) {
            let code = volume.path_error(rel, &err);
            if let Err(close_err) = close_file(file) {
                log::warn!("sdfat: append_close_error path={} io={}", filename, close_err);
            }
            log::warn!("sdfat: append_seek_error path={} err={}", filename, code.label());
            return Err(code);
        }

        let outcome = write_payload(&mut file, text.as_bytes());
        let closed = close_file(file);
        let result = settle_write(&volume, rel, text.len(), &outcome, closed);
        match result {
            Ok(()) => log::debug!("sdfat: append_ok path={} bytes={}", filename, outcome.written),
            Err(code) => log::warn!(
                "sdfat: append_error path={} bytes={} err={}",
                filename,
                outcome.written,
                code.label()
            ),
        }
        console_line!(self.console, "Appended {} bytes to {}", outcome.written, filename);
        result
    }

    /// Reads up to `buffer.len() - 1` bytes of `filename` and terminates them
    /// with a `0`. Returns the number of bytes read.
    pub fn read(&mut self, filename: &str, buffer: &mut [u8]) -> FsResult<usize> {
        if buffer.is_empty() {
            log::warn!("sdfat: read_error path={} err=empty_buffer", filename);
            return Err(FsError::InvalidParameter);
        }
        let SdSession {
            fs,
            console,
            config,
            ..
        } = self;
        let volume = match fs.as_ref() {
            Some(fs) => Volume { fs, config },
            None => {
                console_line!(*console, "f_open failed with code: {}", FsError::NotEnabled.code());
                return Err(FsError::NotEnabled);
            }
        };

        let opened = volume.resolve_entry(filename).and_then(|rel| {
            volume
                .root()
                .open_file(rel)
                .map(|file| (rel, file))
                .map_err(|err| volume.path_error(rel, &err))
        });
        let (rel, mut file) = match opened {
            Ok(opened) => opened,
            Err(code) => {
                log::warn!("sdfat: read_open_error path={} err={}", filename, code.label());
                console_line!(*console, "f_open failed with code: {}", code.code());
                return Err(code);
            }
        };

        let limit = buffer.len() - 1;
        let mut read = 0usize;
        while read < limit {
            match file.read(&mut buffer[read..limit]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    let code = volume.path_error(rel, &err);
                    log::warn!(
                        "sdfat: read_error path={} bytes={} err={}",
                        filename,
                        read,
                        code.label()
                    );
                    console_line!(*console, "f_read failed with code: {}", code.code());
                    if let Err(close_err) = close_file(file) {
                        log::warn!("sdfat: read_close_error path={} io={}", filename, close_err);
                    }
                    return Err(code);
                }
            }
        }
        buffer[read] = 0;

        if let Err(err) = close_file(file) {
            let code = volume.path_error(rel, &err);
            log::warn!("sdfat: read_close_error path={} err={}", filename, code.label());
            console_line!(*console, "f_close failed with code: {}", code.code());
            return Err(code);
        }

        log::debug!("sdfat: read_ok path={} bytes={}", filename, read);
        console_line!(*console, "Read {} bytes from {}", read, filename);
        Ok(read)
    }

    /// Removes a file or an empty directory.
    pub fn delete(&mut self, filename: &str) -> FsResult<()> {
        let result = self.volume().and_then(|volume| {
            let rel = volume.resolve_entry(filename)?;
            volume
                .root()
                .remove(rel)
                .map_err(|err| volume.path_error(rel, &err))
        });
        match result {
            Ok(()) => log::debug!("sdfat: rm_ok path={}", filename),
            Err(code) => log::warn!("sdfat: rm_error path={} err={}", filename, code.label()),
        }
        console_line!(self.console, "Delete {}: {}", filename, ok_label(&result));
        result
    }

    /// Renames or moves `old_name` to `new_name`.
    pub fn rename(&mut self, old_name: &str, new_name: &str) -> FsResult<()> {
        let result = self.volume().and_then(|volume| {
            let src = volume.resolve_entry(old_name)?;
            let dst = volume.resolve_entry(new_name)?;
            let root = volume.root();
            root.rename(src, &root, dst)
                .map_err(|err| match FsError::from_io(&err) {
                    // Either end may be missing; a present source means the
                    // destination directory is.
                    FsError::NoFile => match volume.lookup(src) {
                        Ok(_) => FsError::NoPath,
                        Err(code) => code,
                    },
                    code => code,
                })
        });
        match result {
            Ok(()) => log::debug!("sdfat: ren_ok src={} dst={}", old_name, new_name),
            Err(code) => log::warn!(
                "sdfat: ren_error src={} dst={} err={}",
                old_name,
                new_name,
                code.label()
            ),
        }
        console_line!(
            self.console,
            "Rename {} to {}: {}",
            old_name,
            new_name,
            ok_label(&result)
        );
        result
    }

    /// Creates one directory level. The parent must exist.
    pub fn create_directory(&mut self, path: &str) -> FsResult<()> {
        let result = self.volume().and_then(|volume| {
            let rel = volume.resolve_entry(path)?;
            match volume.lookup(rel) {
                Ok(_) => return Err(FsError::Exist),
                Err(FsError::NoFile) => {}
                Err(code) => return Err(code),
            }
            volume
                .root()
                .create_dir(rel)
                .map(|_| ())
                .map_err(|err| FsError::from_io(&err))
        });
        match result {
            Ok(()) => log::debug!("sdfat: mkdir_ok path={}", path),
            Err(code) => log::warn!("sdfat: mkdir_error path={} err={}", path, code.label()),
        }
        console_line!(self.console, "Create directory {}: {}", path, ok_label(&result));
        result
    }

    /// Looks up a single entry. The root reports as a directory.
    pub fn stat(&mut self, path: &str) -> FsResult<ListedEntry> {
        let result = self.volume().and_then(|volume| {
            let rel = volume.resolve(path)?;
            if rel.is_empty() {
                return Ok(ListedEntry::directory(&volume.config.mount_point, 0));
            }
            volume.lookup(rel)
        });
        match &result {
            Ok(entry) if entry.is_dir => {
                log::debug!("sdfat: stat_ok path={} dir=1", path);
                console_line!(self.console, "Stat {}: dir", path);
            }
            Ok(entry) => {
                log::debug!("sdfat: stat_ok path={} size={}", path, entry.size);
                console_line!(self.console, "Stat {}: {} bytes", path, entry.size);
            }
            Err(code) => {
                log::warn!("sdfat: stat_error path={} err={}", path, code.label());
                console_line!(self.console, "Stat {}: Failed", path);
            }
        }
        result
    }
}

impl<D: BlockDevice> Volume<'_, D> {
    /// Finds `rel` in its parent directory, matching names the way FAT does
    /// (case-insensitive, long or short name).
    pub(crate) fn lookup(&self, rel: &str) -> FsResult<ListedEntry> {
        let (parent, name) = paths::split_parent(rel);
        let dir = self
            .open_dir(parent)
            .map_err(|err| match FsError::from_io(&err) {
                FsError::NoFile => FsError::NoPath,
                code => code,
            })?;
        for entry in dir.iter() {
            let entry = entry.map_err(|err| FsError::from_io(&err))?;
            let long = entry.file_name();
            if names_match(&long, name) || names_match(&entry.short_file_name(), name) {
                return Ok(ListedEntry::from_fat(&long, entry.len(), entry.is_dir(), 0));
            }
        }
        Err(FsError::NoFile)
    }
}

fn names_match(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_uppercase)
        .eq(b.chars().flat_map(char::to_uppercase))
}
