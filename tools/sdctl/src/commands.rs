use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use sdcard::CardInfo;
use sdfiles::{Console, CsvRecord, FsError, FsResult, ListedEntry, SdSession, SpaceInfo};

use crate::{config::ToolConfig, image::ImageCard};

/// Image file plus the configuration every command mounts it with.
pub struct ImageTarget {
    pub image: PathBuf,
    pub config: ToolConfig,
}

impl ImageTarget {
    fn session<C: Console>(&self, console: C) -> Result<SdSession<ImageCard, C>> {
        let card = ImageCard::open(&self.image, &self.config.card)?;
        Ok(SdSession::with_config(
            card,
            console,
            self.config.volume.clone(),
        ))
    }

    /// Mounts, runs `op`, and unmounts whatever `op` returned.
    fn with_mounted<C, T>(
        &self,
        console: C,
        name: &str,
        op: impl FnOnce(&mut SdSession<ImageCard, C>) -> FsResult<T>,
    ) -> Result<T>
    where
        C: Console,
    {
        let mut session = self.session(console)?;
        session
            .mount()
            .map_err(|code| fs_error("mount", code))
            .with_context(|| format!("image {}", self.image.display()))?;
        let result = op(&mut session);
        let unmounted = session.unmount();
        let value = result.map_err(|code| fs_error(name, code))?;
        unmounted.map_err(|code| fs_error("unmount", code))?;
        Ok(value)
    }
}

fn fs_error(name: &str, code: FsError) -> anyhow::Error {
    anyhow!("{name} failed: {code}")
}

pub fn format<C: Console>(target: &ImageTarget, console: C, size_mib: u64) -> Result<()> {
    let card = ImageCard::create(&target.image, size_mib, &target.config.card)?;
    let mut session = SdSession::with_config(card, console, target.config.volume.clone());
    session.format().map_err(|code| fs_error("format", code))?;
    let mut card = session
        .into_device()
        .map_err(|code| fs_error("format", code))?;
    card.sync()
        .with_context(|| format!("failed to sync {}", target.image.display()))?;
    log::debug!(
        "sdctl: format_ok image={} size_mib={}",
        target.image.display(),
        size_mib
    );
    Ok(())
}

pub fn info<C: Console>(target: &ImageTarget, console: C) -> Result<CardInfo> {
    target
        .with_mounted(console, "info", |session| Ok(session.card_info()))?
        .context("card metadata unavailable")
}

pub fn df<C: Console>(target: &ImageTarget, console: C) -> Result<SpaceInfo> {
    target.with_mounted(console, "df", |session| session.get_space())
}

pub fn ls<C: Console>(target: &ImageTarget, console: C, path: Option<&str>) -> Result<()> {
    target.with_mounted(console, "ls", |session| match path {
        Some(path) => session.list_directory_recursive(path, 0),
        None => session.list_files(),
    })
}

/// Returns at most `max_bytes` bytes of `path`.
pub fn cat<C: Console>(
    target: &ImageTarget,
    console: C,
    path: &str,
    max_bytes: usize,
) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; max_bytes.saturating_add(1)];
    let read = target.with_mounted(console, "cat", |session| session.read(path, &mut buffer))?;
    buffer.truncate(read);
    Ok(buffer)
}

pub fn write<C: Console>(target: &ImageTarget, console: C, path: &str, text: &str) -> Result<()> {
    target.with_mounted(console, "write", |session| session.write(path, text))
}

pub fn append<C: Console>(target: &ImageTarget, console: C, path: &str, text: &str) -> Result<()> {
    target.with_mounted(console, "append", |session| session.append(path, text))
}

pub fn csv<C: Console>(
    target: &ImageTarget,
    console: C,
    path: &str,
    max_records: usize,
) -> Result<Vec<CsvRecord>> {
    let mut records = vec![CsvRecord::default(); max_records];
    let count = target.with_mounted(console, "csv", |session| {
        session.read_csv(path, &mut records)
    })?;
    records.truncate(count);
    Ok(records)
}

pub fn rm<C: Console>(target: &ImageTarget, console: C, path: &str) -> Result<()> {
    target.with_mounted(console, "rm", |session| session.delete(path))
}

pub fn mv<C: Console>(target: &ImageTarget, console: C, old: &str, new: &str) -> Result<()> {
    target.with_mounted(console, "mv", |session| session.rename(old, new))
}

pub fn mkdir<C: Console>(target: &ImageTarget, console: C, path: &str) -> Result<()> {
    target.with_mounted(console, "mkdir", |session| session.create_directory(path))
}

pub fn stat<C: Console>(target: &ImageTarget, console: C, path: &str) -> Result<ListedEntry> {
    target.with_mounted(console, "stat", |session| session.stat(path))
}
