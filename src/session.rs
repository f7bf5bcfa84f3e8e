use std::{cell::RefCell, io, rc::Rc};

use fatfs::{FileSystem, FormatVolumeOptions, FsOptions};
use sdcard::{BlockDevice, CardInfo};

use crate::{
    config::SdConfig,
    console::{console_line, Console, LogConsole},
    error::{FsError, FsResult},
    paths,
    storage::BlockStorage,
};

pub mod csv;
mod files;
pub mod listing;

#[cfg(test)]
mod tests;

type SdFileSystem<D> = FileSystem<BlockStorage<D>>;
type SdDir<'a, D> = fatfs::Dir<'a, BlockStorage<D>>;

const SD_KB_BYTES: u64 = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpaceInfo {
    pub total_kb: u64,
    pub free_kb: u64,
}

/// Caller-owned handle to one card and at most one mounted volume on it.
pub struct SdSession<D: BlockDevice, C: Console = LogConsole> {
    device: Rc<RefCell<D>>,
    fs: Option<SdFileSystem<D>>,
    card: Option<CardInfo>,
    console: C,
    config: SdConfig,
}

/// Borrowed view of a mounted volume, split from the console so operations
/// can report while holding directory handles.
pub(crate) struct Volume<'a, D: BlockDevice> {
    fs: &'a SdFileSystem<D>,
    config: &'a SdConfig,
}

impl<D: BlockDevice> SdSession<D, LogConsole> {
    pub fn new(device: D) -> Self {
        Self::with_config(device, LogConsole, SdConfig::default())
    }
}

impl<D: BlockDevice, C: Console> SdSession<D, C> {
    pub fn with_console(device: D, console: C) -> Self {
        Self::with_config(device, console, SdConfig::default())
    }

    pub fn with_config(device: D, console: C, config: SdConfig) -> Self {
        Self {
            device: Rc::new(RefCell::new(device)),
            fs: None,
            card: None,
            console,
            config,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.fs.is_some()
    }

    /// Card metadata captured by the last successful mount.
    pub fn card_info(&self) -> Option<CardInfo> {
        self.card
    }

    pub fn config(&self) -> &SdConfig {
        &self.config
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    /// Runs `f` with the block device. Fails with `Locked` if the device is
    /// already borrowed.
    pub fn with_device<R>(&mut self, f: impl FnOnce(&mut D) -> R) -> FsResult<R> {
        let mut device = self.device.try_borrow_mut().map_err(|_| FsError::Locked)?;
        Ok(f(&mut device))
    }

    pub fn mount(&mut self) -> FsResult<()> {
        console_line!(
            self.console,
            "Attempting mount at {}...",
            self.config.mount_point
        );

        if let Some(previous) = self.fs.take() {
            self.card = None;
            if let Err(err) = previous.unmount() {
                log::warn!(
                    "sdfat: remount_detach_error err={}",
                    FsError::from_io(&err).label()
                );
            }
        }

        let options = FsOptions::new().update_accessed_date(self.config.update_accessed_date);
        let fs = match FileSystem::new(BlockStorage::new(self.device.clone()), options) {
            Ok(fs) => fs,
            Err(err) => {
                let code = FsError::from_mount_io(&err);
                log::warn!(
                    "sdfat: mount_error mp={} err={} io={}",
                    self.config.mount_point,
                    code.label(),
                    err
                );
                console_line!(self.console, "Mount failed with code: {}", code.code());
                self.invalidate_card();
                return Err(code);
            }
        };
        log::debug!(
            "sdfat: mount_ok mp={} fat={:?} label={}",
            self.config.mount_point,
            fs.fat_type(),
            fs.volume_label().trim_end()
        );
        self.fs = Some(fs);
        console_line!(
            self.console,
            "SD card mounted successfully at {}",
            self.config.mount_point
        );

        let _ = self.get_space();

        match self.with_device(|device| device.card_info()) {
            Ok(info) => {
                console_line!(self.console, "Card Type: {}", info.capacity.label());
                console_line!(self.console, "Card Version: {}", info.version.label());
                console_line!(self.console, "Card Class: {}", info.class);
                self.card = Some(info);
            }
            Err(code) => log::warn!("sdfat: card_info_error err={}", code.label()),
        }
        Ok(())
    }

    pub fn unmount(&mut self) -> FsResult<()> {
        self.card = None;
        let result = match self.fs.take() {
            Some(fs) => fs.unmount().map_err(|err| FsError::from_io(&err)),
            None => Err(FsError::NotEnabled),
        };
        self.invalidate_card();
        match result {
            Ok(()) => log::debug!("sdfat: unmount_ok mp={}", self.config.mount_point),
            Err(code) => log::warn!(
                "sdfat: unmount_error mp={} err={}",
                self.config.mount_point,
                code.label()
            ),
        }
        console_line!(self.console, "SD card unmounted: {}", ok_label(&result));
        result
    }

    pub fn get_space(&mut self) -> FsResult<SpaceInfo> {
        let result = self.volume().and_then(|volume| volume.space());
        match result {
            Ok(space) => console_line!(
                self.console,
                "💾 Total: {} KB, Free: {} KB",
                space.total_kb,
                space.free_kb
            ),
            Err(code) => log::warn!("sdfat: space_error err={}", code.label()),
        }
        result
    }

    /// Quick-formats the card with a fresh FAT volume.
    pub fn format(&mut self) -> FsResult<()> {
        let result = if self.fs.is_some() {
            Err(FsError::Denied)
        } else {
            let options = FormatVolumeOptions::new().volume_label(self.config.volume_label_bytes());
            let mut storage = BlockStorage::new(self.device.clone());
            fatfs::format_volume(&mut storage, options).map_err(|err| FsError::from_io(&err))
        };
        match result {
            Ok(()) => log::debug!(
                "sdfat: format_ok label={}",
                self.config.volume_label
            ),
            Err(code) => log::warn!("sdfat: format_error err={}", code.label()),
        }
        console_line!(self.console, "Format card: {}", ok_label(&result));
        result
    }

    /// Unmounts if needed and hands the device back.
    pub fn into_device(mut self) -> FsResult<D> {
        if let Some(fs) = self.fs.take() {
            if let Err(err) = fs.unmount() {
                log::warn!(
                    "sdfat: unmount_error mp={} err={}",
                    self.config.mount_point,
                    FsError::from_io(&err).label()
                );
            }
        }
        Rc::try_unwrap(self.device)
            .map(RefCell::into_inner)
            .map_err(|_| FsError::Locked)
    }

    /// The card may be swapped while nothing is mounted; the next access
    /// initializes it again.
    fn invalidate_card(&mut self) {
        if let Ok(mut device) = self.device.try_borrow_mut() {
            device.invalidate();
        }
    }

    pub(crate) fn volume(&self) -> FsResult<Volume<'_, D>> {
        match self.fs.as_ref() {
            Some(fs) => Ok(Volume {
                fs,
                config: &self.config,
            }),
            None => Err(FsError::NotEnabled),
        }
    }
}

impl<'a, D: BlockDevice> Volume<'a, D> {
    pub(crate) fn root(&self) -> SdDir<'a, D> {
        self.fs.root_dir()
    }

    pub(crate) fn open_dir(&self, rel: &str) -> io::Result<SdDir<'a, D>> {
        let root = self.root();
        if rel.is_empty() {
            Ok(root)
        } else {
            root.open_dir(rel)
        }
    }

    pub(crate) fn resolve<'p>(&self, path: &'p str) -> FsResult<&'p str> {
        paths::resolve(self.config, path)
    }

    pub(crate) fn resolve_entry<'p>(&self, path: &'p str) -> FsResult<&'p str> {
        paths::resolve_entry(self.config, path)
    }

    /// Maps a library error for an operation on `rel`. A missing parent
    /// directory is `NoPath` rather than `NoFile`.
    pub(crate) fn path_error(&self, rel: &str, err: &io::Error) -> FsError {
        let code = FsError::from_io(err);
        if code != FsError::NoFile {
            return code;
        }
        let (parent, _) = paths::split_parent(rel);
        if parent.is_empty() || self.open_dir(parent).is_ok() {
            FsError::NoFile
        } else {
            FsError::NoPath
        }
    }

    fn space(&self) -> FsResult<SpaceInfo> {
        let stats = self.fs.stats().map_err(|err| FsError::from_io(&err))?;
        let cluster_bytes = stats.cluster_size() as u64;
        Ok(SpaceInfo {
            total_kb: stats.total_clusters() as u64 * cluster_bytes / SD_KB_BYTES,
            free_kb: stats.free_clusters() as u64 * cluster_bytes / SD_KB_BYTES,
        })
    }
}

pub(crate) fn ok_label<T>(result: &FsResult<T>) -> &'static str {
    if result.is_ok() {
        "OK"
    } else {
        "Failed"
    }
}
