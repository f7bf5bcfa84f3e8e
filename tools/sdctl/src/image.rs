use std::{
    fs::{self, File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::Path,
};

use anyhow::{bail, Context, Result};
use sdcard::{BlockDevice, CardInfo, SdDeviceError, SD_SECTOR_SIZE};

use crate::config::CardConfig;

const MIB: u64 = 1024 * 1024;

/// Card backed by a raw image file, one 512-byte sector per file block.
pub struct ImageCard {
    file: File,
    info: CardInfo,
    initialized: bool,
}

impl ImageCard {
    /// Creates (or replaces) a zero-filled image of `size_mib` MiB.
    pub fn create(path: &Path, size_mib: u64, card: &CardConfig) -> Result<Self> {
        if size_mib == 0 {
            bail!("image size must be at least 1 MiB");
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("failed to create image {}", path.display()))?;
        file.set_len(size_mib * MIB)
            .with_context(|| format!("failed to size image {}", path.display()))?;
        Self::from_file(file, path, card)
    }

    pub fn open(path: &Path, card: &CardConfig) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("failed to open image {}", path.display()))?;
        Self::from_file(file, path, card)
    }

    fn from_file(file: File, path: &Path, card: &CardConfig) -> Result<Self> {
        let len = file
            .metadata()
            .with_context(|| format!("failed to stat image {}", path.display()))?
            .len();
        let sectors = u32::try_from(len / SD_SECTOR_SIZE as u64)
            .with_context(|| format!("image {} is too large", path.display()))?;
        Ok(Self {
            file,
            info: card.card_info(sectors)?,
            initialized: false,
        })
    }

    pub fn sync(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }

    fn seek_sector(&mut self, lba: u32) -> Result<(), SdDeviceError> {
        if !self.initialized {
            return Err(SdDeviceError::NotInitialized);
        }
        if lba >= self.info.sector_count {
            return Err(SdDeviceError::OutOfRange { lba });
        }
        self.file
            .seek(SeekFrom::Start(lba as u64 * SD_SECTOR_SIZE as u64))
            .map_err(|err| transfer_error("seek", lba, &err))?;
        Ok(())
    }
}

fn transfer_error(op: &str, lba: u32, err: &io::Error) -> SdDeviceError {
    log::warn!("sdctl: image_{}_error lba={} io={}", op, lba, err);
    SdDeviceError::Transfer
}

impl BlockDevice for ImageCard {
    fn init(&mut self) -> Result<(), SdDeviceError> {
        if self.info.sector_count == 0 {
            return Err(SdDeviceError::InitFailed);
        }
        self.initialized = true;
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn sector_count(&self) -> u32 {
        self.info.sector_count
    }

    fn read_sector(
        &mut self,
        lba: u32,
        out: &mut [u8; SD_SECTOR_SIZE],
    ) -> Result<(), SdDeviceError> {
        self.seek_sector(lba)?;
        self.file
            .read_exact(out)
            .map_err(|err| transfer_error("read", lba, &err))
    }

    fn write_sector(
        &mut self,
        lba: u32,
        data: &[u8; SD_SECTOR_SIZE],
    ) -> Result<(), SdDeviceError> {
        self.seek_sector(lba)?;
        self.file
            .write_all(data)
            .map_err(|err| transfer_error("write", lba, &err))
    }

    fn card_info(&self) -> CardInfo {
        self.info
    }

    fn invalidate(&mut self) {
        self.initialized = false;
    }
}
