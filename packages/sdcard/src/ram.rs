use alloc::{vec, vec::Vec};

use crate::{
    card::CardInfo,
    device::{BlockDevice, SdDeviceError, SD_SECTOR_SIZE},
};

/// In-memory card for hosts and tests.
///
/// Behaves like a socketed card: it can be ejected, write protected, and it
/// refuses transfers until `init` has run.
pub struct RamCard {
    data: Vec<u8>,
    info: CardInfo,
    inserted: bool,
    write_protected: bool,
    initialized: bool,
    init_count: u32,
}

impl RamCard {
    pub fn new(sector_count: u32) -> Self {
        Self::from_image(vec![0u8; sector_count as usize * SD_SECTOR_SIZE])
    }

    /// Wraps a raw image; a trailing partial sector is zero padded.
    pub fn from_image(mut image: Vec<u8>) -> Self {
        let rem = image.len() % SD_SECTOR_SIZE;
        if rem != 0 {
            image.resize(image.len() + SD_SECTOR_SIZE - rem, 0);
        }
        let sector_count = (image.len() / SD_SECTOR_SIZE) as u32;
        Self {
            data: image,
            info: CardInfo::for_sectors(sector_count),
            inserted: true,
            write_protected: false,
            initialized: false,
            init_count: 0,
        }
    }

    /// Overrides the reported metadata; the sector count stays the image's.
    pub fn with_info(mut self, info: CardInfo) -> Self {
        self.info = CardInfo {
            sector_count: self.sector_count(),
            ..info
        };
        self
    }

    pub fn eject(&mut self) {
        self.inserted = false;
        self.initialized = false;
    }

    pub fn insert(&mut self) {
        self.inserted = true;
    }

    pub fn set_write_protected(&mut self, write_protected: bool) {
        self.write_protected = write_protected;
    }

    pub fn init_count(&self) -> u32 {
        self.init_count
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    fn sector_range(&self, lba: u32) -> Result<core::ops::Range<usize>, SdDeviceError> {
        if !self.inserted {
            return Err(SdDeviceError::NoCard);
        }
        if !self.initialized {
            return Err(SdDeviceError::NotInitialized);
        }
        if lba >= self.sector_count() {
            return Err(SdDeviceError::OutOfRange { lba });
        }
        let start = lba as usize * SD_SECTOR_SIZE;
        Ok(start..start + SD_SECTOR_SIZE)
    }
}

impl BlockDevice for RamCard {
    fn init(&mut self) -> Result<(), SdDeviceError> {
        if !self.inserted {
            return Err(SdDeviceError::NoCard);
        }
        self.initialized = true;
        self.init_count = self.init_count.saturating_add(1);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn sector_count(&self) -> u32 {
        (self.data.len() / SD_SECTOR_SIZE) as u32
    }

    fn read_sector(
        &mut self,
        lba: u32,
        out: &mut [u8; SD_SECTOR_SIZE],
    ) -> Result<(), SdDeviceError> {
        let range = self.sector_range(lba)?;
        out.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write_sector(
        &mut self,
        lba: u32,
        data: &[u8; SD_SECTOR_SIZE],
    ) -> Result<(), SdDeviceError> {
        let range = self.sector_range(lba)?;
        if self.write_protected {
            return Err(SdDeviceError::WriteProtected);
        }
        self.data[range].copy_from_slice(data);
        Ok(())
    }

    fn card_info(&self) -> CardInfo {
        self.info
    }

    fn invalidate(&mut self) {
        self.initialized = false;
    }
}
