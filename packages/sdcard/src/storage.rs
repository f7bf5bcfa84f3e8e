use core::fmt::Debug;

use embedded_storage::{ReadStorage, Storage};

use crate::{
    card::CardInfo,
    device::{BlockDevice, SdDeviceError, SD_SECTOR_SIZE},
};

/// Exposes any `embedded-storage` backend as a card.
///
/// The backend is addressed in bytes; only whole sectors that fit inside its
/// capacity are visible.
pub struct StorageCard<S> {
    storage: S,
    info: CardInfo,
    initialized: bool,
}

impl<S: Storage> StorageCard<S> {
    pub fn new(storage: S) -> Self {
        let sector_count = (storage.capacity() / SD_SECTOR_SIZE) as u32;
        Self {
            storage,
            info: CardInfo::for_sectors(sector_count),
            initialized: false,
        }
    }

    pub fn with_info(mut self, info: CardInfo) -> Self {
        self.info = CardInfo {
            sector_count: self.info.sector_count,
            ..info
        };
        self
    }

    pub fn into_inner(self) -> S {
        self.storage
    }

    fn sector_offset(&self, lba: u32) -> Result<u32, SdDeviceError> {
        if !self.initialized {
            return Err(SdDeviceError::NotInitialized);
        }
        if lba >= self.info.sector_count {
            return Err(SdDeviceError::OutOfRange { lba });
        }
        lba.checked_mul(SD_SECTOR_SIZE as u32)
            .ok_or(SdDeviceError::OutOfRange { lba })
    }
}

impl<S> BlockDevice for StorageCard<S>
where
    S: Storage,
    S::Error: Debug,
{
    fn init(&mut self) -> Result<(), SdDeviceError> {
        if self.info.sector_count == 0 {
            log::warn!("sdcard: storage_init_error reason=empty_backend");
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
        let offset = self.sector_offset(lba)?;
        ReadStorage::read(&mut self.storage, offset, out).map_err(|err| {
            log::warn!("sdcard: storage_read_error lba={} err={:?}", lba, err);
            SdDeviceError::Transfer
        })
    }

    fn write_sector(
        &mut self,
        lba: u32,
        data: &[u8; SD_SECTOR_SIZE],
    ) -> Result<(), SdDeviceError> {
        let offset = self.sector_offset(lba)?;
        Storage::write(&mut self.storage, offset, data).map_err(|err| {
            log::warn!("sdcard: storage_write_error lba={} err={:?}", lba, err);
            SdDeviceError::Transfer
        })
    }

    fn card_info(&self) -> CardInfo {
        self.info
    }

    fn invalidate(&mut self) {
        self.initialized = false;
    }
}
