use core::fmt;

use crate::card::CardInfo;

pub const SD_SECTOR_SIZE: usize = 512;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SdDeviceError {
    NoCard,
    InitFailed,
    NotInitialized,
    Timeout,
    Crc,
    Transfer,
    OutOfRange { lba: u32 },
    WriteProtected,
    Busy,
}

impl SdDeviceError {
    pub fn label(self) -> &'static str {
        match self {
            SdDeviceError::NoCard => "no_card",
            SdDeviceError::InitFailed => "init_failed",
            SdDeviceError::NotInitialized => "not_initialized",
            SdDeviceError::Timeout => "timeout",
            SdDeviceError::Crc => "crc",
            SdDeviceError::Transfer => "transfer",
            SdDeviceError::OutOfRange { .. } => "out_of_range",
            SdDeviceError::WriteProtected => "write_protected",
            SdDeviceError::Busy => "busy",
        }
    }
}

impl fmt::Display for SdDeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdDeviceError::OutOfRange { lba } => write!(f, "sd device out_of_range lba={}", lba),
            other => write!(f, "sd device {}", other.label()),
        }
    }
}

impl core::error::Error for SdDeviceError {}

/// Sector-level access to a card.
///
/// Implementations initialize lazily: callers check `is_initialized` and call
/// `init` before the first transfer. `card_info` is only meaningful once the
/// card has been initialized.
pub trait BlockDevice {
    fn init(&mut self) -> Result<(), SdDeviceError>;

    fn is_initialized(&self) -> bool;

    fn sector_count(&self) -> u32;

    fn read_sector(
        &mut self,
        lba: u32,
        out: &mut [u8; SD_SECTOR_SIZE],
    ) -> Result<(), SdDeviceError>;

    fn write_sector(&mut self, lba: u32, data: &[u8; SD_SECTOR_SIZE])
        -> Result<(), SdDeviceError>;

    fn card_info(&self) -> CardInfo;

    /// Waits until every accepted write has reached the medium.
    fn flush(&mut self) -> Result<(), SdDeviceError> {
        Ok(())
    }

    /// Forget initialization state so the next access re-runs `init`.
    fn invalidate(&mut self) {}
}

impl<T: BlockDevice + ?Sized> BlockDevice for &mut T {
    fn init(&mut self) -> Result<(), SdDeviceError> {
        (**self).init()
    }

    fn is_initialized(&self) -> bool {
        (**self).is_initialized()
    }

    fn sector_count(&self) -> u32 {
        (**self).sector_count()
    }

    fn read_sector(
        &mut self,
        lba: u32,
        out: &mut [u8; SD_SECTOR_SIZE],
    ) -> Result<(), SdDeviceError> {
        (**self).read_sector(lba, out)
    }

    fn write_sector(
        &mut self,
        lba: u32,
        data: &[u8; SD_SECTOR_SIZE],
    ) -> Result<(), SdDeviceError> {
        (**self).write_sector(lba, data)
    }

    fn card_info(&self) -> CardInfo {
        (**self).card_info()
    }

    fn flush(&mut self) -> Result<(), SdDeviceError> {
        (**self).flush()
    }

    fn invalidate(&mut self) {
        (**self).invalidate()
    }
}
