#![no_std]

extern crate alloc;

pub mod card;
pub mod device;
pub mod ram;
pub mod storage;


pub use card::{CardCapacity, CardInfo, SdCardVersion, SD_DEFAULT_CARD_CLASS};
pub use device::{BlockDevice, SdDeviceError, SD_SECTOR_SIZE};
pub use ram::RamCard;
pub use storage::StorageCard;
