//! SD card file façade.
//!
//! `SdSession` owns a block device and, while mounted, the FAT volume on it.
//! Every operation opens what it needs, reports one or more status lines to
//! the session's `Console` and closes everything before returning.

pub mod config;
pub mod console;
pub mod error;
pub mod paths;
pub mod session;
pub mod storage;

pub use config::SdConfig;
pub use console::{Console, LogConsole, NullConsole};
pub use error::{FsError, FsResult};
pub use sdcard::{
    BlockDevice, CardCapacity, CardInfo, RamCard, SdCardVersion, SdDeviceError, StorageCard,
};
pub use session::{
    csv::CsvRecord,
    listing::{ListedEntry, WalkControl, WalkEvent},
    SdSession, SpaceInfo,
};
pub use storage::BlockStorage;

pub const SD_PATH_MAX: usize = 128;
pub const SD_LINE_MAX: usize = 128;
pub const SD_NAME_MAX: usize = 255;
pub const CSV_FIELD_MAX: usize = 32;
