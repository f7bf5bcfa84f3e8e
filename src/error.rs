use core::fmt;
use std::io;

use sdcard::SdDeviceError;

pub type FsResult<T> = Result<T, FsError>;

/// Result codes of the façade; `Ok(..)` stands for code 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FsError {
    DiskErr,
    IntErr,
    NotReady,
    NoFile,
    NoPath,
    InvalidName,
    Denied,
    Exist,
    InvalidObject,
    WriteProtected,
    InvalidDrive,
    NotEnabled,
    NoFilesystem,
    Timeout,
    Locked,
    TooManyOpenFiles,
    InvalidParameter,
}

impl FsError {
    pub fn code(self) -> u8 {
        match self {
            FsError::DiskErr => 1,
            FsError::IntErr => 2,
            FsError::NotReady => 3,
            FsError::NoFile => 4,
            FsError::NoPath => 5,
            FsError::InvalidName => 6,
            FsError::Denied => 7,
            FsError::Exist => 8,
            FsError::InvalidObject => 9,
            FsError::WriteProtected => 10,
            FsError::InvalidDrive => 11,
            FsError::NotEnabled => 12,
            FsError::NoFilesystem => 13,
            FsError::Timeout => 15,
            FsError::Locked => 16,
            FsError::TooManyOpenFiles => 18,
            FsError::InvalidParameter => 19,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FsError::DiskErr => "disk_err",
            FsError::IntErr => "int_err",
            FsError::NotReady => "not_ready",
            FsError::NoFile => "no_file",
            FsError::NoPath => "no_path",
            FsError::InvalidName => "invalid_name",
            FsError::Denied => "denied",
            FsError::Exist => "exist",
            FsError::InvalidObject => "invalid_object",
            FsError::WriteProtected => "write_protected",
            FsError::InvalidDrive => "invalid_drive",
            FsError::NotEnabled => "not_enabled",
            FsError::NoFilesystem => "no_filesystem",
            FsError::Timeout => "timeout",
            FsError::Locked => "locked",
            FsError::TooManyOpenFiles => "too_many_open_files",
            FsError::InvalidParameter => "invalid_parameter",
        }
    }

    /// Maps an error surfaced by the FAT library.
    pub fn from_io(err: &io::Error) -> Self {
        if let Some(device) = device_error(err) {
            return Self::from_device(device);
        }
        match err.kind() {
            io::ErrorKind::NotFound => FsError::NoFile,
            io::ErrorKind::AlreadyExists => FsError::Exist,
            io::ErrorKind::PermissionDenied => FsError::Denied,
            io::ErrorKind::InvalidInput => FsError::InvalidParameter,
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => FsError::IntErr,
            io::ErrorKind::WriteZero => FsError::DiskErr,
            _ => FsError::Denied,
        }
    }

    /// Maps a failed data write. A volume out of free clusters surfaces as a
    /// generic library error and counts as a short write.
    pub fn from_write_io(err: &io::Error) -> Self {
        match Self::from_io(err) {
            FsError::Denied if err.kind() == io::ErrorKind::Other => FsError::DiskErr,
            code => code,
        }
    }

    /// Mount failures that did not come from the card mean there is no usable
    /// FAT volume on it.
    pub fn from_mount_io(err: &io::Error) -> Self {
        match device_error(err) {
            Some(device) => Self::from_device(device),
            None => FsError::NoFilesystem,
        }
    }

    pub fn from_device(err: SdDeviceError) -> Self {
        match err {
            SdDeviceError::NoCard | SdDeviceError::InitFailed | SdDeviceError::NotInitialized => {
                FsError::NotReady
            }
            SdDeviceError::Timeout => FsError::Timeout,
            SdDeviceError::WriteProtected => FsError::WriteProtected,
            SdDeviceError::Busy => FsError::Locked,
            SdDeviceError::Crc | SdDeviceError::Transfer | SdDeviceError::OutOfRange { .. } => {
                FsError::DiskErr
            }
        }
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.code())
    }
}

impl std::error::Error for FsError {}

impl From<SdDeviceError> for FsError {
    fn from(err: SdDeviceError) -> Self {
        Self::from_device(err)
    }
}

fn device_error(err: &io::Error) -> Option<SdDeviceError> {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<SdDeviceError>())
        .copied()
}
