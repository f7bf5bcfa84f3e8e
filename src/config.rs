use serde::Deserialize;

pub const SD_DEFAULT_MOUNT_POINT: &str = "0:/";
pub const SD_DEFAULT_VOLUME_LABEL: &str = "SDCARD";
pub const SD_VOLUME_LABEL_LEN: usize = 11;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SdConfig {
    /// Logical drive the volume is mounted under, e.g. `0:/`.
    pub mount_point: String,
    pub volume_label: String,
    /// Directories deeper than this are listed but not entered.
    pub list_max_depth: Option<usize>,
    pub update_accessed_date: bool,
}

impl Default for SdConfig {
    fn default() -> Self {
        Self {
            mount_point: SD_DEFAULT_MOUNT_POINT.to_string(),
            volume_label: SD_DEFAULT_VOLUME_LABEL.to_string(),
            list_max_depth: None,
            update_accessed_date: false,
        }
    }
}

impl SdConfig {
    /// Drive prefix of the mount point (`0:` for `0:/`), if it has one.
    pub fn drive_prefix(&self) -> Option<&str> {
        let colon = self.mount_point.find(':')?;
        Some(&self.mount_point[..=colon])
    }

    /// Volume label in the 11-byte, space padded form FAT stores.
    pub fn volume_label_bytes(&self) -> [u8; SD_VOLUME_LABEL_LEN] {
        let mut out = [b' '; SD_VOLUME_LABEL_LEN];
        let label = self
            .volume_label
            .bytes()
            .filter(|b| b.is_ascii_graphic() || *b == b' ')
            .map(|b| b.to_ascii_uppercase());
        for (slot, byte) in out.iter_mut().zip(label) {
            *slot = byte;
        }
        out
    }
}
