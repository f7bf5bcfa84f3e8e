use crate::device::SD_SECTOR_SIZE;

/// Command classes reported by most SDHC cards (CCC field of the CSD).
pub const SD_DEFAULT_CARD_CLASS: u32 = 0x5B5;

// SDSC tops out at 2 GiB; anything larger is block addressed.
const SDSC_MAX_BYTES: u64 = 2 * 1024 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SdCardVersion {
    V1,
    V2,
}

impl SdCardVersion {
    pub fn label(self) -> &'static str {
        match self {
            SdCardVersion::V1 => "CARD_V1_X",
            SdCardVersion::V2 => "CARD_V2_X",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CardCapacity {
    /// Byte addressed, up to 2 GiB.
    Standard,
    /// Block addressed SDHC/SDXC.
    High,
}

impl CardCapacity {
    pub fn label(self) -> &'static str {
        match self {
            CardCapacity::Standard => "SDSC",
            CardCapacity::High => "SDHC/SDXC",
        }
    }
}

/// Card metadata as reported by the driver once the card is initialized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CardInfo {
    pub capacity: CardCapacity,
    pub version: SdCardVersion,
    pub class: u32,
    pub sector_count: u32,
}

impl CardInfo {
    /// Metadata a v2 card of the given size would report.
    pub fn for_sectors(sector_count: u32) -> Self {
        let bytes = sector_count as u64 * SD_SECTOR_SIZE as u64;
        let capacity = if bytes > SDSC_MAX_BYTES {
            CardCapacity::High
        } else {
            CardCapacity::Standard
        };
        Self {
            capacity,
            version: SdCardVersion::V2,
            class: SD_DEFAULT_CARD_CLASS,
            sector_count,
        }
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.sector_count as u64 * SD_SECTOR_SIZE as u64
    }
}
