use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use sdcard::{CardCapacity, CardInfo, SdCardVersion};
use sdfiles::SdConfig;
use serde::Deserialize;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub volume: SdConfig,
    pub card: CardConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapacityKind {
    Sdsc,
    Sdhc,
}

/// Metadata the image-backed card reports. Unset fields follow the image
/// size.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CardConfig {
    pub capacity: Option<CapacityKind>,
    pub version: Option<u8>,
    pub class: Option<u32>,
}

impl CardConfig {
    pub fn card_info(&self, sector_count: u32) -> Result<CardInfo> {
        let mut info = CardInfo::for_sectors(sector_count);
        if let Some(capacity) = self.capacity {
            info.capacity = match capacity {
                CapacityKind::Sdsc => CardCapacity::Standard,
                CapacityKind::Sdhc => CardCapacity::High,
            };
        }
        if let Some(version) = self.version {
            info.version = match version {
                1 => SdCardVersion::V1,
                2 => SdCardVersion::V2,
                other => bail!("card.version must be 1 or 2, got {other}"),
            };
        }
        if let Some(class) = self.class {
            info.class = class;
        }
        Ok(info)
    }
}

pub fn load(path: Option<&Path>) -> Result<ToolConfig> {
    let Some(path) = path else {
        return Ok(ToolConfig::default());
    };
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn parse(raw: &str) -> Result<ToolConfig> {
    Ok(toml::from_str(raw)?)
}
