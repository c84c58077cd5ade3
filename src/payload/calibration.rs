use super::ChannelKey;
use crate::archive::{Archivable, InputArchive, OutputArchive, Persist};
use crate::error::{CodecError, Result};
use std::collections::BTreeMap;

/// Where a set of calibration constants came from.
///
/// Version 0 records numbered these `Unknown = 0, Laboratory = 1,
/// InSitu = 2`; version 1 swapped the last two.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CalibrationSource {
    /// Not recorded.
    #[default]
    Unknown,
    /// Measured in situ.
    InSitu,
    /// Measured before deployment.
    Laboratory,
}

impl CalibrationSource {
    fn code(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::InSitu => 1,
            Self::Laboratory => 2,
        }
    }

    fn from_code(code: u8, version: u32) -> Result<Self> {
        let source = match (code, version) {
            (0, _) => Self::Unknown,
            (1, 0) | (2, 1..) => Self::Laboratory,
            (2, 0) | (1, 1..) => Self::InSitu,
            _ => {
                return Err(CodecError::InvalidTag {
                    what: "CalibrationSource",
                    value: u64::from(code),
                }
                .into());
            }
        };
        Ok(source)
    }
}

/// Linear charge calibration of one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelGain {
    /// Multiplicative factor.
    pub gain: f64,
    /// Additive offset in photoelectrons.
    pub offset: f64,
}

impl Default for ChannelGain {
    fn default() -> Self {
        Self {
            gain: 1.0,
            offset: 0.0,
        }
    }
}

impl ChannelGain {
    /// Applies the calibration to a charge.
    pub fn apply(&self, charge: f32) -> f32 {
        (f64::from(charge) * self.gain + self.offset) as f32
    }
}

impl Persist for ChannelGain {
    fn save(&self, ar: &mut OutputArchive<'_>) -> Result<()> {
        ar.encoder().put(self.gain);
        ar.encoder().put(self.offset);
        Ok(())
    }

    fn load(ar: &mut InputArchive<'_>) -> Result<Self> {
        Ok(Self {
            gain: ar.decoder().get()?,
            offset: ar.decoder().get()?,
        })
    }
}

/// Per-channel charge calibration constants.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelCalibration {
    /// Origin of the constants.
    pub source: CalibrationSource,
    /// Constants per channel.
    pub channels: BTreeMap<ChannelKey, ChannelGain>,
}

impl ChannelCalibration {
    /// The constants of one channel.
    pub fn get(&self, key: &ChannelKey) -> Option<&ChannelGain> {
        self.channels.get(key)
    }
}

impl Archivable for ChannelCalibration {
    const TYPE_KEY: &'static str = "ChannelCalibration";
    const VERSION: u32 = 1;

    fn save(&self, ar: &mut OutputArchive<'_>) -> Result<()> {
        ar.encoder().put(self.source.code());
        ar.write(&self.channels)
    }

    fn load(ar: &mut InputArchive<'_>, version: u32) -> Result<Self> {
        let source = CalibrationSource::from_code(ar.decoder().get()?, version)?;
        Ok(Self {
            source,
            channels: ar.read()?,
        })
    }
}
