use crate::error::{CodecError, FrameError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The processing-stage category a frame, or a single key, belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stream {
    /// Detector geometry.
    Geometry,
    /// Calibration constants.
    Calibration,
    /// Detector configuration and status.
    DetectorStatus,
    /// One readout (trigger) of the detector.
    DAQ,
    /// One reconstructed event derived from a readout.
    Physics,
    /// Processing metadata; never mixed.
    TrayInfo,
    /// Unclassified; never mixed.
    None,
}

impl Stream {
    /// Every stream, in wire-code order.
    pub const ALL: [Stream; 7] = [
        Stream::Geometry,
        Stream::Calibration,
        Stream::DetectorStatus,
        Stream::DAQ,
        Stream::Physics,
        Stream::TrayInfo,
        Stream::None,
    ];

    /// The single-byte wire code.
    pub const fn code(self) -> u8 {
        match self {
            Stream::Geometry => b'G',
            Stream::Calibration => b'C',
            Stream::DetectorStatus => b'D',
            Stream::DAQ => b'Q',
            Stream::Physics => b'P',
            Stream::TrayInfo => b'I',
            Stream::None => b'N',
        }
    }

    /// Parses a wire code.
    pub fn from_code(code: u8) -> Result<Self, FrameError> {
        Self::ALL
            .into_iter()
            .find(|s| s.code() == code)
            .ok_or_else(|| CodecError::UnknownStream(code).into())
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            Stream::Geometry => "Geometry",
            Stream::Calibration => "Calibration",
            Stream::DetectorStatus => "DetectorStatus",
            Stream::DAQ => "DAQ",
            Stream::Physics => "Physics",
            Stream::TrayInfo => "TrayInfo",
            Stream::None => "None",
        }
    }

    /// Whether frames of this stream take part in mixing at all. TrayInfo
    /// and None frames neither receive keys nor contribute them.
    pub const fn mixes(self) -> bool {
        !matches!(self, Stream::TrayInfo | Stream::None)
    }

    /// Whether the latest frame of this stream is kept for later frames to
    /// inherit from. Physics frames are transient.
    pub const fn is_cacheable(self) -> bool {
        self.mixes() && !matches!(self, Stream::Physics)
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stream {
    type Err = FrameError;

    /// Accepts a full name (any case) or a single-character code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let [code] = s.as_bytes() {
            return Self::from_code(code.to_ascii_uppercase());
        }
        Self::ALL
            .into_iter()
            .find(|stream| stream.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| FrameError::InvalidKey(format!("unknown stream '{s}'")))
    }
}
