//! Reference payload types.
//!
//! Scalars and small maps for general bookkeeping, and a pulse family that
//! the standard derived views operate on.

mod calibration;
mod pulse;
mod scalar;

pub use calibration::{CalibrationSource, ChannelCalibration, ChannelGain};
pub use pulse::{ChannelKey, Pulse, PulseSeriesMap};
pub use scalar::{BoolValue, F64Map, F64Value, I32Value, StringValue};

use crate::archive::TypeRegistry;
use crate::error::Result;
use crate::views;

/// Registers every bundled payload type, every view type and the standard
/// view chain.
pub fn register_standard(registry: &mut TypeRegistry) -> Result<()> {
    registry.register::<F64Value>()?;
    registry.register::<I32Value>()?;
    registry.register::<BoolValue>()?;
    registry.register::<StringValue>()?;
    registry.register::<F64Map>()?;
    registry.register::<PulseSeriesMap>()?;
    registry.register::<ChannelCalibration>()?;
    views::register_standard_views(registry)
}
