//! Derived views.
//!
//! When typed access finds an object that is not of the requested type,
//! the frame consults the registry's [`Resolver`]: an ordered chain of
//! transforms, each turning one stored type into one requested type. The
//! stored view objects hold only the names of what they read, so views
//! compose: a [`PulseUnion`] of [`PulseMask`]s over a [`PackedPulses`]
//! payload needs nothing beyond the three plain lookups.
//!
//! The standard chain, in priority order:
//!
//! | view | stored type | produces |
//! |---|---|---|
//! | mask | [`PulseMask`] | [`PulseSeriesMap`] |
//! | union | [`PulseUnion`] | [`PulseSeriesMap`] |
//! | charge correction | [`ChargeCorrection`] | [`PulseSeriesMap`] |
//! | module combination | [`ModuleCombination`] | [`PulseSeriesMap`] |
//! | unpack | [`PackedPulses`] | [`PulseSeriesMap`] |
//! | legacy shim | [`LegacyHitSeriesMap`] | [`PulseSeriesMap`] |
//!
//! View results are computed on every request and never cached.

mod chain;
mod combine;
mod correction;
mod legacy;
mod mask;
mod packed;
mod union;

pub use chain::{Resolver, Transform, ViewFn};
pub use combine::ModuleCombination;
pub use correction::ChargeCorrection;
pub use legacy::{LegacyHit, LegacyHitSeriesMap};
pub use mask::{Bitmask, PulseMask};
pub use packed::{CHARGE_RESOLUTION, PackedPulses, TIME_RESOLUTION};
pub use union::PulseUnion;

use crate::archive::TypeRegistry;
use crate::error::Result;
use crate::payload::PulseSeriesMap;

/// Registers the view types and the standard chain.
///
/// [`PulseSeriesMap`] must already be registered.
pub fn register_standard_views(registry: &mut TypeRegistry) -> Result<()> {
    registry.register::<PulseMask>()?;
    registry.register::<PulseUnion>()?;
    registry.register::<ChargeCorrection>()?;
    registry.register::<ModuleCombination>()?;
    registry.register::<PackedPulses>()?;
    registry.register::<LegacyHitSeriesMap>()?;

    registry.register_view::<PulseMask, PulseSeriesMap>("mask", mask::masked_pulses)?;
    registry.register_view::<PulseUnion, PulseSeriesMap>("union", union::united_pulses)?;
    registry.register_view::<ChargeCorrection, PulseSeriesMap>(
        "charge correction",
        correction::corrected_pulses,
    )?;
    registry.register_view::<ModuleCombination, PulseSeriesMap>(
        "module combination",
        combine::combined_pulses,
    )?;
    registry.register_view::<PackedPulses, PulseSeriesMap>("unpack", packed::unpacked_pulses)?;
    registry.register_view::<LegacyHitSeriesMap, PulseSeriesMap>(
        "legacy shim",
        legacy::converted_hits,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_chain_order() {
        let registry = TypeRegistry::standard().unwrap();
        assert_eq!(
            registry.resolver().names(),
            ["mask", "union", "charge correction", "module combination", "unpack", "legacy shim"]
        );
    }
}
