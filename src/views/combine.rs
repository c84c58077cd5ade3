use crate::Archivable;
use crate::error::Result;
use crate::frame::Frame;
use crate::payload::{Pulse, PulseSeriesMap};

/// Pulses merged per module: every PMT of a module contributes to a single
/// channel with `pmt = 0`, in time order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Archivable)]
pub struct ModuleCombination {
    /// Frame key of the per-PMT pulses.
    pub pulses: String,
}

impl ModuleCombination {
    /// A combination of `pulses`.
    pub fn new(pulses: impl Into<String>) -> Self {
        Self { pulses: pulses.into() }
    }

    /// Computes the per-module pulses.
    pub fn apply(&self, frame: &Frame) -> Result<Option<PulseSeriesMap>> {
        let Some(source) = frame.get::<PulseSeriesMap>(&self.pulses)? else {
            return Ok(None);
        };
        let mut out = PulseSeriesMap::new();
        for (key, pulses) in source.iter() {
            out.0.entry(key.module_key()).or_default().extend_from_slice(pulses);
        }
        for pulses in out.0.values_mut() {
            pulses.sort_by(Pulse::total_cmp);
        }
        Ok(Some(out))
    }
}

pub(crate) fn combined_pulses(
    view: &ModuleCombination,
    frame: &Frame,
) -> Result<Option<PulseSeriesMap>> {
    view.apply(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::TypeRegistry;
    use crate::frame::Stream;
    use crate::payload::ChannelKey;
    use std::sync::Arc;

    #[test]
    fn pmts_fold_into_their_module() {
        let registry = Arc::new(TypeRegistry::standard().unwrap());
        let mut frame = Frame::new(Stream::Physics, registry);
        let at = |time| Pulse { time, charge: 1.0, ..Default::default() };
        let pulses = PulseSeriesMap::from_iter([
            (ChannelKey::new(1, 5, 0), vec![at(30.0)]),
            (ChannelKey::new(1, 5, 3), vec![at(10.0), at(40.0)]),
            (ChannelKey::new(1, 6, 2), vec![at(20.0)]),
        ]);
        frame.put("pmt_pulses", pulses).unwrap();
        frame.put("module_pulses", ModuleCombination::new("pmt_pulses")).unwrap();

        let combined = frame.get::<PulseSeriesMap>("module_pulses").unwrap().unwrap();
        assert_eq!(combined.len(), 2);
        let times: Vec<f64> = combined
            .get(&ChannelKey::new(1, 5, 0))
            .unwrap()
            .iter()
            .map(|p| p.time)
            .collect();
        assert_eq!(times, [10.0, 30.0, 40.0]);
        assert_eq!(combined.get(&ChannelKey::new(1, 6, 0)).unwrap().len(), 1);
    }
}
