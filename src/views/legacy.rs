use crate::archive::{Archivable, InputArchive, OutputArchive, Persist};
use crate::error::Result;
use crate::frame::Frame;
use crate::payload::{ChannelKey, Pulse, PulseSeriesMap};
use std::collections::BTreeMap;

/// A hit of the previous pulse generation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LegacyHit {
    /// Arrival time in ns.
    pub time: f64,
    /// Charge in photoelectrons.
    pub charge: f64,
}

impl Persist for LegacyHit {
    fn save(&self, ar: &mut OutputArchive<'_>) -> Result<()> {
        ar.encoder().put(self.time);
        ar.encoder().put(self.charge);
        Ok(())
    }

    fn load(ar: &mut InputArchive<'_>) -> Result<Self> {
        Ok(Self {
            time: ar.decoder().get()?,
            charge: ar.decoder().get()?,
        })
    }
}

/// Hits per channel in the previous generation's shape. Requesting a
/// [`PulseSeriesMap`] converts them with zero width and no flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyHitSeriesMap(pub BTreeMap<ChannelKey, Vec<LegacyHit>>);

impl Archivable for LegacyHitSeriesMap {
    const TYPE_KEY: &'static str = "LegacyHitSeriesMap";

    fn save(&self, ar: &mut OutputArchive<'_>) -> Result<()> {
        ar.write(&self.0)
    }

    fn load(ar: &mut InputArchive<'_>, _version: u32) -> Result<Self> {
        ar.read().map(Self)
    }
}

impl LegacyHitSeriesMap {
    /// Converts to the current pulse shape.
    pub fn to_pulses(&self) -> PulseSeriesMap {
        self.0
            .iter()
            .map(|(key, hits)| {
                let pulses = hits
                    .iter()
                    .map(|h| Pulse {
                        time: h.time,
                        charge: h.charge as f32,
                        width: 0.0,
                        flags: 0,
                    })
                    .collect();
                (*key, pulses)
            })
            .collect()
    }
}

pub(crate) fn converted_hits(
    legacy: &LegacyHitSeriesMap,
    _frame: &Frame,
) -> Result<Option<PulseSeriesMap>> {
    Ok(Some(legacy.to_pulses()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::TypeRegistry;
    use crate::frame::Stream;
    use std::sync::Arc;

    #[test]
    fn old_hits_read_as_pulses() {
        let registry = Arc::new(TypeRegistry::standard().unwrap());
        let key = ChannelKey::new(12, 40, 0);
        let mut hits = BTreeMap::new();
        hits.insert(
            key,
            vec![
                LegacyHit { time: 30.0, charge: 1.25 },
                LegacyHit { time: 10.0, charge: 0.5 },
            ],
        );
        let mut frame = Frame::new(Stream::Physics, Arc::clone(&registry));
        frame.put("hits", LegacyHitSeriesMap(hits)).unwrap();

        // Round trip through the frame record so the view runs on a decoded blob.
        let bytes = frame.to_record(false).unwrap();
        let (loaded, _) = Frame::from_bytes(&bytes, registry, &Default::default()).unwrap();
        let pulses = loaded.get::<PulseSeriesMap>("hits").unwrap().unwrap();
        let series = pulses.get(&key).unwrap();
        assert_eq!(series[0], Pulse { time: 10.0, charge: 0.5, width: 0.0, flags: 0 });
        assert_eq!(series.len(), 2);
        assert!(loaded.has::<PulseSeriesMap>("hits").unwrap());
    }
}
