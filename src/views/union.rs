use crate::Archivable;
use crate::error::Result;
use crate::frame::Frame;
use crate::payload::{Pulse, PulseSeriesMap};

/// The union of several pulse maps stored (or derived) under other keys.
///
/// Pulses present in more than one source appear once. If any source is
/// absent the union is absent too.
#[derive(Debug, Clone, Default, PartialEq, Eq, Archivable)]
pub struct PulseUnion {
    /// Frame keys of the sources.
    pub sources: Vec<String>,
}

impl PulseUnion {
    /// A union over the given keys.
    pub fn new<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sources: sources.into_iter().map(Into::into).collect(),
        }
    }

    /// Computes the union.
    pub fn apply(&self, frame: &Frame) -> Result<Option<PulseSeriesMap>> {
        let mut out = PulseSeriesMap::new();
        for name in &self.sources {
            let Some(source) = frame.get::<PulseSeriesMap>(name)? else {
                tracing::debug!(source = %name, "union source absent");
                return Ok(None);
            };
            for (key, pulses) in source.iter() {
                out.0.entry(*key).or_default().extend_from_slice(pulses);
            }
        }
        for pulses in out.0.values_mut() {
            pulses.sort_by(Pulse::total_cmp);
            pulses.dedup();
        }
        Ok(Some(out))
    }
}

pub(crate) fn united_pulses(union: &PulseUnion, frame: &Frame) -> Result<Option<PulseSeriesMap>> {
    union.apply(frame)
}
