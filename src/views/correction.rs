use crate::Archivable;
use crate::error::{FrameError, Result};
use crate::frame::Frame;
use crate::payload::{ChannelCalibration, PulseSeriesMap};

/// Pulses with a per-channel linear charge calibration applied.
///
/// Both the pulses and the calibration are looked up by name, so the
/// calibration usually comes from a Calibration frame mixed into the
/// physics frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Archivable)]
pub struct ChargeCorrection {
    /// Frame key of the pulses.
    pub pulses: String,
    /// Frame key of the [`ChannelCalibration`].
    pub calibration: String,
}

impl ChargeCorrection {
    /// A correction of `pulses` with `calibration`.
    pub fn new(pulses: impl Into<String>, calibration: impl Into<String>) -> Self {
        Self {
            pulses: pulses.into(),
            calibration: calibration.into(),
        }
    }

    /// Computes the corrected pulses.
    ///
    /// # Errors
    /// [`FrameError::InconsistentView`] if a channel with pulses has no
    /// calibration.
    pub fn apply(&self, frame: &Frame) -> Result<Option<PulseSeriesMap>> {
        let Some(pulses) = frame.get::<PulseSeriesMap>(&self.pulses)? else {
            return Ok(None);
        };
        let Some(calibration) = frame.get::<ChannelCalibration>(&self.calibration)? else {
            return Ok(None);
        };

        let mut out = PulseSeriesMap::new();
        for (key, series) in pulses.iter() {
            let gain = calibration.get(key).ok_or_else(|| FrameError::InconsistentView {
                view: Self::TYPE_KEY,
                source_key: self.calibration.clone(),
                reason: format!("no calibration for channel {key}"),
            })?;
            let corrected = series
                .iter()
                .map(|p| {
                    let mut p = *p;
                    p.charge = gain.apply(p.charge);
                    p
                })
                .collect();
            out.0.insert(*key, corrected);
        }
        Ok(Some(out))
    }
}

pub(crate) fn corrected_pulses(
    view: &ChargeCorrection,
    frame: &Frame,
) -> Result<Option<PulseSeriesMap>> {
    view.apply(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::TypeRegistry;
    use crate::frame::{FrameMixer, Stream};
    use crate::payload::{ChannelGain, ChannelKey, Pulse};
    use std::sync::Arc;

    #[test]
    fn calibration_from_an_earlier_frame() {
        let registry = Arc::new(TypeRegistry::standard().unwrap());
        let key = ChannelKey::new(21, 30, 0);
        let mut mixer = FrameMixer::default();

        let mut calib = Frame::new(Stream::Calibration, Arc::clone(&registry));
        let mut constants = ChannelCalibration::default();
        constants.channels.insert(key, ChannelGain { gain: 2.0, offset: 1.0 });
        calib.put("calibration", constants).unwrap();
        mixer.mix(&mut calib);

        let mut physics = Frame::new(Stream::Physics, registry);
        let pulse = Pulse {
            time: 1.0,
            charge: 3.0,
            ..Default::default()
        };
        physics
            .put("pulses", PulseSeriesMap::from_iter([(key, vec![pulse])]))
            .unwrap();
        physics.put("calibrated", ChargeCorrection::new("pulses", "calibration")).unwrap();
        mixer.mix(&mut physics);

        let out = physics.get::<PulseSeriesMap>("calibrated").unwrap().unwrap();
        assert_eq!(out.get(&key).unwrap()[0].charge, 7.0);
        assert_eq!(ChargeCorrection::TYPE_KEY, "ChargeCorrection");

        let other = ChannelKey::new(1, 1, 0);
        physics
            .replace("pulses", PulseSeriesMap::from_iter([(other, vec![Pulse::default()])]))
            .unwrap();
        assert!(matches!(
            physics.get::<PulseSeriesMap>("calibrated"),
            Err(FrameError::InconsistentView { .. })
        ));
    }
}
