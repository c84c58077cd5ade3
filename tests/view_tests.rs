#![allow(missing_docs)]

use evframe::file::{FrameFile, FrameSequence, FrameWriter};
use evframe::payload::{
    CalibrationSource, ChannelCalibration, ChannelGain, ChannelKey, Pulse, PulseSeriesMap,
};
use evframe::views::{ChargeCorrection, ModuleCombination, PackedPulses, PulseMask, PulseUnion};
use evframe::{Frame, FrameError, Result, SequenceOptions, Stream, TypeRegistry};
use proptest::prelude::*;
use std::sync::Arc;

const CHANNELS: [ChannelKey; 3] = [
    ChannelKey::new(7, 1, 0),
    ChannelKey::new(7, 1, 2),
    ChannelKey::new(21, 33, 0),
];

fn registry() -> Arc<TypeRegistry> {
    Arc::new(TypeRegistry::standard().unwrap())
}

fn pulses() -> PulseSeriesMap {
    CHANNELS
        .iter()
        .enumerate()
        .map(|(c, key)| {
            let series = (0..4u8)
                .map(|i| Pulse {
                    time: 100.0 * c as f64 + 10.0 * f64::from(i),
                    charge: 0.5 * (i + 1) as f32,
                    width: 4.0,
                    flags: 0,
                })
                .collect();
            (*key, series)
        })
        .collect()
}

fn physics_frame() -> Frame {
    let mut frame = Frame::new(Stream::Physics, registry());
    frame.put("pulses", pulses()).unwrap();
    frame
}

proptest! {
    #[test]
    fn clearing_one_bit_removes_exactly_that_pulse(channel in 0usize..3, index in 0usize..4) {
        let mut frame = physics_frame();
        let mut mask = PulseMask::all(&frame, "pulses").unwrap();
        let key = CHANNELS[channel];
        mask.set(key, index, false).unwrap();
        frame.put("masked", mask).unwrap();

        let source = frame.get::<PulseSeriesMap>("pulses").unwrap().unwrap();
        let masked = frame.get::<PulseSeriesMap>("masked").unwrap().unwrap();
        prop_assert_eq!(masked.pulse_count(), source.pulse_count() - 1);
        for (k, series) in source.iter() {
            let kept = masked.get(k).unwrap_or(&[]);
            if *k == key {
                let mut expected = series.to_vec();
                expected.remove(index);
                prop_assert_eq!(kept, expected.as_slice());
            } else {
                prop_assert_eq!(kept, series);
            }
        }
    }
}

#[test]
fn full_mask_reproduces_its_source() -> Result<()> {
    let mut frame = physics_frame();
    let mask = PulseMask::all(&frame, "pulses")?;
    assert_eq!(mask.count(), 12);
    frame.put("everything", mask)?;
    frame.put("nothing", PulseMask::none(&frame, "pulses")?)?;

    let source = frame.get::<PulseSeriesMap>("pulses")?.unwrap();
    assert_eq!(*frame.get::<PulseSeriesMap>("everything")?.unwrap(), *source);
    assert!(frame.get::<PulseSeriesMap>("nothing")?.unwrap().is_empty());
    Ok(())
}

#[test]
fn missing_source_means_absent_view() -> Result<()> {
    let mut frame = physics_frame();
    frame.put("masked", PulseMask::all(&frame, "pulses")?)?;
    frame.put("union", PulseUnion::new(["masked", "elsewhere"]))?;
    assert!(frame.get::<PulseSeriesMap>("union")?.is_none());
    assert!(!frame.has::<PulseSeriesMap>("union")?);

    assert!(frame.delete("pulses"));
    assert!(frame.get::<PulseSeriesMap>("masked")?.is_none());
    assert!(frame.contains("masked"));
    Ok(())
}

#[test]
fn changed_source_shape_is_reported() -> Result<()> {
    let mut frame = physics_frame();
    frame.put("masked", PulseMask::all(&frame, "pulses")?)?;
    let mut shorter = pulses();
    shorter.0.remove(&CHANNELS[1]);
    frame.replace("pulses", shorter)?;

    let err = frame.get::<PulseSeriesMap>("masked").unwrap_err();
    assert!(matches!(
        err,
        FrameError::InconsistentView { ref source_key, .. } if source_key == "pulses"
    ));
    Ok(())
}

#[test]
fn chained_views_survive_a_file() -> Result<()> {
    let registry = registry();
    let mut writer = FrameWriter::builder().verify_on_write(true).build(Vec::new())?;

    let mut calibration = Frame::new(Stream::Calibration, Arc::clone(&registry));
    calibration.put(
        "gains",
        ChannelCalibration {
            source: CalibrationSource::InSitu,
            channels: CHANNELS
                .iter()
                .map(|key| (*key, ChannelGain { gain: 2.0, offset: 0.0 }))
                .collect(),
        },
    )?;
    writer.write(&calibration)?;

    let mut physics = Frame::new(Stream::Physics, Arc::clone(&registry));
    physics.put("packed", PackedPulses::pack(&pulses()))?;
    let bright = PulseMask::from_predicate(&physics, "packed", |_, p| p.charge > 1.2)?;
    physics.put("bright", bright)?;
    physics.put("calibrated", ChargeCorrection::new("bright", "gains"))?;
    physics.put("modules", ModuleCombination::new("calibrated"))?;
    writer.write(&physics)?;

    let sequence = FrameSequence::new(
        FrameFile::from_bytes(writer.finish()?)?,
        Arc::clone(&registry),
        SequenceOptions::default(),
    );
    let frame = sequence.frame(1)?;
    let modules = frame.get::<PulseSeriesMap>("modules")?.unwrap();

    // Charges 1.5 and 2.0 pass in every channel; PMTs 0 and 2 of module
    // (7, 1) fold together.
    assert_eq!(modules.len(), 2);
    assert_eq!(modules.get(&ChannelKey::new(7, 1, 0)).unwrap().len(), 4);
    assert_eq!(modules.pulse_count(), 6);
    assert!((modules.total_charge() - 2.0 * 3.0 * 3.5).abs() < 1e-3);
    let series = modules.get(&ChannelKey::new(21, 33, 0)).unwrap();
    assert!(series.windows(2).all(|w| w[0].time <= w[1].time));

    // Views are not stored: the frame still holds only what was written.
    assert_eq!(frame.type_name("modules"), Some("ModuleCombination"));
    Ok(())
}

#[test]
fn missing_calibration_entry_is_inconsistent() -> Result<()> {
    let mut frame = physics_frame();
    frame.put(
        "gains",
        ChannelCalibration {
            source: CalibrationSource::Laboratory,
            channels: [(CHANNELS[0], ChannelGain::default())].into_iter().collect(),
        },
    )?;
    frame.put("calibrated", ChargeCorrection::new("pulses", "gains"))?;
    let err = frame.get::<PulseSeriesMap>("calibrated").unwrap_err();
    assert!(matches!(err, FrameError::InconsistentView { .. }));
    Ok(())
}
