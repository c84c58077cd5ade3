use crate::archive::{Archivable, InputArchive, OutputArchive};
use crate::error::{CodecError, FrameError, Result};
use crate::frame::Frame;
use crate::payload::{ChannelKey, Pulse, PulseSeriesMap};

/// Time quantum in ns.
pub const TIME_RESOLUTION: f64 = 1.0;

/// Charge quantum in photoelectrons.
pub const CHARGE_RESOLUTION: f64 = 0.05;

/// A pulse map stored in a compact quantized form and unpacked on demand.
///
/// Per channel: LEB128 string (zigzag), module and pulse count, the PMT
/// byte, then per pulse the zigzag LEB128 time step from the previous
/// pulse, a `u16` charge, a LEB128 width and the flags byte. Times and
/// widths are rounded to [`TIME_RESOLUTION`], charges to
/// [`CHARGE_RESOLUTION`] and saturate at the `u16` range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackedPulses {
    data: Vec<u8>,
}

fn put_leb(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

fn unzigzag(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn malformed(&self, what: &str) -> FrameError {
        CodecError::Malformed {
            type_key: PackedPulses::TYPE_KEY.to_string(),
            reason: format!("{what} at byte {}", self.pos),
        }
        .into()
    }

    fn byte(&mut self) -> Result<u8> {
        let b = *self.data.get(self.pos).ok_or_else(|| self.malformed("unexpected end"))?;
        self.pos += 1;
        Ok(b)
    }

    fn leb(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let b = self.byte()?;
            value |= u64::from(b & 0x7f) << shift;
            if b & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(self.malformed("overlong varint"))
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes([self.byte()?, self.byte()?]))
    }
}

impl PackedPulses {
    /// Quantizes and packs a pulse map.
    pub fn pack(pulses: &PulseSeriesMap) -> Self {
        let mut data = Vec::with_capacity(pulses.pulse_count() * 5 + pulses.len() * 8);
        put_leb(&mut data, pulses.len() as u64);
        for (key, series) in pulses.iter() {
            put_leb(&mut data, zigzag(i64::from(key.string)));
            put_leb(&mut data, u64::from(key.module));
            data.push(key.pmt);
            put_leb(&mut data, series.len() as u64);
            let mut last = 0i64;
            for p in series {
                let ticks = (p.time / TIME_RESOLUTION).round() as i64;
                put_leb(&mut data, zigzag(ticks.wrapping_sub(last)));
                last = ticks;
                let charge = (f64::from(p.charge) / CHARGE_RESOLUTION)
                    .round()
                    .clamp(0.0, f64::from(u16::MAX)) as u16;
                data.extend_from_slice(&charge.to_le_bytes());
                put_leb(&mut data, (f64::from(p.width) / TIME_RESOLUTION).round().max(0.0) as u64);
                data.push(p.flags);
            }
        }
        Self { data }
    }

    /// Restores the pulse map at packing resolution.
    ///
    /// # Errors
    /// A malformed-payload codec error if the bytes are corrupt.
    pub fn unpack(&self) -> Result<PulseSeriesMap> {
        let mut cur = Cursor {
            data: &self.data,
            pos: 0,
        };
        let channels = cur.leb()?;
        let mut out = PulseSeriesMap::new();
        for _ in 0..channels {
            let string = i32::try_from(unzigzag(cur.leb()?))
                .map_err(|_| cur.malformed("string out of range"))?;
            let module =
                u32::try_from(cur.leb()?).map_err(|_| cur.malformed("module out of range"))?;
            let key = ChannelKey::new(string, module, cur.byte()?);
            let count = cur.leb()?;
            // Each pulse needs at least five bytes.
            if count.saturating_mul(5) > (self.data.len() - cur.pos) as u64 {
                return Err(cur.malformed("pulse count exceeds payload"));
            }
            let mut series = Vec::with_capacity(count as usize);
            let mut ticks = 0i64;
            for _ in 0..count {
                ticks = ticks.wrapping_add(unzigzag(cur.leb()?));
                let charge = f64::from(cur.u16()?) * CHARGE_RESOLUTION;
                let width = cur.leb()? as f64 * TIME_RESOLUTION;
                series.push(Pulse {
                    time: ticks as f64 * TIME_RESOLUTION,
                    charge: charge as f32,
                    width: width as f32,
                    flags: cur.byte()?,
                });
            }
            if out.0.insert(key, series).is_some() {
                return Err(cur.malformed("duplicate channel"));
            }
        }
        if cur.pos != self.data.len() {
            return Err(cur.malformed("trailing bytes"));
        }
        Ok(out)
    }

    /// Size of the packed form.
    pub fn packed_len(&self) -> usize {
        self.data.len()
    }
}

impl Archivable for PackedPulses {
    const TYPE_KEY: &'static str = "PackedPulses";

    fn save(&self, ar: &mut OutputArchive<'_>) -> Result<()> {
        ar.encoder().put_bytes(&self.data);
        Ok(())
    }

    fn load(ar: &mut InputArchive<'_>, _version: u32) -> Result<Self> {
        Ok(Self {
            data: ar.decoder().get_bytes()?.to_vec(),
        })
    }
}

pub(crate) fn unpacked_pulses(
    packed: &PackedPulses,
    _frame: &Frame,
) -> Result<Option<PulseSeriesMap>> {
    packed.unpack().map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::TypeRegistry;
    use crate::frame::Stream;
    use crate::views::PulseMask;
    use std::sync::Arc;

    fn pulses() -> PulseSeriesMap {
        PulseSeriesMap::from_iter([
            (
                ChannelKey::new(-3, 12, 1),
                vec![
                    Pulse { time: -5.2, charge: 0.97, width: 3.0, flags: 2 },
                    Pulse { time: 104.0, charge: 12.31, width: 8.4, flags: 0 },
                ],
            ),
            (
                ChannelKey::new(80, 60, 0),
                vec![Pulse { time: 9000.6, charge: 0.25, width: 1.0, flags: 7 }],
            ),
        ])
    }

    #[test]
    fn unpack_is_within_resolution() {
        let original = pulses();
        let packed = PackedPulses::pack(&original);
        let restored = packed.unpack().unwrap();
        assert_eq!(restored.len(), original.len());
        for ((ka, a), (kb, b)) in original.iter().zip(restored.iter()) {
            assert_eq!(ka, kb);
            for (pa, pb) in a.iter().zip(b) {
                assert!((pa.time - pb.time).abs() <= TIME_RESOLUTION / 2.0);
                assert!(f64::from((pa.charge - pb.charge).abs()) <= CHARGE_RESOLUTION / 2.0 + 1e-6);
                assert_eq!(pa.flags, pb.flags);
            }
        }
    }

    #[test]
    fn corrupt_payload_is_malformed() {
        let mut packed = PackedPulses::pack(&pulses());
        packed.data.truncate(packed.data.len() - 2);
        let err = packed.unpack().unwrap_err();
        assert!(matches!(err.as_codec(), Some(CodecError::Malformed { .. })));

        let mut packed = PackedPulses::pack(&pulses());
        packed.data.push(0);
        assert!(packed.unpack().is_err());
    }

    #[test]
    fn mask_over_packed_source() {
        let registry = Arc::new(TypeRegistry::standard().unwrap());
        let mut frame = Frame::new(Stream::Physics, registry);
        frame.put("packed", PackedPulses::pack(&pulses())).unwrap();
        let bright = PulseMask::from_predicate(&frame, "packed", |_, p| p.charge > 1.0).unwrap();
        frame.put("bright", bright).unwrap();
        let selected = frame.get::<PulseSeriesMap>("bright").unwrap().unwrap();
        assert_eq!(selected.pulse_count(), 1);
        assert_eq!(selected.iter().next().unwrap().0, &ChannelKey::new(-3, 12, 1));
    }
}
