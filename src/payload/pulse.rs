use crate::archive::{Archivable, InputArchive, OutputArchive, Persist};
use crate::error::{CodecError, Result};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Address of one photomultiplier: string, module on the string, PMT in
/// the module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelKey {
    /// String number.
    pub string: i32,
    /// Module number on the string.
    pub module: u32,
    /// PMT number within the module.
    pub pmt: u8,
}

impl ChannelKey {
    /// Creates a key.
    pub const fn new(string: i32, module: u32, pmt: u8) -> Self {
        Self { string, module, pmt }
    }

    /// The same module with PMT 0.
    pub const fn module_key(self) -> Self {
        Self { pmt: 0, ..self }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.string, self.module, self.pmt)
    }
}

impl Persist for ChannelKey {
    fn save(&self, ar: &mut OutputArchive<'_>) -> Result<()> {
        let enc = ar.encoder();
        enc.put(self.string);
        enc.put(self.module);
        enc.put(self.pmt);
        Ok(())
    }

    fn load(ar: &mut InputArchive<'_>) -> Result<Self> {
        let dec = ar.decoder();
        Ok(Self {
            string: dec.get()?,
            module: dec.get()?,
            pmt: dec.get()?,
        })
    }
}

/// One extracted light pulse.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pulse {
    /// Arrival time in ns.
    pub time: f64,
    /// Charge in photoelectrons.
    pub charge: f32,
    /// Width in ns.
    pub width: f32,
    /// Readout flags.
    pub flags: u8,
}

impl Pulse {
    /// Orders by time, then by every other field, so that sorting followed
    /// by `dedup` removes exact duplicates.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then(self.charge.total_cmp(&other.charge))
            .then(self.width.total_cmp(&other.width))
            .then(self.flags.cmp(&other.flags))
    }
}

/// Pulses per channel, each list in time order.
///
/// Schema history:
/// - 0: time and charge, both `f64`.
/// - 1: charge narrowed to `f32`, width added.
/// - 2: flags added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PulseSeriesMap(pub BTreeMap<ChannelKey, Vec<Pulse>>);

impl PulseSeriesMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the pulses of one channel, sorted by time.
    pub fn insert(&mut self, key: ChannelKey, mut pulses: Vec<Pulse>) {
        pulses.sort_by(Pulse::total_cmp);
        self.0.insert(key, pulses);
    }

    /// The pulses of one channel.
    pub fn get(&self, key: &ChannelKey) -> Option<&[Pulse]> {
        self.0.get(key).map(Vec::as_slice)
    }

    /// Channels in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&ChannelKey, &[Pulse])> {
        self.0.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if no channel is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of pulses over all channels.
    pub fn pulse_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Sum of all charges.
    pub fn total_charge(&self) -> f64 {
        self.0
            .values()
            .flatten()
            .map(|p| f64::from(p.charge))
            .sum()
    }
}

impl FromIterator<(ChannelKey, Vec<Pulse>)> for PulseSeriesMap {
    fn from_iter<I: IntoIterator<Item = (ChannelKey, Vec<Pulse>)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, pulses) in iter {
            map.insert(key, pulses);
        }
        map
    }
}

fn load_pulse(ar: &mut InputArchive<'_>, version: u32) -> Result<Pulse> {
    let dec = ar.decoder();
    let time = dec.get::<f64>()?;
    let pulse = match version {
        0 => Pulse {
            time,
            charge: dec.get::<f64>()? as f32,
            ..Pulse::default()
        },
        1 => Pulse {
            time,
            charge: dec.get()?,
            width: dec.get()?,
            flags: 0,
        },
        _ => Pulse {
            time,
            charge: dec.get()?,
            width: dec.get()?,
            flags: dec.get()?,
        },
    };
    Ok(pulse)
}

impl Archivable for PulseSeriesMap {
    const TYPE_KEY: &'static str = "PulseSeriesMap";
    const VERSION: u32 = 2;

    fn save(&self, ar: &mut OutputArchive<'_>) -> Result<()> {
        ar.encoder().put_count(self.0.len() as u64);
        for (key, pulses) in &self.0 {
            ar.write(key)?;
            let enc = ar.encoder();
            enc.put_count(pulses.len() as u64);
            for p in pulses {
                enc.put(p.time);
                enc.put(p.charge);
                enc.put(p.width);
                enc.put(p.flags);
            }
        }
        Ok(())
    }

    fn load(ar: &mut InputArchive<'_>, version: u32) -> Result<Self> {
        let channels = ar.decoder().get_len(13)?;
        let mut map = BTreeMap::new();
        for _ in 0..channels {
            let key: ChannelKey = ar.read()?;
            let count = ar.decoder().get_len(16)?;
            let mut pulses = Vec::with_capacity(count);
            for _ in 0..count {
                pulses.push(load_pulse(ar, version)?);
            }
            if pulses.windows(2).any(|w| w[0].time > w[1].time) {
                return Err(CodecError::Malformed {
                    type_key: Self::TYPE_KEY.to_string(),
                    reason: format!("pulses of channel {key} are not time ordered"),
                }
                .into());
            }
            map.insert(key, pulses);
        }
        Ok(Self(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{self, FrameObject, TypeRegistry};
    use std::sync::Arc;

    fn pulse(time: f64, charge: f32) -> Pulse {
        Pulse {
            time,
            charge,
            width: 4.0,
            flags: 1,
        }
    }

    #[test]
    fn insert_sorts_by_time() {
        let mut map = PulseSeriesMap::new();
        map.insert(ChannelKey::new(1, 2, 0), vec![pulse(20.0, 1.0), pulse(5.0, 2.0)]);
        let times: Vec<f64> = map
            .get(&ChannelKey::new(1, 2, 0))
            .unwrap()
            .iter()
            .map(|p| p.time)
            .collect();
        assert_eq!(times, [5.0, 20.0]);
        assert_eq!(map.pulse_count(), 2);
        assert_eq!(map.total_charge(), 3.0);
    }

    #[test]
    fn version_zero_records_are_widened() {
        let registry = TypeRegistry::standard().unwrap();
        let mut ar = OutputArchive::new(&registry);
        let enc = ar.encoder();
        enc.put_str("PulseSeriesMap");
        enc.put_version(0);
        enc.put_count(0);
        enc.put_count(1);
        enc.put(3i32);
        enc.put(14u32);
        enc.put(0u8);
        enc.put_count(1);
        enc.put(100.0f64);
        enc.put(1.5f64);
        let bytes = ar.into_bytes();

        let obj = archive::decode_object(&registry, &bytes).unwrap();
        let map = obj.as_any().downcast_ref::<PulseSeriesMap>().unwrap();
        let p = map.get(&ChannelKey::new(3, 14, 0)).unwrap()[0];
        assert_eq!(p, Pulse { time: 100.0, charge: 1.5, width: 0.0, flags: 0 });
    }

    #[test]
    fn unordered_pulses_are_rejected() {
        let registry = TypeRegistry::standard().unwrap();
        let mut raw = BTreeMap::new();
        raw.insert(ChannelKey::new(1, 1, 0), vec![pulse(9.0, 1.0), pulse(1.0, 1.0)]);
        let obj: Arc<dyn FrameObject> = Arc::new(PulseSeriesMap(raw));
        let bytes = archive::encode_object(&registry, &obj).unwrap();
        let err = archive::decode_object(&registry, &bytes).unwrap_err();
        assert!(matches!(err.as_codec(), Some(CodecError::Malformed { .. })));
    }
}
