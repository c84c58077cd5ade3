use crate::archive::{Archivable, InputArchive, OutputArchive, Persist};
use crate::error::{CodecError, FrameError, Result};
use crate::frame::Frame;
use crate::payload::{ChannelKey, Pulse, PulseSeriesMap};
use std::fmt;

const WORD_BITS: usize = 64;

/// A fixed-length bit vector.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Bitmask {
    len: usize,
    words: Vec<u64>,
}

impl Bitmask {
    /// `len` bits, all set to `value`.
    pub fn new(len: usize, value: bool) -> Self {
        let mut mask = Self {
            len,
            words: vec![if value { u64::MAX } else { 0 }; len.div_ceil(WORD_BITS)],
        };
        mask.clear_tail();
        mask
    }

    fn clear_tail(&mut self) {
        let used = self.len % WORD_BITS;
        if used != 0
            && let Some(last) = self.words.last_mut()
        {
            *last &= (1u64 << used) - 1;
        }
    }

    /// Number of bits.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True for a zero-length mask.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The bit at `index`, or `None` past the end.
    pub fn get(&self, index: usize) -> Option<bool> {
        (index < self.len).then(|| (self.words[index / WORD_BITS] >> (index % WORD_BITS)) & 1 == 1)
    }

    /// Sets the bit at `index`. Returns false if `index` is past the end.
    pub fn set(&mut self, index: usize, value: bool) -> bool {
        if index >= self.len {
            return false;
        }
        let bit = 1u64 << (index % WORD_BITS);
        let word = &mut self.words[index / WORD_BITS];
        if value {
            *word |= bit;
        } else {
            *word &= !bit;
        }
        true
    }

    /// Number of set bits.
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// True if any bit is set.
    pub fn any(&self) -> bool {
        self.words.iter().any(|w| *w != 0)
    }

    /// Indices of the set bits, ascending.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(|i| self.get(*i) == Some(true))
    }

    /// Combines two masks of equal length word by word; `None` if the
    /// lengths differ.
    pub fn combine(&self, other: &Self, op: impl Fn(u64, u64) -> u64) -> Option<Self> {
        if self.len != other.len {
            return None;
        }
        let mut out = Self {
            len: self.len,
            words: self.words.iter().zip(&other.words).map(|(a, b)| op(*a, *b)).collect(),
        };
        out.clear_tail();
        Some(out)
    }
}

impl fmt::Debug for Bitmask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits: String = (0..self.len)
            .map(|i| if self.get(i) == Some(true) { '1' } else { '0' })
            .collect();
        write!(f, "Bitmask({bits})")
    }
}

impl Persist for Bitmask {
    fn save(&self, ar: &mut OutputArchive<'_>) -> Result<()> {
        let enc = ar.encoder();
        enc.put_count(self.len as u64);
        for word in &self.words {
            enc.put(*word);
        }
        Ok(())
    }

    fn load(ar: &mut InputArchive<'_>) -> Result<Self> {
        let dec = ar.decoder();
        let len = dec.get_len(0)?;
        let words = len.div_ceil(WORD_BITS);
        if words * 8 > dec.remaining() {
            return Err(CodecError::ReadPastEnd {
                needed: (words * 8) as u64,
                remaining: dec.remaining() as u64,
            }
            .into());
        }
        let mut mask = Self {
            len,
            words: Vec::with_capacity(words),
        };
        for _ in 0..words {
            mask.words.push(dec.get()?);
        }
        let stored = mask.words.last().copied();
        mask.clear_tail();
        if stored != mask.words.last().copied() {
            return Err(CodecError::Malformed {
                type_key: "Bitmask".to_string(),
                reason: "bits set past the end of the mask".to_string(),
            }
            .into());
        }
        Ok(mask)
    }
}

/// A selection of pulses from a [`PulseSeriesMap`] stored elsewhere in the
/// frame.
///
/// The mask records the source's channel list and one bit per pulse;
/// requesting a `PulseSeriesMap` under the mask's name yields the selected
/// pulses, channels with no selected pulse omitted. The source may itself be
/// a derived view.
#[derive(Debug, Clone, PartialEq)]
pub struct PulseMask {
    source: String,
    keys: Vec<ChannelKey>,
    masks: Vec<Bitmask>,
}

impl PulseMask {
    /// Selects the pulses of `source` for which `keep` returns true.
    ///
    /// # Errors
    /// [`FrameError::MissingKey`] if no pulse map can be obtained under
    /// `source`.
    pub fn from_predicate(
        frame: &Frame,
        source: &str,
        mut keep: impl FnMut(&ChannelKey, &Pulse) -> bool,
    ) -> Result<Self> {
        let pulses = frame
            .get::<PulseSeriesMap>(source)?
            .ok_or_else(|| FrameError::MissingKey(source.to_string()))?;
        let mut keys = Vec::with_capacity(pulses.len());
        let mut masks = Vec::with_capacity(pulses.len());
        for (key, series) in pulses.iter() {
            let mut mask = Bitmask::new(series.len(), false);
            for (i, pulse) in series.iter().enumerate() {
                if keep(key, pulse) {
                    mask.set(i, true);
                }
            }
            keys.push(*key);
            masks.push(mask);
        }
        Ok(Self {
            source: source.to_string(),
            keys,
            masks,
        })
    }

    /// Selects every pulse of `source`.
    pub fn all(frame: &Frame, source: &str) -> Result<Self> {
        Self::from_predicate(frame, source, |_, _| true)
    }

    /// Selects no pulse of `source`.
    pub fn none(frame: &Frame, source: &str) -> Result<Self> {
        Self::from_predicate(frame, source, |_, _| false)
    }

    /// The frame key of the source map.
    pub fn source(&self) -> &str {
        &self.source
    }

    fn inconsistent(&self, reason: String) -> FrameError {
        FrameError::InconsistentView {
            view: Self::TYPE_KEY,
            source_key: self.source.clone(),
            reason,
        }
    }

    /// Selects or deselects pulse `index` of channel `key`.
    pub fn set(&mut self, key: ChannelKey, index: usize, value: bool) -> Result<()> {
        let Ok(pos) = self.keys.binary_search(&key) else {
            return Err(self.inconsistent(format!("channel {key} is not in the source")));
        };
        if !self.masks[pos].set(index, value) {
            let len = self.masks[pos].len();
            let reason = format!("channel {key} has {len} pulses, no index {index}");
            return Err(self.inconsistent(reason));
        }
        Ok(())
    }

    /// Whether pulse `index` of channel `key` is selected.
    pub fn get(&self, key: ChannelKey, index: usize) -> Option<bool> {
        let pos = self.keys.binary_search(&key).ok()?;
        self.masks[pos].get(index)
    }

    /// Number of selected pulses.
    pub fn count(&self) -> usize {
        self.masks.iter().map(Bitmask::count).sum()
    }

    fn combine(&self, other: &Self, op: impl Fn(u64, u64) -> u64 + Copy) -> Result<Self> {
        if other.source != self.source {
            let reason = format!("cannot combine with a mask of '{}'", other.source);
            return Err(self.inconsistent(reason));
        }
        if other.keys != self.keys {
            return Err(self.inconsistent("masks cover different channels".to_string()));
        }
        let masks = self
            .masks
            .iter()
            .zip(&other.masks)
            .map(|(a, b)| a.combine(b, op))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| self.inconsistent("masks disagree on pulse counts".to_string()))?;
        Ok(Self {
            source: self.source.clone(),
            keys: self.keys.clone(),
            masks,
        })
    }

    /// Pulses selected by both masks.
    pub fn and(&self, other: &Self) -> Result<Self> {
        self.combine(other, |a, b| a & b)
    }

    /// Pulses selected by either mask.
    pub fn or(&self, other: &Self) -> Result<Self> {
        self.combine(other, |a, b| a | b)
    }

    /// Pulses selected by exactly one mask.
    pub fn xor(&self, other: &Self) -> Result<Self> {
        self.combine(other, |a, b| a ^ b)
    }

    /// Pulses selected by this mask but not by `other`.
    pub fn and_not(&self, other: &Self) -> Result<Self> {
        self.combine(other, |a, b| a & !b)
    }

    /// The selected pulses, or `None` if the source is absent.
    ///
    /// # Errors
    /// [`FrameError::InconsistentView`] if the source no longer has the
    /// shape the mask was built against.
    pub fn apply(&self, frame: &Frame) -> Result<Option<PulseSeriesMap>> {
        let Some(source) = frame.get::<PulseSeriesMap>(&self.source)? else {
            return Ok(None);
        };
        if source.len() != self.keys.len() {
            return Err(self.inconsistent(format!(
                "mask covers {} channels, source has {}",
                self.keys.len(),
                source.len()
            )));
        }
        let mut out = PulseSeriesMap::new();
        let masks = self.keys.iter().zip(&self.masks);
        for ((key, series), (mask_key, mask)) in source.iter().zip(masks) {
            if key != mask_key || series.len() != mask.len() {
                return Err(self.inconsistent(format!("channel {key} does not match the mask")));
            }
            if mask.any() {
                out.0.insert(*key, mask.ones().map(|i| series[i]).collect());
            }
        }
        Ok(Some(out))
    }
}

impl Archivable for PulseMask {
    const TYPE_KEY: &'static str = "PulseMask";

    fn save(&self, ar: &mut OutputArchive<'_>) -> Result<()> {
        ar.write(&self.source)?;
        ar.write(&self.keys)?;
        let mut channels = Bitmask::new(self.keys.len(), false);
        for (i, mask) in self.masks.iter().enumerate() {
            channels.set(i, mask.any());
        }
        ar.write(&channels)?;
        self.masks.iter().try_for_each(|mask| ar.write(mask))
    }

    fn load(ar: &mut InputArchive<'_>, _version: u32) -> Result<Self> {
        let source: String = ar.read()?;
        let keys: Vec<ChannelKey> = ar.read()?;
        let channels: Bitmask = ar.read()?;
        let malformed = |reason: String| -> FrameError {
            CodecError::Malformed {
                type_key: Self::TYPE_KEY.to_string(),
                reason,
            }
            .into()
        };
        if channels.len() != keys.len() {
            return Err(malformed(format!(
                "{} channel bits for {} channels",
                channels.len(),
                keys.len()
            )));
        }
        if keys.windows(2).any(|w| w[0] >= w[1]) {
            return Err(malformed("channel keys are not strictly ascending".to_string()));
        }
        let mut masks = Vec::with_capacity(keys.len());
        for (i, key) in keys.iter().enumerate() {
            let mask: Bitmask = ar.read()?;
            if channels.get(i) != Some(mask.any()) {
                return Err(malformed(format!("channel bit of {key} disagrees with its pulses")));
            }
            masks.push(mask);
        }
        Ok(Self { source, keys, masks })
    }
}

/// View: the pulses a mask selects.
pub(crate) fn masked_pulses(mask: &PulseMask, frame: &Frame) -> Result<Option<PulseSeriesMap>> {
    mask.apply(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{self, FrameObject, TypeRegistry};
    use crate::frame::Stream;
    use std::sync::Arc;

    fn frame() -> Frame {
        let registry = Arc::new(TypeRegistry::standard().unwrap());
        let mut frame = Frame::new(Stream::Physics, registry);
        let pulses: PulseSeriesMap = [
            (
                ChannelKey::new(1, 1, 0),
                vec![
                    Pulse { time: 10.0, charge: 1.0, ..Default::default() },
                    Pulse { time: 20.0, charge: 0.2, ..Default::default() },
                ],
            ),
            (
                ChannelKey::new(1, 2, 0),
                vec![Pulse { time: 15.0, charge: 3.0, ..Default::default() }],
            ),
        ]
        .into_iter()
        .collect();
        frame.put("pulses", pulses).unwrap();
        frame
    }

    #[test]
    fn bitmask_basics() {
        let mut m = Bitmask::new(70, true);
        assert_eq!(m.count(), 70);
        assert!(m.set(69, false));
        assert!(!m.set(70, true));
        assert_eq!(m.get(69), Some(false));
        assert_eq!(m.get(70), None);
        let none = Bitmask::new(70, false);
        assert_eq!(m.combine(&none, |a, b| a | b).unwrap().count(), 69);
        assert!(m.combine(&Bitmask::new(3, false), |a, b| a & b).is_none());
    }

    #[test]
    fn predicate_selects_pulses() {
        let mut frame = frame();
        let bright = PulseMask::from_predicate(&frame, "pulses", |_, p| p.charge > 0.5).unwrap();
        assert_eq!(bright.count(), 2);
        assert_eq!(bright.get(ChannelKey::new(1, 1, 0), 1), Some(false));
        frame.put("bright", bright).unwrap();

        let selected = frame.get::<PulseSeriesMap>("bright").unwrap().unwrap();
        assert_eq!(selected.pulse_count(), 2);
        assert_eq!(selected.get(&ChannelKey::new(1, 1, 0)).unwrap().len(), 1);
    }

    #[test]
    fn set_operations() {
        let frame = frame();
        let all = PulseMask::all(&frame, "pulses").unwrap();
        let none = PulseMask::none(&frame, "pulses").unwrap();
        let mut early = none.clone();
        early.set(ChannelKey::new(1, 1, 0), 0, true).unwrap();

        assert_eq!(all.and(&early).unwrap(), early);
        assert_eq!(none.or(&early).unwrap(), early);
        assert_eq!(all.xor(&early).unwrap().count(), 2);
        assert_eq!(all.and_not(&early).unwrap().count(), 2);
        assert!(matches!(
            early.set(ChannelKey::new(9, 9, 0), 0, true),
            Err(FrameError::InconsistentView { .. })
        ));
        assert!(early.set(ChannelKey::new(1, 2, 0), 1, true).is_err());
    }

    #[test]
    fn changed_source_is_inconsistent() {
        let mut frame = frame();
        let mask = PulseMask::all(&frame, "pulses").unwrap();
        frame.put("mask", mask).unwrap();
        let key = ChannelKey::new(1, 1, 0);
        frame
            .replace("pulses", PulseSeriesMap::from_iter([(key, vec![Pulse::default()])]))
            .unwrap();
        assert!(matches!(
            frame.get::<PulseSeriesMap>("mask"),
            Err(FrameError::InconsistentView { .. })
        ));
        frame.delete("pulses");
        assert!(frame.get::<PulseSeriesMap>("mask").unwrap().is_none());
    }

    #[test]
    fn mask_record_round_trip() {
        let frame = frame();
        let registry = TypeRegistry::standard().unwrap();
        let mut mask = PulseMask::none(&frame, "pulses").unwrap();
        mask.set(ChannelKey::new(1, 2, 0), 0, true).unwrap();
        let obj: Arc<dyn FrameObject> = Arc::new(mask.clone());
        let bytes = archive::encode_object(&registry, &obj).unwrap();
        let back = archive::decode_object(&registry, &bytes).unwrap();
        assert_eq!(back.as_any().downcast_ref::<PulseMask>(), Some(&mask));
    }
}
