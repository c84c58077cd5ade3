use super::{Frame, Stream};
use crate::config::MixerOptions;

/// The latest entry per cacheable stream, kept in arrival order.
///
/// With `track_order`, a new entry of a stream drops that stream and every
/// stream cached after it, so a new Calibration frame invalidates a cached
/// DetectorStatus frame that was derived from the old calibration. Callers
/// that inherit from the cache call [`CacheOrder::supersede`] before
/// reading it so the new frame never sees the invalidated entries. Without
/// `track_order` a new entry simply replaces the old one in place.
#[derive(Debug, Clone)]
pub struct CacheOrder<T> {
    entries: Vec<(Stream, T)>,
    track_order: bool,
}

impl<T> CacheOrder<T> {
    /// Creates an empty cache.
    pub fn new(track_order: bool) -> Self {
        Self {
            entries: Vec::new(),
            track_order,
        }
    }

    /// Forgets what a new entry of `stream` supersedes: with `track_order`
    /// that is the cached entry of `stream` and every entry cached after it.
    /// Without it nothing is dropped until [`CacheOrder::insert`].
    pub fn supersede(&mut self, stream: Stream) {
        if !self.track_order || !stream.is_cacheable() {
            return;
        }
        if let Some(pos) = self.entries.iter().position(|(s, _)| *s == stream) {
            self.entries.truncate(pos);
        }
    }

    /// Records `value` as the latest entry of `stream`. Streams that are not
    /// cacheable are ignored.
    pub fn insert(&mut self, stream: Stream, value: T) {
        if !stream.is_cacheable() {
            return;
        }
        let existing = self.entries.iter().position(|(s, _)| *s == stream);
        match (existing, self.track_order) {
            (Some(pos), true) => {
                self.entries.truncate(pos);
                self.entries.push((stream, value));
            }
            (Some(pos), false) => self.entries[pos].1 = value,
            (None, _) => self.entries.push((stream, value)),
        }
    }

    /// Cached entries, oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (Stream, &T)> {
        self.entries.iter().map(|(s, v)| (*s, v))
    }

    /// The cached streams, oldest first.
    pub fn streams(&self) -> Vec<Stream> {
        self.entries.iter().map(|(s, _)| *s).collect()
    }

    /// Number of cached streams.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Forwards keys between the frames of one sequence.
///
/// Each frame passed to [`FrameMixer::mix`] first loses any keys it
/// inherited earlier and drops the cached streams its arrival invalidates,
/// then receives the own-stream keys of the latest cached frame of every
/// other stream (most recently cached first, so the newest value of a
/// duplicated name wins). Afterwards, if its stream is
/// cacheable, its own keys become the cached entry for that stream.
#[derive(Debug, Clone)]
pub struct FrameMixer {
    cache: CacheOrder<Frame>,
}

impl FrameMixer {
    /// Creates a mixer with an empty cache.
    pub fn new(options: MixerOptions) -> Self {
        Self {
            cache: CacheOrder::new(options.track_order),
        }
    }

    /// Mixes `frame` in place. Returns the number of keys it inherited.
    pub fn mix(&mut self, frame: &mut Frame) -> usize {
        let stream = frame.stream();
        if !stream.mixes() {
            return 0;
        }

        frame.purge();
        self.cache.supersede(stream);
        let mut inherited = 0;
        for (cached, parent) in self.cache.iter().rev() {
            if cached != stream {
                inherited += frame.inherit_from(parent);
            }
        }

        if stream.is_cacheable() {
            let mut own = frame.clone();
            own.purge();
            self.cache.insert(stream, own);
        }
        tracing::debug!(%stream, inherited, cached = ?self.cache.streams(), "mixed frame");
        inherited
    }

    /// Streams currently cached, oldest first.
    pub fn cached_streams(&self) -> Vec<Stream> {
        self.cache.streams()
    }

    /// The cached frame of `stream`, if any.
    pub fn parent(&self, stream: Stream) -> Option<&Frame> {
        self.cache
            .iter()
            .find(|(s, _)| *s == stream)
            .map(|(_, frame)| frame)
    }

    /// Forgets every cached frame.
    pub fn reset(&mut self) {
        self.cache.clear();
    }
}

impl Default for FrameMixer {
    fn default() -> Self {
        Self::new(MixerOptions::default())
    }
}
