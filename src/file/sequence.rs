use super::FrameIndex;
use crate::archive::TypeRegistry;
use crate::compression::{decompress_all, Compression};
use crate::config::{ReaderOptions, SequenceOptions};
use crate::error::{FrameError, Result};
use crate::frame::Frame;
use lru::LruCache;
use memmap2::Mmap;
use parking_lot::Mutex;
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

enum Data {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

/// A whole frame file held in memory (mapped when uncompressed) and
/// indexed for random access.
pub struct FrameFile {
    data: Data,
    index: FrameIndex,
    compression: Compression,
    file_size: u64,
}

impl FrameFile {
    /// Opens and indexes a frame file.
    ///
    /// Plain files are memory-mapped; compressed files are decompressed
    /// into memory once.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        if file_size == 0 {
            return Self::build(Data::Owned(Vec::new()), Compression::None, file_size);
        }

        // Safety: the mapping is read-only; another process truncating the
        // file underneath it is outside what this type can defend against.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };

        let compression = Compression::detect(&mmap);
        let data = match compression {
            Compression::None => Data::Mapped(mmap),
            Compression::Lz4 => Data::Owned(decompress_all(&mmap)?.into_owned()),
        };
        Self::build(data, compression, file_size)
    }

    /// Indexes a file image already in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let file_size = bytes.len() as u64;
        let compression = Compression::detect(&bytes);
        let data = match compression {
            Compression::None => Data::Owned(bytes),
            Compression::Lz4 => Data::Owned(decompress_all(&bytes)?.into_owned()),
        };
        Self::build(data, compression, file_size)
    }

    fn build(data: Data, compression: Compression, file_size: u64) -> Result<Self> {
        let bytes = match &data {
            Data::Mapped(m) => &m[..],
            Data::Owned(v) => &v[..],
        };
        let index = FrameIndex::from_bytes(bytes)?;
        tracing::debug!(
            frames = index.len(),
            file_size,
            compression = compression.name(),
            "opened frame file"
        );
        Ok(Self {
            data,
            index,
            compression,
            file_size,
        })
    }

    /// The uncompressed record stream.
    pub fn bytes(&self) -> &[u8] {
        match &self.data {
            Data::Mapped(m) => m,
            Data::Owned(v) => v,
        }
    }

    /// The frame index.
    pub fn index(&self) -> &FrameIndex {
        &self.index
    }

    /// Number of complete frames.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True if the file holds no complete frame.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// The filter found on the file.
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Size of the file on disk.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// The bytes of the record at `position`.
    ///
    /// One past the last complete frame, a file that ends inside a record
    /// yields the partial record so that decoding it reports the
    /// truncation.
    pub fn record(&self, position: usize) -> Result<&[u8]> {
        if let Some(entry) = self.index.get(position) {
            return Ok(&self.bytes()[entry.range()]);
        }
        match self.index.truncated_at() {
            Some(offset) if position == self.index.len() => Ok(&self.bytes()[offset as usize..]),
            _ => Err(FrameError::OutOfRange {
                position,
                available: self.index.len(),
            }),
        }
    }

    /// Parses the frame at `position` as stored, without mixing.
    pub fn frame(
        &self,
        position: usize,
        registry: Arc<TypeRegistry>,
        options: &ReaderOptions,
    ) -> Result<Frame> {
        let bytes = self.record(position)?;
        let (frame, _) = Frame::from_bytes(bytes, registry, options)
            .map_err(|e| e.in_context(format!("frame {position}")))?;
        Ok(frame)
    }
}

/// Random access to the mixed frames of a file.
///
/// `frame(n)` returns frame `n` with every key it would have inherited had
/// the file been read in order through a
/// [`FrameMixer`](crate::frame::FrameMixer). Parent frames are shared
/// between their children, so a geometry object is decoded once no matter
/// how many physics frames read it.
///
/// Mixed frames are kept in an LRU cache. An entry is never evicted while
/// a caller still holds it; the cache grows past its capacity instead.
pub struct FrameSequence {
    file: FrameFile,
    registry: Arc<TypeRegistry>,
    options: SequenceOptions,
    parents: Vec<Vec<usize>>,
    mixed: Mutex<LruCache<usize, Arc<Frame>>>,
    raw: Mutex<LruCache<usize, Arc<Frame>>>,
}

impl FrameSequence {
    /// Opens a file for random access.
    pub fn open<P: AsRef<Path>>(
        path: P,
        registry: Arc<TypeRegistry>,
        options: SequenceOptions,
    ) -> Result<Self> {
        Ok(Self::new(FrameFile::open(path)?, registry, options))
    }

    /// Wraps an opened file.
    pub fn new(file: FrameFile, registry: Arc<TypeRegistry>, options: SequenceOptions) -> Self {
        if !options.reader.verify_checksums {
            tracing::warn!("frame checksum verification disabled");
        }
        let parents = file.index().parents_table(options.mixing.track_order);
        Self {
            file,
            registry,
            options,
            parents,
            mixed: Mutex::new(LruCache::unbounded()),
            raw: Mutex::new(LruCache::unbounded()),
        }
    }

    /// The underlying file.
    pub fn file(&self) -> &FrameFile {
        &self.file
    }

    /// Number of complete frames.
    pub fn len(&self) -> usize {
        self.file.len()
    }

    /// True if the file holds no complete frame.
    pub fn is_empty(&self) -> bool {
        self.file.is_empty()
    }

    /// Positions of the frames that frame `position` inherits from, most
    /// recently cached first.
    pub fn parents(&self, position: usize) -> &[usize] {
        self.parents.get(position).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of mixed frames currently cached.
    pub fn cached(&self) -> usize {
        self.mixed.lock().len()
    }

    /// The mixed frame at `position`.
    pub fn frame(&self, position: usize) -> Result<Arc<Frame>> {
        let hit = self.mixed.lock().get(&position).cloned();
        if let Some(frame) = hit {
            return Ok(frame);
        }

        let own = self.raw_frame(position)?;
        let mut frame = Frame::clone(&own);
        let mut inherited = 0;
        for &parent in self.parents(position) {
            inherited += frame.inherit_from(&*self.raw_frame(parent)?);
        }
        tracing::debug!(position, inherited, "materialized mixed frame");

        let frame = Arc::new(frame);
        self.admit_mixed(position, Arc::clone(&frame));
        Ok(frame)
    }

    /// Every frame in order.
    pub fn iter(&self) -> impl Iterator<Item = Result<Arc<Frame>>> + '_ {
        (0..self.len()).map(move |position| self.frame(position))
    }

    fn raw_frame(&self, position: usize) -> Result<Arc<Frame>> {
        let hit = self.raw.lock().get(&position).cloned();
        if let Some(frame) = hit {
            return Ok(frame);
        }
        let frame = self
            .file
            .frame(position, Arc::clone(&self.registry), &self.options.reader)?;
        let frame = Arc::new(frame);
        let mut raw = self.raw.lock();
        raw.put(position, Arc::clone(&frame));
        evict(&mut raw, self.options.cache_capacity.get(), "raw");
        Ok(frame)
    }

    fn admit_mixed(&self, position: usize, frame: Arc<Frame>) {
        let mut mixed = self.mixed.lock();
        mixed.put(position, frame);
        evict(&mut mixed, self.options.cache_capacity.get(), "mixed");
    }
}

/// Shrinks `cache` to `capacity`, least recently used first, skipping
/// entries someone outside the cache still holds.
fn evict(cache: &mut LruCache<usize, Arc<Frame>>, capacity: usize, which: &str) {
    while cache.len() > capacity {
        let victim = cache
            .iter()
            .rev()
            .find(|(_, frame)| Arc::strong_count(frame) == 1)
            .map(|(position, _)| *position);
        match victim {
            Some(position) => {
                cache.pop(&position);
            }
            None => {
                tracing::warn!(
                    cache = which,
                    len = cache.len(),
                    capacity,
                    "every cached frame is in use"
                );
                break;
            }
        }
    }
}

impl fmt::Debug for FrameFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mapped = matches!(self.data, Data::Mapped(_));
        f.debug_struct("FrameFile")
            .field("mapped", &mapped)
            .field("compression", &self.compression)
            .field("file_size", &self.file_size)
            .field("frames", &self.index.len())
            .finish()
    }
}

impl fmt::Debug for FrameSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSequence")
            .field("frames", &self.len())
            .field("cached", &self.cached())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::FrameWriter;
    use crate::frame::Stream;
    use crate::payload::{I32Value, StringValue};
    use std::num::NonZeroUsize;

    fn registry() -> Arc<TypeRegistry> {
        Arc::new(TypeRegistry::standard().unwrap())
    }

    fn sample(registry: &Arc<TypeRegistry>) -> Vec<u8> {
        let mut writer = FrameWriter::builder().build(Vec::new()).unwrap();
        let mut geo = Frame::new(Stream::Geometry, Arc::clone(registry));
        geo.put("geometry", StringValue("detector".into())).unwrap();
        writer.write(&geo).unwrap();
        for i in 0..4 {
            let mut physics = Frame::new(Stream::Physics, Arc::clone(registry));
            physics.put("event", I32Value(i)).unwrap();
            writer.write(&physics).unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn parents_are_shared_between_frames() {
        let reg = registry();
        let file = FrameFile::from_bytes(sample(&reg)).unwrap();
        assert_eq!(file.compression(), Compression::None);
        let seq = FrameSequence::new(file, reg, SequenceOptions::default());
        assert_eq!(seq.len(), 5);
        assert_eq!(seq.parents(3), [0]);

        let a = seq.frame(1).unwrap();
        let b = seq.frame(4).unwrap();
        assert_eq!(b.get::<I32Value>("event").unwrap().unwrap().0, 3);
        let ga = a.get::<StringValue>("geometry").unwrap().unwrap();
        let gb = b.get::<StringValue>("geometry").unwrap().unwrap();
        assert!(Arc::ptr_eq(&ga, &gb));
        assert!(Arc::ptr_eq(&a, &seq.frame(1).unwrap()));
    }

    #[test]
    fn held_frames_are_not_evicted() {
        let reg = registry();
        let options = SequenceOptions::builder()
            .cache_capacity(NonZeroUsize::new(1).unwrap())
            .build();
        let seq = FrameSequence::new(FrameFile::from_bytes(sample(&reg)).unwrap(), reg, options);

        let held = seq.frame(1).unwrap();
        seq.frame(2).unwrap();
        assert_eq!(seq.cached(), 2);
        assert!(Arc::ptr_eq(&held, &seq.frame(1).unwrap()));

        drop(held);
        seq.frame(3).unwrap();
        assert_eq!(seq.cached(), 1);
    }

    #[test]
    fn out_of_range_position() {
        let reg = registry();
        let file = FrameFile::from_bytes(sample(&reg)).unwrap();
        let seq = FrameSequence::new(file, reg, SequenceOptions::default());
        assert!(matches!(
            seq.frame(9),
            Err(FrameError::OutOfRange { position: 9, available: 5 })
        ));
    }
}
