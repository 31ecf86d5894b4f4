//! Streaming pack writer.
//!
//! Unlike [`write::PackWriter`](crate::write::PackWriter), which buffers the
//! whole pack on disk and rereads it to compute the trailing checksum, this
//! writer emits bytes incrementally and accumulates the SHA-1 trailer as it
//! goes. The object count is fixed at construction (the caller must know it
//! in advance, matching the pack header's own layout) so the header can be
//! emitted once, up front, instead of being patched in afterward.
//!
//! State machine: `Idle -> HeaderEmitted -> Writing(entry) -> EntryDone ...
//! -> Finalized`. Adding an entry after `finalize()` is a programmer error.

use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::Write;

use git_hash::hasher::Hasher;
use git_hash::{HashAlgorithm, ObjectId};

use crate::entry::{encode_entry_header, encode_ofs_delta_offset};
use crate::{PackError, PACK_HEADER_SIZE, PACK_SIGNATURE, PACK_VERSION};

/// One completed entry, as needed by a companion index writer.
#[derive(Debug, Clone, Copy)]
pub struct StreamedEntry {
    pub id: ObjectId,
    pub offset: u64,
    pub crc32: u32,
}

#[derive(Debug, PartialEq, Eq)]
enum State {
    Idle,
    HeaderEmitted,
    Finalized,
}

/// Incrementally writes a pack to any [`Write`] sink.
///
/// Single-use: once [`finalize`](Self::finalize) runs, the writer is
/// consumed and further writes are impossible by construction.
pub struct StreamingPackWriter<W: Write> {
    sink: W,
    state: State,
    hash_algo: HashAlgorithm,
    object_count: u32,
    objects_written: u32,
    position: u64,
    checksum: Hasher,
    entries: Vec<StreamedEntry>,
}

impl<W: Write> StreamingPackWriter<W> {
    /// Create a writer that will emit exactly `object_count` entries.
    pub fn new(sink: W, object_count: u32, hash_algo: HashAlgorithm) -> Self {
        Self {
            sink,
            state: State::Idle,
            hash_algo,
            object_count,
            objects_written: 0,
            position: 0,
            checksum: Hasher::new(hash_algo),
            entries: Vec::with_capacity(object_count as usize),
        }
    }

    fn ensure_header(&mut self) -> Result<(), PackError> {
        if self.state == State::Idle {
            let mut header = [0u8; PACK_HEADER_SIZE];
            header[0..4].copy_from_slice(PACK_SIGNATURE);
            header[4..8].copy_from_slice(&PACK_VERSION.to_be_bytes());
            header[8..12].copy_from_slice(&self.object_count.to_be_bytes());
            self.emit(&header)?;
            self.state = State::HeaderEmitted;
        }
        Ok(())
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<(), PackError> {
        self.sink.write_all(bytes)?;
        self.checksum.update(bytes);
        self.position += bytes.len() as u64;
        Ok(())
    }

    /// Write a whole (non-delta) object.
    pub fn write_object(
        &mut self,
        id: ObjectId,
        type_num: u8,
        data: &[u8],
    ) -> Result<(), PackError> {
        self.begin_entry()?;
        let offset = self.position;
        let header = encode_entry_header(type_num, data.len() as u64);
        let compressed = zlib_compress(data)?;

        let mut crc = crc32fast::Hasher::new();
        crc.update(&header);
        crc.update(&compressed);

        self.emit(&header)?;
        self.emit(&compressed)?;

        self.finish_entry(id, offset, crc.finalize())
    }

    /// Write an OFS_DELTA entry. `base_offset` is the absolute offset (from
    /// the start of the pack) of the already-written base entry.
    pub fn write_ofs_delta(
        &mut self,
        id: ObjectId,
        base_offset: u64,
        delta_data: &[u8],
    ) -> Result<(), PackError> {
        self.begin_entry()?;
        let offset = self.position;
        if base_offset >= offset {
            return Err(PackError::CorruptEntry(offset));
        }
        let header = encode_entry_header(6, delta_data.len() as u64);
        let ofs_bytes = encode_ofs_delta_offset(offset - base_offset);
        let compressed = zlib_compress(delta_data)?;

        let mut crc = crc32fast::Hasher::new();
        crc.update(&header);
        crc.update(&ofs_bytes);
        crc.update(&compressed);

        self.emit(&header)?;
        self.emit(&ofs_bytes)?;
        self.emit(&compressed)?;

        self.finish_entry(id, offset, crc.finalize())
    }

    /// Write a REF_DELTA entry referencing a base by object id.
    pub fn write_ref_delta(
        &mut self,
        id: ObjectId,
        base_id: &ObjectId,
        delta_data: &[u8],
    ) -> Result<(), PackError> {
        self.begin_entry()?;
        let offset = self.position;
        let header = encode_entry_header(7, delta_data.len() as u64);
        let compressed = zlib_compress(delta_data)?;

        let mut crc = crc32fast::Hasher::new();
        crc.update(&header);
        crc.update(base_id.as_bytes());
        crc.update(&compressed);

        self.emit(&header)?;
        self.emit(base_id.as_bytes())?;
        self.emit(&compressed)?;

        self.finish_entry(id, offset, crc.finalize())
    }

    fn begin_entry(&mut self) -> Result<(), PackError> {
        if self.state == State::Finalized {
            panic!("StreamingPackWriter: write attempted after finalize()");
        }
        if self.objects_written >= self.object_count {
            panic!(
                "StreamingPackWriter: attempted to write more than the declared {} objects",
                self.object_count
            );
        }
        self.ensure_header()
    }

    fn finish_entry(&mut self, id: ObjectId, offset: u64, crc32: u32) -> Result<(), PackError> {
        self.entries.push(StreamedEntry { id, offset, crc32 });
        self.objects_written += 1;
        Ok(())
    }

    /// Emit the trailing checksum and consume the writer.
    ///
    /// Asserts that exactly the declared object count was written. Returns
    /// the pack checksum and the per-entry list for a companion index writer.
    pub fn finalize(mut self) -> Result<(ObjectId, Vec<StreamedEntry>), PackError> {
        if self.objects_written != self.object_count {
            return Err(PackError::InvalidHeader(format!(
                "expected {} objects, wrote {}",
                self.object_count, self.objects_written
            )));
        }
        // An empty pack still gets a header.
        self.ensure_header()?;

        let checksum = self.checksum.finalize().map_err(PackError::Hash)?;
        self.sink.write_all(checksum.as_bytes())?;
        self.sink.flush()?;
        self.state = State::Finalized;

        Ok((checksum, self.entries))
    }
}

fn zlib_compress(data: &[u8]) -> Result<Vec<u8>, PackError> {
    let mut compressed = Vec::new();
    let mut encoder = ZlibEncoder::new(&mut compressed, Compression::default());
    encoder.write_all(data)?;
    encoder.finish()?;
    Ok(compressed)
}
