//! Worker Channel Frames
//!
//! Every message between the tracker and a sample worker travels as one
//! rkyv archive preceded by its length:
//!
//! ```text
//! | len: u32 LE | archive (len bytes) |
//! ```
//!
//! A worker exchanges only a handful of frames in its life (hello, one
//! command, one result), so each frame is flushed as soon as it is written.

use rkyv::ser::serializers::AllocSerializer;
use rkyv::validation::validators::DefaultValidator;
use rkyv::{AlignedVec, Archive, CheckBytes, Deserialize, Infallible, Serialize};
use std::io::{self, BufReader, BufWriter, Read, Write};
use thiserror::Error;

/// Largest accepted archive. Leaves room for a sample that records about
/// a million values.
pub const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

const HEADER_LEN: usize = 4;
const SCRATCH_LEN: usize = 1024;
const BUFFER_LEN: usize = 16 * 1024;

/// Errors on the worker channel
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("worker channel I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("cannot encode message: {0}")]
    Encode(String),

    #[error("message failed validation: {0}")]
    Decode(String),

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    Oversized { len: usize, max: usize },

    #[error("empty frame")]
    Empty,

    #[error("peer closed the channel")]
    EndOfStream,
}

fn check_len(len: usize) -> Result<usize, FrameError> {
    match len {
        0 => Err(FrameError::Empty),
        len if len > MAX_FRAME_LEN => Err(FrameError::Oversized {
            len,
            max: MAX_FRAME_LEN,
        }),
        len => Ok(len),
    }
}

/// Header and archive of `message`, ready to write
fn encode<T>(message: &T) -> Result<Vec<u8>, FrameError>
where
    T: Serialize<AllocSerializer<SCRATCH_LEN>>,
{
    let archive = rkyv::to_bytes::<_, SCRATCH_LEN>(message)
        .map_err(|e| FrameError::Encode(e.to_string()))?;
    let len = check_len(archive.len())?;

    let mut frame = Vec::with_capacity(HEADER_LEN + len);
    frame.extend_from_slice(&(len as u32).to_le_bytes());
    frame.extend_from_slice(&archive);
    Ok(frame)
}

/// Validate `archive` in place and rebuild the owned message
fn decode<T>(archive: &AlignedVec) -> Result<T, FrameError>
where
    T: Archive,
    T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
{
    let archived =
        rkyv::check_archived_root::<T>(archive).map_err(|e| FrameError::Decode(e.to_string()))?;
    archived
        .deserialize(&mut Infallible)
        .map_err(|_| FrameError::Decode("archived value rejected".to_string()))
}

/// Sending half of a worker channel
pub struct FrameWriter<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> FrameWriter<W> {
    /// Wrap a raw writer
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(BUFFER_LEN, writer),
        }
    }

    /// Send one message; the peer sees it when this returns
    pub fn write<T>(&mut self, message: &T) -> Result<(), FrameError>
    where
        T: Serialize<AllocSerializer<SCRATCH_LEN>>,
    {
        let frame = encode(message)?;
        self.writer.write_all(&frame)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Receiving half of a worker channel
pub struct FrameReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> FrameReader<R> {
    /// Wrap a raw reader
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::with_capacity(BUFFER_LEN, reader),
        }
    }

    /// Block until the next message arrives.
    ///
    /// The peer closing the channel before a header is
    /// [`FrameError::EndOfStream`]; closing it mid-archive is an I/O error.
    pub fn read<T>(&mut self) -> Result<T, FrameError>
    where
        T: Archive,
        T::Archived: for<'a> CheckBytes<DefaultValidator<'a>> + Deserialize<T, Infallible>,
    {
        let mut header = [0u8; HEADER_LEN];
        if let Err(e) = self.reader.read_exact(&mut header) {
            return Err(match e.kind() {
                io::ErrorKind::UnexpectedEof => FrameError::EndOfStream,
                _ => e.into(),
            });
        }
        let len = check_len(u32::from_le_bytes(header) as usize)?;

        let mut archive = AlignedVec::with_capacity(len);
        archive.resize(len, 0);
        self.reader.read_exact(&mut archive)?;
        decode(&archive)
    }

    /// Whether bytes of a (possibly partial) frame are already buffered.
    ///
    /// Polling the underlying descriptor does not see these bytes.
    pub fn has_buffered_data(&self) -> bool {
        !self.reader.buffer().is_empty()
    }
}
