//! Chunk assembly for values larger than one packet.
//!
//! A low-level getter answers with `(chunk_offset, chunk_data)`; [`stream_out`]
//! drives it until the whole stream is copied into the caller's buffer.

use tracing::trace;

use crate::device::{Error, Result};

/// Integer width of a chunk offset. `NO_DATA` is the all-bits-set sentinel.
pub trait ChunkOffset: Copy + PartialEq + Into<u64> {
    const NO_DATA: Self;
}

impl ChunkOffset for u8 {
    const NO_DATA: Self = u8::MAX;
}

impl ChunkOffset for u16 {
    const NO_DATA: Self = u16::MAX;
}

impl ChunkOffset for u32 {
    const NO_DATA: Self = u32::MAX;
}

/// One answer of a low-level chunked getter.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk<O, E> {
    pub offset: O,
    pub data: Vec<E>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// `length` elements were written to the front of the buffer.
    Complete { length: usize },
    /// The device has nothing to stream right now.
    NoData,
}

/// Assemble a stream of `stream_length` elements into `out`.
///
/// `next_chunk` performs one low-level transaction. Its errors abort assembly
/// and are returned unchanged.
pub fn stream_out<O, E, F>(stream_length: usize, out: &mut [E], mut next_chunk: F) -> Result<StreamStatus>
where
    O: ChunkOffset,
    E: Copy,
    F: FnMut() -> Result<Chunk<O, E>>,
{
    if out.len() < stream_length {
        return Err(Error::InvalidParameter(format!(
            "buffer holds {} elements, stream has {}",
            out.len(),
            stream_length
        )));
    }

    let mut written = 0usize;
    while written < stream_length {
        let chunk = next_chunk()?;
        if chunk.offset == O::NO_DATA {
            trace!(written, "Stream has no data");
            return Ok(StreamStatus::NoData);
        }

        let offset: u64 = chunk.offset.into();
        if offset != written as u64 || chunk.data.is_empty() {
            return Err(Error::StreamOutOfSync {
                expected: written as u64,
                actual: offset,
            });
        }

        // The last chunk is padded past the end of the stream.
        let take = chunk.data.len().min(stream_length - written);
        out[written..written + take].copy_from_slice(&chunk.data[..take]);
        written += take;
        trace!(offset, take, written, "Stream chunk");
    }

    Ok(StreamStatus::Complete { length: written })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;

    fn chunks_of(values: &[f32], size: usize) -> Vec<Chunk<u16, f32>> {
        values
            .chunks(size)
            .enumerate()
            .map(|(i, c)| {
                let mut data = c.to_vec();
                data.resize(size, 0.0);
                Chunk {
                    offset: (i * size) as u16,
                    data,
                }
            })
            .collect()
    }

    #[test]
    fn test_assembles_padded_stream() {
        let values: Vec<f32> = (0..85).map(|v| v as f32).collect();
        let mut chunks = chunks_of(&values, 15).into_iter();
        let mut out = [0f32; 85];

        let status = stream_out(85, &mut out, || Ok(chunks.next().unwrap())).unwrap();
        assert_eq!(status, StreamStatus::Complete { length: 85 });
        assert_eq!(out.to_vec(), values);
    }

    #[test]
    fn test_sentinel_terminates() {
        let mut calls = 0;
        let mut out = [0f32; 85];
        let status = stream_out(85, &mut out, || {
            calls += 1;
            Ok(Chunk::<u16, f32> {
                offset: u16::MAX,
                data: vec![0.0; 15],
            })
        })
        .unwrap();
        assert_eq!(status, StreamStatus::NoData);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_out_of_sync() {
        let mut out = [0u8; 10];
        let mut offsets = vec![0u8, 8].into_iter();
        let err = stream_out(10, &mut out, || {
            Ok(Chunk {
                offset: offsets.next().unwrap(),
                data: vec![1u8; 4],
            })
        })
        .unwrap_err();
        assert_eq!(
            err,
            Error::StreamOutOfSync {
                expected: 4,
                actual: 8
            }
        );
    }

    #[test]
    fn test_error_propagates() {
        let mut out = [0u8; 10];
        let err = stream_out::<u8, u8, _>(10, &mut out, || {
            Err(Error::Transport(TransportError::Disconnected))
        })
        .unwrap_err();
        assert_eq!(err, Error::Transport(TransportError::Disconnected));
    }

    #[test]
    fn test_buffer_too_small() {
        let mut out = [0u8; 4];
        let result = stream_out::<u8, u8, _>(10, &mut out, || unreachable!());
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }
}
