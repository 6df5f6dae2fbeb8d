//! Incremental decoding of a byte stream into envelopes.
//!
//! Serial reads return arbitrary slices of the stream: part of an envelope,
//! several envelopes back to back, or garbage from line noise. The decoder
//! yields every complete envelope, keeps a truncated tail for the next read,
//! and skips bytes that can never decode.

use bytes::{Buf, BytesMut};

use crate::msgpack::{self, ReadError};
use crate::{Envelope, FramingError};

/// Default upper bound on a single envelope's encoded size.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024;

/// Result of scanning a buffer with [`decode_stream`].
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDecode<'a> {
    /// Fully decoded envelopes in arrival order.
    pub envelopes: Vec<Envelope>,
    /// Discarded units, one entry per corrupt run.
    pub errors: Vec<FramingError>,
    /// Undecoded trailing bytes to keep for the next read.
    pub remaining: &'a [u8],
}

/// Scan `buffer` for complete envelopes.
///
/// - Bytes that do not start an envelope, either because they are not valid
///   MessagePack or because the value they start is not an envelope, are
///   dropped one at a time until an envelope decodes again. A consecutive
///   run is reported once.
/// - A truncated tail is always kept in `remaining`, however long.
pub fn decode_stream(buffer: &[u8]) -> StreamDecode<'_> {
    scan(buffer, None)
}

fn scan(buffer: &[u8], max_frame_len: Option<usize>) -> StreamDecode<'_> {
    let mut envelopes = Vec::new();
    let mut errors = Vec::new();
    let mut offset = 0;
    let mut resyncing = false;

    while offset < buffer.len() {
        let rest = &buffer[offset..];
        let skip = match msgpack::read_value(rest) {
            Ok((value, used)) => match Envelope::from_value(value) {
                Ok(envelope) => {
                    envelopes.push(envelope);
                    offset += used;
                    resyncing = false;
                    continue;
                }
                // A stray header byte can swallow real envelopes as its
                // elements, so only the first byte is known to be bad.
                Err(e) => e,
            },
            Err(ReadError::Incomplete) => match max_frame_len {
                Some(max) if rest.len() >= max => FramingError::Oversized {
                    max,
                    buffered: rest.len(),
                },
                _ => break,
            },
            Err(ReadError::Invalid(e)) => e,
        };

        if !resyncing {
            errors.push(skip);
            resyncing = true;
        }
        offset += 1;
    }

    StreamDecode {
        envelopes,
        errors,
        remaining: &buffer[offset..],
    }
}

/// Accumulating stream decoder.
///
/// Bytes are pushed as they arrive; [`drain`](Self::drain) returns whatever
/// complete envelopes are available and keeps the remainder buffered.
///
/// Unlike [`decode_stream`], the buffered tail is bounded: once a partial
/// unit reaches `max_frame_len` bytes its first byte is dropped
/// ([`FramingError::Oversized`]), so a corrupt length header cannot hold the
/// stream forever.
#[derive(Debug)]
pub struct StreamDecoder {
    buffer: BytesMut,
    max_frame_len: usize,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder {
    /// Create a decoder with [`DEFAULT_MAX_FRAME_LEN`].
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    /// Create a decoder with a custom frame length limit.
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        StreamDecoder {
            buffer: BytesMut::with_capacity(1024),
            max_frame_len: max_frame_len.max(1),
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Decode all complete envelopes currently buffered.
    pub fn drain(&mut self) -> (Vec<Envelope>, Vec<FramingError>) {
        let StreamDecode {
            envelopes,
            errors,
            remaining,
        } = scan(&self.buffer, Some(self.max_frame_len));
        let consumed = self.buffer.len() - remaining.len();
        self.buffer.advance(consumed);
        (envelopes, errors)
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Length at which a buffered partial unit is treated as garbage.
    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{encode, Value};

    fn sample() -> Vec<Envelope> {
        vec![
            Envelope::response(0, 22),
            Envelope::notify("tick", vec![Value::from(1)]),
            Envelope::error_response(1, "wrong arity"),
        ]
    }

    fn concat(envelopes: &[Envelope]) -> Vec<u8> {
        envelopes.iter().flat_map(|e| encode(e).unwrap()).collect()
    }

    #[test]
    fn test_empty_buffer() {
        let decoded = decode_stream(&[]);
        assert!(decoded.envelopes.is_empty());
        assert!(decoded.errors.is_empty());
        assert!(decoded.remaining.is_empty());
    }

    #[test]
    fn test_single_partial_envelope() {
        let bytes = encode(&Envelope::request(1, "add", vec![Value::from(15)])).unwrap();
        let partial = &bytes[..bytes.len() - 1];
        let decoded = decode_stream(partial);
        assert!(decoded.envelopes.is_empty());
        assert!(decoded.errors.is_empty());
        assert_eq!(decoded.remaining, partial);
    }

    #[test]
    fn test_multiple_with_partial_tail() {
        let envelopes = sample();
        let mut bytes = concat(&envelopes);
        let tail = encode(&Envelope::response(9, "later")).unwrap();
        bytes.extend_from_slice(&tail[..2]);

        let decoded = decode_stream(&bytes);
        assert_eq!(decoded.envelopes, envelopes);
        assert_eq!(decoded.remaining, &tail[..2]);
    }

    #[test]
    fn test_skips_non_envelope_value() {
        let mut bytes = vec![0x2a]; // the integer 42
        bytes.extend(encode(&Envelope::response(3, true)).unwrap());

        let decoded = decode_stream(&bytes);
        assert_eq!(decoded.envelopes, vec![Envelope::response(3, true)]);
        assert_eq!(decoded.errors.len(), 1);
        assert!(matches!(decoded.errors[0], FramingError::NotAnEnvelope(_)));
    }

    #[test]
    fn test_resyncs_after_garbage_run() {
        let mut bytes = vec![0xc1, 0xc1, 0xc1];
        bytes.extend(encode(&Envelope::response(4, 1)).unwrap());

        let decoded = decode_stream(&bytes);
        assert_eq!(decoded.envelopes, vec![Envelope::response(4, 1)]);
        assert_eq!(decoded.errors, vec![FramingError::InvalidMarker(0xc1)]);
        assert!(decoded.remaining.is_empty());
    }

    #[test]
    fn test_stray_array_header_does_not_swallow_envelopes() {
        // 0x92 reads the next two envelopes as its elements
        let expected = vec![
            Envelope::response(5, 22),
            Envelope::notify("tick", Vec::new()),
        ];
        let mut bytes = vec![0x92];
        bytes.extend(concat(&expected));

        let decoded = decode_stream(&bytes);
        assert_eq!(decoded.envelopes, expected);
        assert_eq!(decoded.errors.len(), 1);
        assert!(matches!(decoded.errors[0], FramingError::NotAnEnvelope(_)));
        assert!(decoded.remaining.is_empty());
    }

    #[test]
    fn test_large_partial_tail_is_kept() {
        let envelope = Envelope::response(7, "x".repeat(20_000));
        let bytes = encode(&envelope).unwrap();
        assert!(bytes.len() > DEFAULT_MAX_FRAME_LEN);

        let decoded = decode_stream(&bytes[..17_000]);
        assert!(decoded.envelopes.is_empty());
        assert!(decoded.errors.is_empty());
        assert_eq!(decoded.remaining, &bytes[..17_000]);

        let mut rejoined = decoded.remaining.to_vec();
        rejoined.extend_from_slice(&bytes[17_000..]);
        assert_eq!(decode_stream(&rejoined).envelopes, vec![envelope]);
    }

    #[test]
    fn test_decoder_drops_oversized_partial() {
        // str32 header promising far more than the limit
        let mut bytes = vec![0xdb, 0x00, 0x01, 0x00, 0x00];
        bytes.extend(std::iter::repeat(b'a').take(64));

        let mut decoder = StreamDecoder::with_max_frame_len(32);
        assert_eq!(decoder.max_frame_len(), 32);
        decoder.push(&bytes);
        let (envelopes, errors) = decoder.drain();
        assert!(envelopes.is_empty());
        assert!(matches!(
            errors.first(),
            Some(FramingError::Oversized { max: 32, .. })
        ));
        assert!(decoder.buffered_len() < decoder.max_frame_len());
    }

    #[test]
    fn test_decoder_recovers_after_oversized_partial() {
        let mut decoder = StreamDecoder::with_max_frame_len(32);
        decoder.push(&[0xdb, 0x00, 0x01, 0x00, 0x00]);
        decoder.push(&[0xc1; 40]);
        decoder.push(&encode(&Envelope::response(2, 9)).unwrap());

        let (envelopes, errors) = decoder.drain();
        assert_eq!(envelopes, vec![Envelope::response(2, 9)]);
        assert!(!errors.is_empty());
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_decoder_carries_remainder() {
        let envelopes = sample();
        let bytes = concat(&envelopes);
        let mut decoder = StreamDecoder::new();

        let mut seen = Vec::new();
        for chunk in bytes.chunks(3) {
            decoder.push(chunk);
            let (decoded, errors) = decoder.drain();
            assert!(errors.is_empty());
            seen.extend(decoded);
        }

        assert_eq!(seen, envelopes);
        assert_eq!(decoder.buffered_len(), 0);
    }

    #[test]
    fn test_decoder_clear() {
        let mut decoder = StreamDecoder::new();
        decoder.push(&[0x94, 0x01]);
        assert_eq!(decoder.drain().0.len(), 0);
        assert_eq!(decoder.buffered_len(), 2);
        decoder.clear();
        assert_eq!(decoder.buffered_len(), 0);
    }
}
