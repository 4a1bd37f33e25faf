//! Byte-oriented run-length coding
//!
//! Each run starts with a control byte. When the top bit is set the next
//! byte is repeated `(control & 0x7F) + 1` times; otherwise the next
//! `(control & 0x7F) + 1` bytes are copied verbatim. Runs are clamped to the
//! remaining output space, so a lying control byte cannot overflow the
//! destination.

use crate::error::{CodecError, CodecResult};

/// Longest run a single control byte can describe
pub const MAX_RUN: usize = 128;

/// Longest encoded form of `len` bytes.
///
/// A run never costs more than two input bytes per output byte, whichever
/// encoder produced it.
pub const fn max_encoded_len(len: usize) -> usize {
    len.saturating_mul(2)
}

/// Decode at most `capacity` bytes.
///
/// Decoding stops early when the input is exhausted at a run boundary.
///
/// # Errors
///
/// Returns `CodecError::Truncated` when a control byte announces more bytes
/// than the input holds.
pub fn decode(input: &[u8], capacity: usize) -> CodecResult<Vec<u8>> {
    let mut out = Vec::with_capacity(capacity.min(input.len().saturating_mul(MAX_RUN / 2)));
    let mut pos = 0usize;

    while out.len() < capacity && pos < input.len() {
        let control = input[pos];
        pos += 1;
        let run = usize::from(control & 0x7F) + 1;
        let count = run.min(capacity - out.len());

        if control & 0x80 != 0 {
            let Some(&value) = input.get(pos) else {
                return Err(CodecError::Truncated {
                    needed: pos + 1,
                    available: input.len(),
                });
            };
            pos += 1;
            out.resize(out.len() + count, value);
        } else {
            let end = pos + count;
            let Some(literal) = input.get(pos..end) else {
                return Err(CodecError::Truncated {
                    needed: end,
                    available: input.len(),
                });
            };
            out.extend_from_slice(literal);
            pos += run;
        }
    }

    Ok(out)
}

/// Encode `data`, preferring repeat runs for two or more equal bytes.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / MAX_RUN + 1);
    let mut pos = 0usize;

    while pos < data.len() {
        let run = repeat_len(data, pos);
        if run >= 2 {
            out.push(0x80 | (run - 1) as u8);
            out.push(data[pos]);
            pos += run;
            continue;
        }

        let start = pos;
        while pos < data.len() && pos - start < MAX_RUN && repeat_len(data, pos) < 2 {
            pos += 1;
        }
        out.push((pos - start - 1) as u8);
        out.extend_from_slice(&data[start..pos]);
    }

    out
}

fn repeat_len(data: &[u8], pos: usize) -> usize {
    let value = data[pos];
    data[pos..]
        .iter()
        .take(MAX_RUN)
        .take_while(|&&b| b == value)
        .count()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn decodes_repeat_and_literal_runs() {
        let input = [0x83, 0xAA, 0x01, 0x10, 0x20];
        assert_eq!(decode(&input, 64).unwrap(), [0xAA, 0xAA, 0xAA, 0xAA, 0x10, 0x20]);
    }

    #[test]
    fn clamps_to_capacity() {
        let input = [0xFF, 0x00];
        assert_eq!(decode(&input, 10).unwrap().len(), 10);
        let input = [0x7F];
        let mut literal = input.to_vec();
        literal.extend(0..128u8);
        assert_eq!(decode(&literal, 3).unwrap(), [0, 1, 2]);
    }

    #[test]
    fn truncated_literal_is_an_error() {
        assert!(decode(&[0x05, 1, 2], 32).is_err());
        assert!(decode(&[0x85], 32).is_err());
    }

    #[test]
    fn maximum_runs_round_trip() {
        let mut data = vec![7u8; MAX_RUN];
        data.extend((0..MAX_RUN).map(|i| i as u8));
        data.push(9);
        let packed = encode(&data);
        assert_eq!(packed[0], 0xFF);
        assert_eq!(decode(&packed, data.len()).unwrap(), data);
    }

    #[test]
    fn declared_capacity_is_not_reserved_up_front() {
        assert_eq!(decode(&[0x81, 0x33, 0x00, 0x44], usize::MAX).unwrap(), [0x33, 0x33, 0x44]);
    }

    #[test]
    fn encoded_length_stays_within_bound() {
        for data in [&[1u8, 2, 2, 3, 4, 4][..], &[5], &[6, 6], &[]] {
            assert!(encode(data).len() <= max_encoded_len(data.len()));
        }
    }

    #[test]
    fn single_byte_runs_round_trip() {
        let data = [1u8, 2, 1, 2, 1];
        assert_eq!(decode(&encode(&data), data.len()).unwrap(), data);
    }

    proptest! {
        #[test]
        fn rle_round_trip(data in prop::collection::vec(prop_oneof![Just(0u8), Just(0xFFu8), any::<u8>()], 0..2048)) {
            let decoded = decode(&encode(&data), data.len()).map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(decoded, data);
        }
    }
}
