//! Envelope codec: the per-value metadata header stored inside a
//! bucket record's value slot, and the big-value fragmentation protocol
//! built on top of it.
//!
//! Byte layout of an envelope: 1 byte `position` (1-based fragment
//! index), 1 byte `fragment_count` (1 for small values), 8 bytes
//! big-endian `deadline_nanos` (0 = no TTL), then the payload.

use crate::core::{CacheError, Result};

/// Fixed size of an envelope header, before the payload bytes.
const HEADER_LEN: usize = 1 + 1 + 8;

/// Bytes of on-chunk record overhead ahead of the key (the 4-byte
/// `keyLen`/`valueLen` header).
const RECORD_HEADER_LEN: usize = 4;

/// Width of the synthetic fragment-index suffix appended to a key.
const FRAGMENT_SUFFIX_LEN: usize = 8;

/// A decoded envelope: position within the fragment sequence, total
/// fragment count, absolute TTL deadline in nanoseconds (0 = none), and
/// a view of the payload bytes.
pub struct DecodedEnvelope<'a> {
    /// 1-based index of this fragment within its value's fragment sequence.
    pub position: u8,
    /// Total number of fragments the value was split into (1 for a small value).
    pub fragment_count: u8,
    /// Absolute TTL deadline in nanoseconds since the Unix epoch (0 = no TTL).
    pub deadline_nanos: u64,
    /// View onto this fragment's payload bytes.
    pub payload: &'a [u8],
}

/// Encode a small (single-fragment) value as a complete envelope.
pub fn encode_small(value: &[u8], deadline_nanos: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + value.len());
    out.push(1); // position
    out.push(1); // fragment_count
    out.extend_from_slice(&deadline_nanos.to_be_bytes());
    out.extend_from_slice(value);
    out
}

/// Decode an envelope's header and return a view onto its payload.
/// Returns `None` if `bytes` is shorter than a header.
pub fn decode_envelope(bytes: &[u8]) -> Option<DecodedEnvelope<'_>> {
    if bytes.len() < HEADER_LEN {
        return None;
    }
    let position = bytes[0];
    let fragment_count = bytes[1];
    let deadline_nanos = u64::from_be_bytes(bytes[2..10].try_into().unwrap());
    Some(DecodedEnvelope { position, fragment_count, deadline_nanos, payload: &bytes[HEADER_LEN..] })
}

/// One element of an `encode_fragments` result: the key to store this
/// fragment under, its complete envelope bytes, and the hash to store
/// it under (computed by the caller's hash function).
#[derive(Debug)]
pub struct Fragment {
    /// Key to store this fragment's envelope under.
    pub sub_key: Vec<u8>,
    /// This fragment's complete encoded envelope bytes.
    pub envelope: Vec<u8>,
}

/// Split `value` into envelopes addressed by synthetic keys derived from
/// `key`, such that every fragment's on-chunk record
/// (`4 + len(sub_key) + len(envelope)`) fits within `chunk_size` bytes.
///
/// Fragment 1 is stored under `key` itself and carries `deadline_nanos`;
/// fragments `2..=n` are stored under `key || i_be` and carry no TTL of
/// their own (only fragment 1's deadline governs expiry).
///
/// Returns a single-element, single-fragment sequence if `value` already
/// fits in one record at `key`.
///
/// Returns `CacheError::TooBigKey` rather than panicking if `value` would
/// need more than 255 fragments (the largest `fragment_count` an envelope
/// header can represent) to encode at this `chunk_size`.
pub fn encode_fragments(key: &[u8], value: &[u8], deadline_nanos: u64, chunk_size: usize) -> Result<Vec<Fragment>> {
    let small = encode_small(value, deadline_nanos);
    if RECORD_HEADER_LEN + key.len() + small.len() < chunk_size {
        return Ok(vec![Fragment { sub_key: key.to_vec(), envelope: small }]);
    }

    // Largest payload per fragment such that the *first* fragment's
    // record (whose key is the unmodified, usually-shorter `key`) still
    // fits in one chunk; every later fragment's record is no larger
    // (its key gains a fixed 8-byte suffix but the bound below already
    // accounts for the longer key so the same payload size is safe for
    // every fragment).
    let overhead = RECORD_HEADER_LEN + key.len() + FRAGMENT_SUFFIX_LEN + HEADER_LEN;
    let max_payload = chunk_size.saturating_sub(overhead + 1);
    debug_assert!(max_payload > 0, "chunk_size too small to hold even one fragment header");

    let fragment_count = value.len().div_ceil(max_payload).max(1);
    if fragment_count > u8::MAX as usize {
        return Err(CacheError::TooBigKey {
            len: RECORD_HEADER_LEN + key.len() + HEADER_LEN + value.len(),
            limit: max_payload * u8::MAX as usize,
        });
    }
    let fragment_count = fragment_count as u8;

    let mut fragments = Vec::with_capacity(fragment_count as usize);
    for i in 0..fragment_count {
        let start = i as usize * max_payload;
        let end = (start + max_payload).min(value.len());
        let chunk = &value[start..end];

        let position = i + 1;
        let mut envelope = Vec::with_capacity(HEADER_LEN + chunk.len());
        envelope.push(position);
        envelope.push(fragment_count);
        let fragment_deadline = if position == 1 { deadline_nanos } else { 0 };
        envelope.extend_from_slice(&fragment_deadline.to_be_bytes());
        envelope.extend_from_slice(chunk);

        let sub_key = if position == 1 {
            key.to_vec()
        } else {
            let mut k = Vec::with_capacity(key.len() + FRAGMENT_SUFFIX_LEN);
            k.extend_from_slice(key);
            k.extend_from_slice(&(position as u64).to_be_bytes());
            k
        };

        fragments.push(Fragment { sub_key, envelope });
    }
    Ok(fragments)
}

/// Build the synthetic key used to address fragment `position` (`>= 2`)
/// of the value originally stored under `key`.
pub fn fragment_key(key: &[u8], position: u8) -> Vec<u8> {
    let mut k = Vec::with_capacity(key.len() + FRAGMENT_SUFFIX_LEN);
    k.extend_from_slice(key);
    k.extend_from_slice(&(position as u64).to_be_bytes());
    k
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_value_round_trips() {
        let env = encode_small(b"hello", 123);
        let decoded = decode_envelope(&env).unwrap();
        assert_eq!(decoded.position, 1);
        assert_eq!(decoded.fragment_count, 1);
        assert_eq!(decoded.deadline_nanos, 123);
        assert_eq!(decoded.payload, b"hello");
    }

    #[test]
    fn small_value_fits_in_one_fragment() {
        let frags = encode_fragments(b"k", b"v", 0, 1024).unwrap();
        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0].sub_key, b"k");
    }

    #[test]
    fn large_value_splits_into_multiple_fragments() {
        let value = vec![0x62u8; 131_072];
        let frags = encode_fragments(b"b", &value, 0, 65_536).unwrap();
        assert!(frags.len() > 1);

        // Every fragment's on-chunk record must fit within one chunk.
        for f in &frags {
            assert!(RECORD_HEADER_LEN + f.sub_key.len() + f.envelope.len() < 65_536);
        }

        let first = decode_envelope(&frags[0].envelope).unwrap();
        assert_eq!(first.position, 1);
        assert_eq!(first.fragment_count as usize, frags.len());
        assert_eq!(frags[0].sub_key, b"b");

        // Reassemble and compare.
        let mut reassembled = Vec::with_capacity(value.len());
        reassembled.extend_from_slice(first.payload);
        for f in &frags[1..] {
            reassembled.extend_from_slice(decode_envelope(&f.envelope).unwrap().payload);
        }
        assert_eq!(reassembled, value);
    }

    #[test]
    fn only_first_fragment_carries_deadline() {
        let value = vec![1u8; 200_000];
        let frags = encode_fragments(b"k", &value, 999, 65_536).unwrap();
        assert_eq!(decode_envelope(&frags[0].envelope).unwrap().deadline_nanos, 999);
        for f in &frags[1..] {
            assert_eq!(decode_envelope(&f.envelope).unwrap().deadline_nanos, 0);
        }
    }

    #[test]
    fn fragment_key_matches_encode_fragments_suffix() {
        let value = vec![1u8; 200_000];
        let frags = encode_fragments(b"k", &value, 0, 65_536).unwrap();
        assert_eq!(frags[1].sub_key, fragment_key(b"k", 2));
    }

    #[test]
    fn value_requiring_more_than_255_fragments_is_rejected() {
        // At chunk_size 128 the usable payload per fragment is a handful
        // of bytes, so a modest value already needs more than 255 of them.
        let value = vec![7u8; 100_000];
        let err = encode_fragments(b"k", &value, 0, 128).unwrap_err();
        assert!(matches!(err, CacheError::TooBigKey { .. }));
    }
}
