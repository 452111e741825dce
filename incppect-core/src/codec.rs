//! Run-length encoded XOR diff between consecutive payloads.
//!
//! Both the per-request payloads and the whole assembled frame are diffed
//! against what the client last received. The payload is walked one 4-byte
//! little-endian word at a time, XOR-ed against the word at the same offset of
//! the previous payload, and runs of equal XOR results are written as
//! `(run_length: u32, xor_word: u32)` pairs.
//!
//! A static region therefore costs 8 bytes no matter how long it is, which is
//! what makes re-sending a mostly unchanged draw list cheap.
//!
//! ## Wire format
//!
//! ```text
//! run_length: u32 (4)  ─┐
//! xor_word:   u32 (4)  ─┘ repeated until the payload is covered
//! ```
//!
//! A trailing partial word (fewer than 4 bytes) counts as one word of the run;
//! only its valid bytes are XOR-ed and restored.

use bytes::{BufMut, BytesMut};

use crate::error::IncppectError;

// ── Constants ────────────────────────────────────────────────────

/// Payloads are aligned and diffed in words of this many bytes.
pub const WORD_SIZE: usize = 4;

/// Payloads at or below this size are always sent in full.
///
/// The browser decoder applies the same rule; changing it on one side only
/// breaks every client.
pub const DIFF_THRESHOLD: usize = 256;

// ── Encoding ─────────────────────────────────────────────────────

/// Per-record (and per-frame) encoding tag carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Encoding {
    /// The payload follows verbatim, zero-padded to a word boundary.
    Full = 0,
    /// The payload is an RLE-XOR diff against the previous payload.
    RleXor = 1,
}

impl Encoding {
    /// Pick the encoding for `cur` given the previous payload length.
    ///
    /// A diff is only valid when both payloads have the same length and the
    /// payload is larger than [`DIFF_THRESHOLD`].
    pub fn choose(prev_len: usize, cur_len: usize) -> Self {
        if prev_len == cur_len && cur_len > DIFF_THRESHOLD {
            Encoding::RleXor
        } else {
            Encoding::Full
        }
    }

    /// Decode a wire tag.
    pub fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(Encoding::Full),
            1 => Some(Encoding::RleXor),
            _ => None,
        }
    }

    /// The wire tag.
    pub const fn tag(self) -> i32 {
        self as i32
    }
}

/// Number of zero bytes needed to pad `len` to a word boundary.
pub const fn padding(len: usize) -> usize {
    (WORD_SIZE - len % WORD_SIZE) % WORD_SIZE
}

// ── Encode / decode ──────────────────────────────────────────────

/// Append the RLE-XOR diff of `cur` against `prev` to `out`.
///
/// Bytes of `prev` past its end read as zero, so a shorter `prev` never
/// panics; callers are still expected to diff equal-length payloads only.
pub fn encode_diff_into(cur: &[u8], prev: &[u8], out: &mut BytesMut) {
    let mut run: u32 = 0;
    let mut word: u32 = 0;

    for offset in (0..cur.len()).step_by(WORD_SIZE) {
        let len = WORD_SIZE.min(cur.len() - offset);
        let xor = load_word(prev, offset, len) ^ load_word(cur, offset, len);
        if xor == word {
            run += 1;
        } else {
            if run > 0 {
                out.put_u32_le(run);
                out.put_u32_le(word);
            }
            run = 1;
            word = xor;
        }
    }

    out.put_u32_le(run);
    out.put_u32_le(word);
}

/// RLE-XOR diff of `cur` against `prev`.
pub fn encode_diff(cur: &[u8], prev: &[u8]) -> Vec<u8> {
    let mut out = BytesMut::with_capacity(16);
    encode_diff_into(cur, prev, &mut out);
    out.to_vec()
}

/// Rebuild the current payload from its diff and the previous payload.
///
/// The result has the same length as `prev`.
pub fn decode_diff(diff: &[u8], prev: &[u8]) -> Result<Vec<u8>, IncppectError> {
    if diff.len() % (2 * WORD_SIZE) != 0 {
        return Err(IncppectError::InvalidDiff("diff is not a whole number of runs"));
    }

    let words = prev.len().div_ceil(WORD_SIZE);
    let mut out = Vec::with_capacity(prev.len());
    let mut word_index = 0usize;

    for pair in diff.chunks_exact(2 * WORD_SIZE) {
        let run = u32::from_le_bytes([pair[0], pair[1], pair[2], pair[3]]) as usize;
        let xor = u32::from_le_bytes([pair[4], pair[5], pair[6], pair[7]]);

        if word_index + run > words {
            return Err(IncppectError::InvalidDiff("run overflows previous payload"));
        }

        for _ in 0..run {
            let offset = word_index * WORD_SIZE;
            let len = WORD_SIZE.min(prev.len() - offset);
            let restored = (load_word(prev, offset, len) ^ xor).to_le_bytes();
            out.extend_from_slice(&restored[..len]);
            word_index += 1;
        }
    }

    if word_index != words {
        return Err(IncppectError::InvalidDiff("runs do not cover previous payload"));
    }

    Ok(out)
}

/// Little-endian word of `len` bytes at `offset`; missing bytes read as zero.
fn load_word(buf: &[u8], offset: usize, len: usize) -> u32 {
    let mut bytes = [0u8; WORD_SIZE];
    if offset < buf.len() {
        let available = len.min(buf.len() - offset);
        bytes[..available].copy_from_slice(&buf[offset..offset + available]);
    }
    u32::from_le_bytes(bytes)
}

// ── Tests ────────────────────────────────────────────────────────
