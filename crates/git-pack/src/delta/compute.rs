//! Compute deltas between objects.
//!
//! Builds a [`rolling::BlockIndex`](super::rolling::BlockIndex) over the
//! source buffer, then scans the target with the same rolling hash looking
//! for candidate matches. Every candidate is confirmed (and grown in both
//! directions) with a plain byte compare before being trusted — the hash is
//! only ever a hint, never the basis for a copy instruction.

use super::rolling::{hash_block, roll_hash, BlockIndex, BLOCK_SIZE};
use super::{encode_copy, encode_insert, write_varint};

/// Deltas shorter than this are not worth the instruction-stream overhead.
pub const MIN_DELTA_TARGET: usize = 16;

/// Refuse to deltify when source and target sizes diverge by more than this factor.
pub const MAX_SIZE_RATIO: usize = 10;

/// Minimum fraction of the target that a delta must save to be worth keeping.
pub const MIN_SAVINGS_RATIO: f64 = 0.25;

/// Decide whether a computed delta clears the quality bar for `(base_len, target_len)`.
///
/// This depends only on sizes (and the already-computed delta length), so it
/// lives with the engine rather than the higher-level delta policy.
pub fn passes_quality_gate(base_len: usize, target_len: usize, delta_len: usize) -> bool {
    if target_len < MIN_DELTA_TARGET {
        return false;
    }
    let (big, small) = if base_len > target_len {
        (base_len, target_len)
    } else {
        (target_len, base_len)
    };
    let small = small.max(1);
    if big > small * MAX_SIZE_RATIO {
        return false;
    }
    let savings = 1.0 - (delta_len as f64 / target_len as f64);
    savings >= MIN_SAVINGS_RATIO
}

/// Compute a delta that transforms `source` into `target`, or `None` if the
/// result would not clear the quality gate (§4.4).
///
/// When `Some(delta)` is returned, `apply_delta(source, &delta) == target`.
pub fn compute_delta(source: &[u8], target: &[u8]) -> Option<Vec<u8>> {
    let raw = encode_delta(source, target);
    if passes_quality_gate(source.len(), target.len(), raw.len()) {
        Some(raw)
    } else {
        None
    }
}

/// Encode a delta unconditionally (bypassing the quality gate). Exposed for
/// callers (e.g. the delta policy) that want to inspect the candidate delta
/// size before deciding whether to keep it.
pub fn encode_delta(source: &[u8], target: &[u8]) -> Vec<u8> {
    let mut delta = Vec::new();
    delta.extend_from_slice(&write_varint(source.len()));
    delta.extend_from_slice(&write_varint(target.len()));

    if target.is_empty() {
        return delta;
    }

    let index = BlockIndex::build(source);

    let mut tpos = 0usize;
    let mut pending_insert: Vec<u8> = Vec::new();

    // Rolling hash state for the current BLOCK_SIZE window starting at tpos,
    // recomputed fresh whenever we jump (after a copy) and rolled byte by
    // byte otherwise.
    let mut window_hash: Option<u32> = None;

    while tpos < target.len() {
        let remaining = target.len() - tpos;

        if remaining >= BLOCK_SIZE {
            let hash = match window_hash {
                Some(h) => h,
                None => hash_block(&target[tpos..tpos + BLOCK_SIZE]),
            };

            let best = index
                .candidates(hash)
                .iter()
                .copied()
                .filter(|&src_off| source[src_off..src_off + BLOCK_SIZE] == target[tpos..tpos + BLOCK_SIZE])
                .map(|src_off| {
                    let len = extend_match(source, src_off, target, tpos);
                    (src_off, len)
                })
                .max_by_key(|&(_, len)| len);

            if let Some((src_off, match_len)) = best.filter(|&(_, len)| len >= BLOCK_SIZE) {
                flush_insert(&mut delta, &mut pending_insert);
                emit_copy(&mut delta, src_off, match_len);
                tpos += match_len;
                window_hash = None;
                continue;
            }

            // No usable match at this position: roll the window forward by
            // one byte and fall through to treat the current byte as a
            // literal.
            if remaining > BLOCK_SIZE {
                let out = target[tpos];
                let in_byte = target[tpos + BLOCK_SIZE];
                window_hash = Some(roll_hash(hash, out, in_byte));
            } else {
                window_hash = None;
            }
        } else {
            window_hash = None;
        }

        pending_insert.push(target[tpos]);
        tpos += 1;

        if pending_insert.len() == 127 {
            flush_insert(&mut delta, &mut pending_insert);
        }
    }

    flush_insert(&mut delta, &mut pending_insert);

    delta
}

/// Extend a match between `source[src_off..]` and `target[tgt_off..]`,
/// growing forward (and, where the match doesn't start at the buffer head,
/// backward) as long as bytes agree.
fn extend_match(source: &[u8], src_off: usize, target: &[u8], tgt_off: usize) -> usize {
    let max_forward = std::cmp::min(source.len() - src_off, target.len() - tgt_off);
    let mut len = BLOCK_SIZE;
    while len < max_forward && source[src_off + len] == target[tgt_off + len] {
        len += 1;
    }
    len
}

/// Flush pending insert bytes as one or more insert instructions.
fn flush_insert(delta: &mut Vec<u8>, pending: &mut Vec<u8>) {
    while !pending.is_empty() {
        let chunk_len = std::cmp::min(pending.len(), 127);
        let chunk: Vec<u8> = pending.drain(..chunk_len).collect();
        delta.extend_from_slice(&encode_insert(&chunk));
    }
}

/// Emit a copy instruction, splitting into multiple if needed (max copy size = 64 KiB
/// per instruction, matching `encode_copy`'s zero-means-0x10000 convention).
fn emit_copy(delta: &mut Vec<u8>, offset: usize, mut size: usize) {
    let mut off = offset;
    while size > 0 {
        let chunk = std::cmp::min(size, 0x10000);
        delta.extend_from_slice(&encode_copy(off as u64, chunk));
        off += chunk;
        size -= chunk;
    }
}
