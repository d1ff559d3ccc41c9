//! Approximate, order-preserving signature matching over one method's
//! resolved instruction stream.
//!
//! For every start offset in the signature's view of the stream, pattern
//! position `i` is aligned with the first instruction at or after
//! `offset + i` (plus whatever the cursor already skipped) that carries the
//! same opcode. A missing instruction or a same-opcode instruction with
//! different operands costs one mismatch. The earliest offset whose cost
//! stays within `max_distance` is reported.

use serde::Serialize;

use crate::instruction::InlineInstruction;
use crate::signature::Signature;

pub const DEFAULT_MAX_DISTANCE: usize = 1;
pub const DEFAULT_MAX_SKIP: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatchOptions {
    /// Mismatches tolerated per signature attempt.
    pub max_distance: usize,
    /// Instructions the cursor may step over while looking for one pattern
    /// position's opcode. `None` searches to the end of the view.
    pub max_skip: Option<usize>,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            max_distance: DEFAULT_MAX_DISTANCE,
            max_skip: Some(DEFAULT_MAX_SKIP),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Match {
    pub method: String,
    pub signature: String,
    /// Start offset within the signature's filtered view of the method.
    pub offset: usize,
    pub distance: usize,
}

/// Run every signature against one method; at most one match per signature.
pub fn scan_method(
    method: &str,
    stream: &[InlineInstruction],
    signatures: &[Signature],
    options: &MatchOptions,
) -> Vec<Match> {
    signatures
        .iter()
        .filter_map(|signature| find_match(method, stream, signature, options))
        .collect()
}

pub fn find_match(
    method: &str,
    stream: &[InlineInstruction],
    signature: &Signature,
    options: &MatchOptions,
) -> Option<Match> {
    let pattern = &signature.pattern;
    if pattern.len() > stream.len() {
        return None;
    }

    let view: Vec<&InlineInstruction> = stream
        .iter()
        .filter(|instruction| signature.restriction.admits(instruction))
        .collect();
    if pattern.len() > view.len() {
        return None;
    }

    (0..view.len() - pattern.len()).find_map(|offset| {
        let distance = distance_at(&view, pattern, offset, options)?;
        log::debug!(
            "{} matched in {method} at offset {offset} (distance {distance})",
            signature.name
        );
        Some(Match {
            method: method.to_string(),
            signature: signature.name.clone(),
            offset,
            distance,
        })
    })
}

/// Mismatch count of `pattern` aligned at `offset`, or `None` once it exceeds
/// the tolerance.
fn distance_at(
    view: &[&InlineInstruction],
    pattern: &[InlineInstruction],
    offset: usize,
    options: &MatchOptions,
) -> Option<usize> {
    let mut mismatches = 0usize;
    // how far the cursor has drifted past `offset + i`; never rewinds
    let mut drift = 0usize;

    for (i, expected) in pattern.iter().enumerate() {
        let wanted = expected.opcode();
        let before = drift;
        let mut skipped = 0usize;

        let found = loop {
            match view.get(offset + drift + i) {
                None => break None,
                Some(candidate) if candidate.opcode() == wanted => break Some(*candidate),
                Some(_) => {
                    if options.max_skip.is_some_and(|cap| skipped >= cap) {
                        drift = before;
                        break None;
                    }
                    drift += 1;
                    skipped += 1;
                }
            }
        };

        let matched = found.is_some_and(|candidate| {
            candidate.len() == expected.len() && candidate.operands() == expected.operands()
        });
        if !matched {
            mismatches += 1;
            if mismatches > options.max_distance {
                return None;
            }
        }
    }

    Some(mismatches)
}
