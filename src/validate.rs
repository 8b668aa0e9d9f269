//! Chunk batch validation
//!
//! A batch is checked in four passes, in this order:
//! 1. sequence numbers are exactly `0..N`
//! 2. each range is non-empty and matches its content
//! 3. overlaps are symmetric between neighbours and absent at the ends
//! 4. ranges, after removing declared overlaps, tile `[0, total_chars)`
//!
//! The first violation found is reported together with the chunk index.

use crate::error::{RagdError, RagdResult};
use crate::model::{skip_chars, ChunkDraft};
use thiserror::Error;

/// Which chunk invariant a batch broke
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkViolation {
    #[error("expected sequence number {expected}, found {found}")]
    SequenceGap { expected: u32, found: u32 },

    #[error("char_end {char_end} must be greater than char_start {char_start}")]
    EmptyRange { char_start: u64, char_end: u64 },

    #[error("content is empty")]
    EmptyContent,

    #[error("content has {len} characters, minimum is {min}")]
    TooShort { len: u64, min: u64 },

    #[error("range covers {range_len} characters but content has {content_len}")]
    LengthMismatch { range_len: u64, content_len: u64 },

    #[error("overlap_prev_chars {prev} does not match previous chunk's overlap_next_chars {expected}")]
    OverlapAsymmetry { expected: u64, prev: u64 },

    #[error("{side} overlap of {chars} characters at a document boundary")]
    BoundaryOverlap { side: &'static str, chars: u64 },

    #[error("overlap of {overlap} characters is not smaller than the chunk ({len} characters)")]
    OverlapTooLarge { overlap: u64, len: u64 },

    #[error("declared overlap text differs from the previous chunk")]
    OverlapTextMismatch,

    #[error("chunk starts at {found}, expected {expected}")]
    TilingGap { expected: u64, found: u64 },

    #[error("chunks cover {covered} characters, document has {total}")]
    CoverageMismatch { covered: u64, total: u64 },
}

fn reject(index: usize, violation: ChunkViolation) -> RagdError {
    RagdError::ChunkConsistency { index, violation }
}

/// Validate a full chunk batch for a document of `total_chars` characters.
///
/// `min_chunk_chars` applies to every chunk except the last, which only
/// has to be non-empty.
pub fn validate_batch(drafts: &[ChunkDraft], total_chars: u64, min_chunk_chars: u64) -> RagdResult<()> {
    check_sequence(drafts)?;
    check_ranges(drafts, min_chunk_chars)?;
    check_overlaps(drafts)?;
    check_tiling(drafts, total_chars)
}

fn check_sequence(drafts: &[ChunkDraft]) -> RagdResult<()> {
    for (i, draft) in drafts.iter().enumerate() {
        let expected = i as u32;
        if draft.sequence_num != expected {
            return Err(reject(
                i,
                ChunkViolation::SequenceGap {
                    expected,
                    found: draft.sequence_num,
                },
            ));
        }
    }
    Ok(())
}

fn check_ranges(drafts: &[ChunkDraft], min_chunk_chars: u64) -> RagdResult<()> {
    let last = drafts.len().saturating_sub(1);
    for (i, draft) in drafts.iter().enumerate() {
        if draft.char_end <= draft.char_start {
            return Err(reject(
                i,
                ChunkViolation::EmptyRange {
                    char_start: draft.char_start,
                    char_end: draft.char_end,
                },
            ));
        }
        let content_len = draft.content.chars().count() as u64;
        if content_len == 0 {
            return Err(reject(i, ChunkViolation::EmptyContent));
        }
        if i != last && content_len < min_chunk_chars {
            return Err(reject(
                i,
                ChunkViolation::TooShort {
                    len: content_len,
                    min: min_chunk_chars,
                },
            ));
        }
        let range_len = draft.char_end - draft.char_start;
        if range_len != content_len {
            return Err(reject(i, ChunkViolation::LengthMismatch { range_len, content_len }));
        }
    }
    Ok(())
}

fn check_overlaps(drafts: &[ChunkDraft]) -> RagdResult<()> {
    if let Some(first) = drafts.first() {
        if first.overlap_prev_chars != 0 {
            return Err(reject(
                0,
                ChunkViolation::BoundaryOverlap {
                    side: "leading",
                    chars: first.overlap_prev_chars,
                },
            ));
        }
    }
    for (i, draft) in drafts.iter().enumerate() {
        let len = draft.char_end - draft.char_start;
        for overlap in [draft.overlap_prev_chars, draft.overlap_next_chars] {
            if overlap >= len {
                return Err(reject(i, ChunkViolation::OverlapTooLarge { overlap, len }));
            }
        }
        if i > 0 {
            let expected = drafts[i - 1].overlap_next_chars;
            if draft.overlap_prev_chars != expected {
                return Err(reject(
                    i,
                    ChunkViolation::OverlapAsymmetry {
                        expected,
                        prev: draft.overlap_prev_chars,
                    },
                ));
            }
        }
    }
    if let Some(last) = drafts.last() {
        if last.overlap_next_chars != 0 {
            return Err(reject(
                drafts.len() - 1,
                ChunkViolation::BoundaryOverlap {
                    side: "trailing",
                    chars: last.overlap_next_chars,
                },
            ));
        }
    }
    Ok(())
}

fn check_tiling(drafts: &[ChunkDraft], total_chars: u64) -> RagdResult<()> {
    let mut expected_start = 0u64;
    for (i, draft) in drafts.iter().enumerate() {
        if draft.char_start != expected_start {
            return Err(reject(
                i,
                ChunkViolation::TilingGap {
                    expected: expected_start,
                    found: draft.char_start,
                },
            ));
        }
        if i > 0 && draft.overlap_prev_chars > 0 {
            let prev = &drafts[i - 1];
            let k = draft.overlap_prev_chars as usize;
            let prev_len = prev.content.chars().count();
            let tail = skip_chars(&prev.content, prev_len - k);
            if !draft.content.starts_with(tail) {
                return Err(reject(i, ChunkViolation::OverlapTextMismatch));
            }
        }
        expected_start = draft.char_end - draft.overlap_next_chars;
    }
    let covered = drafts.last().map(|d| d.char_end).unwrap_or(0);
    if covered != total_chars {
        return Err(reject(
            drafts.len().saturating_sub(1),
            ChunkViolation::CoverageMismatch {
                covered,
                total: total_chars,
            },
        ));
    }
    Ok(())
}
