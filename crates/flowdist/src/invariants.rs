//! Debug assertion macros for dispatch protocol invariants.
//!
//! Only active in debug builds (`debug_assert!`), so there is zero overhead
//! on the release hot path.

// =============================================================================
// Backlog bounds
// =============================================================================

/// Assert that a backlog never holds more than its fixed depth.
///
/// **Invariant**: `0 ≤ count ≤ BACKLOG_SIZE`
macro_rules! debug_assert_backlog_bounded {
    ($count:expr, $depth:expr) => {
        debug_assert!(
            $count <= $depth,
            "backlog count {} exceeds depth {}",
            $count,
            $depth
        )
    };
}

// =============================================================================
// Returns ring saturation
// =============================================================================

/// Assert that the returns ring count saturates at the mask value.
///
/// **Invariant**: `count ≤ MAX_RETURNS - 1` (the branch-free insert advances
/// `start` instead of `count` once saturated)
macro_rules! debug_assert_returns_saturated {
    ($count:expr, $mask:expr) => {
        debug_assert!(
            $count <= $mask,
            "returns ring count {} exceeds saturation point {}",
            $count,
            $mask
        )
    };
}

// =============================================================================
// Flow affinity exclusivity
// =============================================================================

/// Assert that no *other* worker already owns a tag being assigned.
///
/// **Invariant**: at any instant, at most one worker has a given nonzero
/// in-flight tag; otherwise two workers could process the same flow
/// concurrently and per-flow ordering would be lost.
macro_rules! debug_assert_tag_exclusive {
    ($tags:expr, $worker:expr, $tag:expr) => {
        debug_assert!(
            $tags
                .iter()
                .enumerate()
                .all(|(i, &t)| i == $worker || t != $tag),
            "tag {:#x} assigned to worker {} while another worker holds it",
            $tag,
            $worker
        )
    };
}

pub(crate) use debug_assert_backlog_bounded;
pub(crate) use debug_assert_returns_saturated;
pub(crate) use debug_assert_tag_exclusive;
