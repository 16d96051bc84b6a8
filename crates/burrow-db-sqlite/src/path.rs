//! Materialized post paths.
//!
//! A post's tree position is stored as one TEXT column: every ancestor id
//! (root..=self) rendered as a zero-padded 12-digit decimal segment and
//! concatenated. Fixed-width segments make byte-wise string comparison
//! identical to element-wise numeric comparison, and a parent's path is a
//! strict prefix of — and therefore sorts before — every descendant's.
//! `ORDER BY path` is thus a depth-first pre-order walk, and the first
//! segment (`substr(path, 1, 12)`) keys the top-level branch.
//!
//! Paths are assigned once at insert and never recomputed.

/// Digits per id segment. 12 decimal digits outlast any realistic
/// AUTOINCREMENT value this service will see.
pub const SEGMENT_WIDTH: usize = 12;

/// Renders one post id as a path segment.
pub fn segment(id: i64) -> String {
    format!("{id:0width$}", width = SEGMENT_WIDTH)
}

/// Appends `id` to an encoded parent path (empty for a root post).
pub fn child(parent_path: &str, id: i64) -> String {
    let mut path = String::with_capacity(parent_path.len() + SEGMENT_WIDTH);
    path.push_str(parent_path);
    path.push_str(&segment(id));
    path
}

/// Decodes an encoded path back into its id sequence. Malformed segments
/// decode as 0 rather than panicking; they cannot occur for store-written
/// rows.
pub fn decode(path: &str) -> Vec<i64> {
    path.as_bytes()
        .chunks(SEGMENT_WIDTH)
        .map(|seg| {
            std::str::from_utf8(seg)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .unwrap_or(0)
        })
        .collect()
}
