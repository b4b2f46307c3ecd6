//! Property tests for date-range chunking

use activity_harvester::split::{split, DateChunk, DateRange};
use chrono::{DateTime, Utc};
use proptest::prelude::*;

/// 1970-01-01 .. 2100-01-01, in seconds
const EPOCH_SPAN_SECS: i64 = 4_102_444_800;

/// Ranges of up to ~3 years with arbitrary (not midnight-aligned) boundaries
fn date_range() -> impl Strategy<Value = DateRange> {
    (0..EPOCH_SPAN_SECS, 0i64..100_000_000).prop_map(|(start, length)| {
        let start = DateTime::<Utc>::from_timestamp(start, 0).unwrap();
        let end = DateTime::<Utc>::from_timestamp(start.timestamp() + length, 0).unwrap();
        DateRange::new(start, end).unwrap()
    })
}

fn granularity() -> impl Strategy<Value = u32> {
    prop_oneof![1u32..=31, 32u32..=3_660, Just(u32::MAX)]
}

proptest! {
    /// Chunks are contiguous and non-overlapping, and cover the range exactly
    #[test]
    fn test_chunks_cover_range_exactly(range in date_range(), days in granularity()) {
        let chunks: Vec<DateChunk> = split(&range, days).unwrap().collect();

        if range.is_empty() {
            prop_assert!(chunks.is_empty());
            return Ok(());
        }
        prop_assert_eq!(chunks[0].start(), range.start());
        prop_assert_eq!(chunks[chunks.len() - 1].end(), range.end());
        for chunk in &chunks {
            prop_assert!(chunk.start() < chunk.end());
        }
        for pair in chunks.windows(2) {
            prop_assert_eq!(pair[0].end(), pair[1].start());
        }
    }

    /// Interior edges fall on UTC midnight and no chunk spans more than the granularity
    #[test]
    fn test_interior_edges_are_day_aligned(range in date_range(), days in 1u32..=31) {
        let chunks: Vec<DateChunk> = split(&range, days).unwrap().collect();
        for pair in chunks.windows(2) {
            prop_assert_eq!(pair[0].end().timestamp() % 86_400, 0);
        }
        for chunk in &chunks {
            prop_assert!((chunk.end() - chunk.start()).num_days() <= i64::from(days));
        }
    }

    /// Splitting the same range twice yields the identical sequence
    #[test]
    fn test_split_is_deterministic(range in date_range(), days in granularity()) {
        let first: Vec<DateChunk> = split(&range, days).unwrap().collect();
        let second: Vec<DateChunk> = split(&range, days).unwrap().collect();
        prop_assert_eq!(first, second);

        let chunks = split(&range, days).unwrap();
        let (hint, _) = chunks.size_hint();
        prop_assert_eq!(hint, chunks.count());
    }
}
