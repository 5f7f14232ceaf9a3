//! Property-based tests for extent tracking
//!
//! Uses proptest to verify index ordering, containment and overlap queries
//! against a brute-force model over random extent sets

use fvdecheck::{sector_to_block, ExtentState, Provenance, VolumeState};
use proptest::prelude::*;

const PV_SIZE: u64 = 10_000;

#[derive(Debug, Clone, Copy)]
enum Mark {
    Reserved,
    Free,
    Allocated(u64),
}

fn mark_strategy() -> impl Strategy<Value = (u64, u64, Mark)> {
    (
        0u64..PV_SIZE,
        1u64..500,
        prop_oneof![
            Just(Mark::Reserved),
            Just(Mark::Free),
            (0u64..PV_SIZE).prop_map(Mark::Allocated),
        ],
    )
}

fn build(marks: &[(u64, u64, Mark)]) -> VolumeState {
    let mut state = VolumeState::default();
    state.add_physical_volume(&[0u8; 16], PV_SIZE).unwrap();
    state.add_logical_volume(&[0x11u8; 16], PV_SIZE).unwrap();

    for &(start, count, mark) in marks {
        match mark {
            Mark::Reserved => {
                state.mark_reserved(0, start, count, "Reserved").unwrap();
            }
            Mark::Free => {
                state.mark_free(0, start, count, Provenance::default()).unwrap();
            }
            Mark::Allocated(logical) => {
                state
                    .mark_allocated(0, start, count, 0, logical, Provenance::default())
                    .unwrap();
            }
        }
    }
    state
}

proptest! {
    #[test]
    fn prop_physical_index_sorted(marks in prop::collection::vec(mark_strategy(), 0..60)) {
        let state = build(&marks);

        let starts: Vec<u64> = state
            .physical_extents(0)
            .map(|e| e.physical_block_start)
            .collect();
        prop_assert_eq!(starts.len(), marks.len());
        prop_assert!(starts.windows(2).all(|w| w[0] <= w[1]));

        let logical: Vec<u64> = state
            .logical_extents(0)
            .map(|e| e.logical_block_start)
            .collect();
        prop_assert!(logical.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn prop_find_matches_first_containing(
        marks in prop::collection::vec(mark_strategy(), 0..60),
        probe in 0u64..PV_SIZE + 500,
    ) {
        let state = build(&marks);

        let expected = state
            .physical_extents(0)
            .find(|e| e.physical_block_start <= probe && probe < e.physical_end());
        let found = state.find_physical_extent(0, probe);
        prop_assert_eq!(found, expected);
    }

    #[test]
    fn prop_logical_lookup_only_allocated(
        marks in prop::collection::vec(mark_strategy(), 0..60),
        probe in 0u64..PV_SIZE + 500,
    ) {
        let state = build(&marks);

        if let Some(extent) = state.find_logical_extent(0, probe) {
            prop_assert_eq!(extent.state, ExtentState::Allocated);
            prop_assert!(extent.logical_block_start <= probe);
            prop_assert!(probe < extent.logical_end());
        } else {
            let covered = marks.iter().any(|&(_, count, mark)| match mark {
                Mark::Allocated(logical) => logical <= probe && probe < logical + count,
                _ => false,
            });
            prop_assert!(!covered);
        }
    }

    #[test]
    fn prop_overlap_matches_brute_force(
        marks in prop::collection::vec(mark_strategy(), 0..60),
        start in 0u64..PV_SIZE,
        count in 0u64..800,
    ) {
        let state = build(&marks);

        let expected = state
            .physical_extents(0)
            .find(|e| e.overlaps_physical(start, count));
        prop_assert_eq!(state.check_overlap(0, start, count), expected);
    }

    #[test]
    fn prop_statistics_idempotent(marks in prop::collection::vec(mark_strategy(), 0..60)) {
        let mut state = build(&marks);

        state.calculate_statistics();
        let first = state.physical_volumes()[0].clone();
        let first_lv = state.logical_volumes()[0].clone();
        state.calculate_statistics();
        let second = &state.physical_volumes()[0];
        let second_lv = &state.logical_volumes()[0];

        prop_assert_eq!(first.reserved_blocks, second.reserved_blocks);
        prop_assert_eq!(first.allocated_blocks, second.allocated_blocks);
        prop_assert_eq!(first.free_blocks, second.free_blocks);
        prop_assert_eq!(first_lv.mapped_blocks, second_lv.mapped_blocks);
        prop_assert_eq!(first_lv.unmapped_blocks, second_lv.unmapped_blocks);

        let allocated: u64 = marks
            .iter()
            .filter(|(_, _, m)| matches!(m, Mark::Allocated(_)))
            .map(|&(_, count, _)| count)
            .sum();
        prop_assert_eq!(second.allocated_blocks, allocated);
        prop_assert_eq!(second_lv.mapped_blocks, allocated);
        prop_assert_eq!(
            second_lv.unmapped_blocks,
            PV_SIZE.saturating_sub(allocated)
        );
    }

    #[test]
    fn prop_sector_translation_aligned(block in 0u64..1u64 << 40) {
        prop_assert_eq!(sector_to_block(block * 8, 4096), block);
        prop_assert_eq!(sector_to_block(block * 8 + 7, 4096), block);
    }

    #[test]
    fn prop_capacity_boundary(max in 1usize..8, attempts in 1usize..12) {
        let mut state = VolumeState::with_capacity(4096, max, max);

        for i in 0..attempts {
            let result = state.add_physical_volume(&[i as u8; 16], 100);
            prop_assert_eq!(result.is_ok(), i < max);
        }
        prop_assert_eq!(state.num_physical_volumes() as usize, attempts.min(max));
    }
}
