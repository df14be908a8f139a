//! Piece geometry construction and lookup

use piecemeal_core::{DefaultPieceList, PieceError, PieceGeometry, PieceList, PieceQuery};
use proptest::prelude::*;

#[test]
fn test_thousand_bytes_in_three_hundred_byte_pieces() {
    let list = DefaultPieceList::create_uniform(1000, 300, 0, 0).unwrap();

    assert_eq!(list.geometry().sizes(), &[300, 300, 300, 100]);
    assert_eq!(list.geometry().data_offsets(), &[0, 300, 600, 900]);
    assert_eq!(list.count(), 4);
    assert_eq!(list.total_size(), 1000);
}

#[test]
fn test_lookup_matches_precomputed_arrays() {
    let list = DefaultPieceList::create(5, 4096, 100, |i| 1000 + i as u64).unwrap();
    let geometry = list.geometry();

    for (slot, piece) in list.pieces().enumerate() {
        let looked_up = list.piece_by_index(100 + slot as u32).unwrap();
        assert_eq!(looked_up, piece);
        assert_eq!(list.size(piece), geometry.sizes()[slot]);
        assert_eq!(list.data_start_offset(piece), geometry.data_offsets()[slot]);
    }

    assert_eq!(
        list.piece_by_index(99),
        Err(PieceError::IndexOutOfBounds {
            piece_index: 99,
            start: 100,
            end: 105
        })
    );
    assert!(list.piece_by_index(105).is_err());
}

#[test]
fn test_configuration_errors() {
    let zero_piece_size = DefaultPieceList::create_uniform(1000, 0, 0, 0).unwrap_err();
    assert!(zero_piece_size.is_configuration_error());

    let zero_size_piece = DefaultPieceList::create(3, 0, 0, |_| 0).unwrap_err();
    assert!(zero_size_piece.is_configuration_error());
}

proptest! {
    #[test]
    fn prop_uniform_sizes_cover_total(
        total_size in 0u64..50_000_000,
        piece_size in 1_000u64..2_000_000,
        initial_offset in 0u64..1_000_000,
        initial_index in 0u32..10_000,
    ) {
        let geometry =
            PieceGeometry::uniform(total_size, piece_size, initial_offset, initial_index).unwrap();

        prop_assert_eq!(geometry.sizes().iter().sum::<u64>(), total_size);
        prop_assert_eq!(geometry.total_size(), total_size);
        prop_assert_eq!(geometry.count() as u64, total_size.div_ceil(piece_size));
        prop_assert_eq!(
            geometry.end_piece_index(),
            initial_index + geometry.count() as u32
        );
        prop_assert!(geometry.sizes().iter().all(|&size| size > 0 && size <= piece_size));

        if let Some(&last) = geometry.sizes().last() {
            let expected = match total_size % piece_size {
                0 => piece_size,
                remainder => remainder,
            };
            prop_assert_eq!(last, expected);
        }

        let mut expected_offset = initial_offset;
        for (&offset, &size) in geometry.data_offsets().iter().zip(geometry.sizes()) {
            prop_assert_eq!(offset, expected_offset);
            expected_offset += size;
        }
    }

    #[test]
    fn prop_offset_lookup_agrees_with_geometry(
        total_size in 1u64..5_000_000,
        piece_size in 100u64..500_000,
        probe in 0u64..5_000_000,
    ) {
        let list = DefaultPieceList::create_uniform(total_size, piece_size, 0, 0).unwrap();
        let probe = probe % total_size;

        let piece = list.piece_at_data_offset(probe).unwrap();
        prop_assert!(list.data_offset_range(piece).contains(&probe));
        prop_assert_eq!(u64::from(piece.piece_index()), probe / piece_size);
    }
}
