//! Histogram invariants for indexical unpack-and-sum.

use pktgen_kernels::batch;
use pktgen_kernels::kernels::families::UNPACK_AND_SUM;
use pktgen_kernels::kernels::indexical::{bucket, bucket_count};
use pktgen_kernels::KernelError;
use proptest::prelude::*;

fn mask_strategy() -> impl Strategy<Value = u32> {
    prop_oneof![
        Just(0u32),
        // Contiguous fields of 1..=12 bits at any position.
        (1u32..=12, 0u32..32).prop_map(|(width, pos)| ((1u32 << width) - 1).wrapping_shl(pos)),
        // Arbitrary masks with a bounded span.
        any::<u16>().prop_map(u32::from),
    ]
}

fn histograms(values: &[u32], masks: &[u32]) -> Vec<Vec<u32>> {
    let mut storage: Vec<Vec<u32>> = masks.iter().map(|&m| vec![0u32; bucket_count(m)]).collect();
    {
        let mut counters: Vec<&mut [u32]> = storage.iter_mut().map(|c| &mut c[..]).collect();
        batch::unpack_and_sum_indexicals(values, masks, &mut counters).unwrap();
    }
    storage
}

proptest! {
    #[test]
    fn prop_every_histogram_sums_to_value_count(
        values in prop::collection::vec(any::<u32>(), 0..500),
        masks in prop::collection::vec(mask_strategy(), 1..6),
    ) {
        for counters in histograms(&values, &masks) {
            prop_assert_eq!(counters.iter().map(|&c| c as usize).sum::<usize>(), values.len());
        }
    }

    #[test]
    fn prop_buckets_match_reference(
        values in prop::collection::vec(any::<u32>(), 0..200),
        mask in mask_strategy(),
    ) {
        let mut expected = vec![0u32; bucket_count(mask)];
        for &v in &values {
            expected[bucket(v, mask) as usize] += 1;
        }
        prop_assert_eq!(&histograms(&values, &[mask])[0], &expected);
    }

    #[test]
    fn prop_counters_accumulate(
        first in prop::collection::vec(any::<u32>(), 0..100),
        second in prop::collection::vec(any::<u32>(), 0..100),
    ) {
        let mask = 0x0000_0ff0;
        let mut counters = vec![0u32; bucket_count(mask)];
        batch::unpack_and_sum_indexicals(&first, &[mask], &mut [&mut counters[..]]).unwrap();
        batch::unpack_and_sum_indexicals(&second, &[mask], &mut [&mut counters[..]]).unwrap();

        let mut all = first.clone();
        all.extend_from_slice(&second);
        prop_assert_eq!(&counters, &histograms(&all, &[mask])[0]);
    }
}

#[test]
fn test_oversized_counters_are_accepted() {
    let mut counters = vec![0u32; 100];
    batch::unpack_and_sum_indexicals(&[0x5, 0x7, 0x5], &[0x7], &mut [&mut counters[..]]).unwrap();
    assert_eq!(counters[5], 2);
    assert_eq!(counters[7], 1);
    assert_eq!(counters[8..].iter().sum::<u32>(), 0);
}

#[test]
fn test_mask_counter_count_mismatch() {
    let mut a = vec![0u32; 16];
    let err = batch::unpack_and_sum_indexicals(&[1], &[0xf, 0xf0], &mut [&mut a[..]]).unwrap_err();
    assert!(matches!(
        err,
        KernelError::LengthMismatch {
            what: "counters",
            expected: 2,
            actual: 1
        }
    ));
}

#[test]
fn test_full_counters_wrap() {
    let mut counters = vec![u32::MAX; 16];
    batch::unpack_and_sum_indexicals(&[1, 1, 2], &[0xf], &mut [&mut counters[..]]).unwrap();
    assert_eq!(counters[1], 1);
    assert_eq!(counters[2], 0);
    assert_eq!(counters[3], u32::MAX);
}

#[test]
fn test_full_counters_wrap_in_every_variant() {
    // Enough values to reach the vector paths as well as the remainder loop.
    let values: Vec<u32> = (0..67u32).map(|i| i % 4).collect();
    for variant in UNPACK_AND_SUM.variants() {
        let Some(f) = UNPACK_AND_SUM.runnable(variant) else {
            continue;
        };
        let mut counters = vec![u32::MAX; 4];
        unsafe { f(&values, &[0x3], &mut [&mut counters[..]]) };
        // Buckets 0..3 receive 17, 17, 17 and 16 values.
        assert_eq!(counters, vec![16, 16, 16, 15], "{}", variant);
    }
}
