//! LSD radix sort with the same per-workgroup histogram layout as the GPU.

use crate::constants::{RADIX_BITS, RADIX_BUCKETS, RADIX_PASSES};
use crate::dispatch::RadixDispatch;

/// Sort `keys` ascending, carrying `values` along, in eight stable passes.
///
/// Each pass builds a digit-major histogram (`hist[digit * W + workgroup]`),
/// scans it exclusively, and scatters every workgroup's elements in order.
/// The even/odd buffers swap roles each pass, so the result lands back in the
/// buffers that were passed in.
pub fn radix_sort(keys: &mut [u64], values: &mut [u32], blocks_per_workgroup: u32) {
    debug_assert_eq!(keys.len(), values.len());
    let n = keys.len();
    let dispatch = RadixDispatch::new(n as u32, blocks_per_workgroup);
    let chunk = dispatch.elements_per_workgroup() as usize;
    let workgroups = dispatch.workgroups as usize;

    let mut odd_keys = vec![0u64; n];
    let mut odd_values = vec![0u32; n];
    let mut histogram = vec![0u32; dispatch.histogram_len() as usize];

    for pass in 0..RADIX_PASSES {
        let shift = pass * RADIX_BITS;
        let digit = |key: u64| ((key >> shift) as usize) & (RADIX_BUCKETS as usize - 1);
        let (src_k, src_v, dst_k, dst_v) = if pass % 2 == 0 {
            (&keys[..], &values[..], &mut odd_keys[..], &mut odd_values[..])
        } else {
            (&odd_keys[..], &odd_values[..], &mut keys[..], &mut values[..])
        };

        histogram.fill(0);
        for (index, &key) in src_k.iter().enumerate() {
            histogram[digit(key) * workgroups + index / chunk] += 1;
        }

        let mut running = 0;
        for slot in &mut histogram {
            let count = *slot;
            *slot = running;
            running += count;
        }

        for (index, (&key, &value)) in src_k.iter().zip(src_v).enumerate() {
            let slot = &mut histogram[digit(key) * workgroups + index / chunk];
            dst_k[*slot as usize] = key;
            dst_v[*slot as usize] = value;
            *slot += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pseudo_keys(n: usize) -> Vec<u64> {
        let mut state = 0x9E37_79B9_7F4A_7C15_u64;
        (0..n)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                state
            })
            .collect()
    }

    #[test]
    fn keys_end_up_non_decreasing() {
        for (n, blocks) in [(0, 32), (1, 32), (1000, 1), (70_000, 32), (5000, 256)] {
            let mut keys = pseudo_keys(n);
            let mut values: Vec<u32> = (0..n as u32).collect();
            let original = keys.clone();
            radix_sort(&mut keys, &mut values, blocks);
            assert!(keys.windows(2).all(|w| w[0] <= w[1]), "n = {n}");
            for (key, value) in keys.iter().zip(&values) {
                assert_eq!(original[*value as usize], *key);
            }
        }
    }

    #[test]
    fn equal_keys_keep_input_order() {
        let mut keys = vec![5, 1, 5, 1, 5];
        let mut values = vec![0, 1, 2, 3, 4];
        radix_sort(&mut keys, &mut values, 1);
        assert_eq!(keys, vec![1, 1, 5, 5, 5]);
        assert_eq!(values, vec![1, 3, 0, 2, 4]);
    }
}
