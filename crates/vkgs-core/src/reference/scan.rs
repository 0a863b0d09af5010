//! Inclusive prefix sums over tile-overlap counts.

use crate::dispatch::{scan_passes, scan_result_index};

/// Sequential inclusive scan.
pub fn inclusive_scan(counts: &[u32]) -> Vec<u32> {
    counts
        .iter()
        .scan(0u32, |acc, &c| {
            *acc += c;
            Some(*acc)
        })
        .collect()
}

/// Hillis-Steele scan over a ping/pong pair, pass by pass as the GPU runs it.
///
/// Returns both buffers and the index of the one holding the result.
pub fn hillis_steele(counts: &[u32]) -> ([Vec<u32>; 2], usize) {
    let n = counts.len() as u32;
    let mut buffers = [counts.to_vec(), vec![0; counts.len()]];
    for pass in 0..scan_passes(n) {
        let step = 1usize << pass;
        let src = (pass % 2) as usize;
        let (read, write) = if src == 0 {
            let (a, b) = buffers.split_at_mut(1);
            (&a[0], &mut b[0])
        } else {
            let (a, b) = buffers.split_at_mut(1);
            (&b[0], &mut a[0])
        };
        for (i, out) in write.iter_mut().enumerate() {
            *out = read[i] + if i >= step { read[i - step] } else { 0 };
        }
    }
    (buffers, scan_result_index(n))
}

/// Exclusive offset of element `i` given the inclusive scan.
#[inline]
pub fn exclusive_at(scan: &[u32], i: usize) -> u32 {
    if i == 0 { 0 } else { scan[i - 1] }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_element_is_total() {
        let counts = [3, 0, 2, 7, 1];
        let scan = inclusive_scan(&counts);
        assert_eq!(scan, vec![3, 3, 5, 12, 13]);
        assert_eq!(exclusive_at(&scan, 0), 0);
        assert_eq!(exclusive_at(&scan, 3), 5);
    }

    #[test]
    fn hillis_steele_matches_sequential_scan() {
        for n in [1usize, 2, 3, 4, 5, 17, 256, 1000] {
            let counts: Vec<u32> = (0..n as u32).map(|i| (i * 7 + 3) % 5).collect();
            let (buffers, result) = hillis_steele(&counts);
            assert_eq!(buffers[result], inclusive_scan(&counts), "n = {n}");
        }
    }

    #[test]
    fn empty_input_scans_to_nothing() {
        assert!(inclusive_scan(&[]).is_empty());
        let (buffers, _) = hillis_steele(&[]);
        assert!(buffers[0].is_empty() && buffers[1].is_empty());
    }
}
