use printcheck_core::{Descriptor, DescriptorMatch};
use rayon::prelude::*;

/// Number of differing bits between two descriptors
#[inline]
pub fn hamming_distance(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// Brute-force Hamming matcher
pub struct BruteForceMatcher;

impl BruteForceMatcher {
    /// For every query descriptor, its `k` nearest train descriptors in ascending distance.
    ///
    /// Rows may hold fewer than `k` matches when `train` is short. Equal distances
    /// keep the lower train index first.
    pub fn knn_match(query: &[Descriptor], train: &[Descriptor], k: usize) -> Vec<Vec<DescriptorMatch>> {
        if k == 0 {
            return vec![Vec::new(); query.len()];
        }

        query
            .par_iter()
            .enumerate()
            .map(|(query_idx, q)| {
                let mut best: Vec<DescriptorMatch> = Vec::with_capacity(k + 1);
                for (train_idx, t) in train.iter().enumerate() {
                    let distance = hamming_distance(q, t);
                    if best.len() == k && best[k - 1].distance <= distance {
                        continue;
                    }
                    // Insert after every entry at the same distance so ties stay ordered by index
                    let pos = best.partition_point(|m| m.distance <= distance);
                    best.insert(pos, DescriptorMatch { query_idx, train_idx, distance });
                    best.truncate(k);
                }
                best
            })
            .collect()
    }

    /// Keep the nearest match of each row when it beats the second nearest by `ratio`.
    ///
    /// Rows with fewer than two candidates are dropped, since there is nothing to compare against.
    pub fn ratio_test(knn: &[Vec<DescriptorMatch>], ratio: f64) -> Vec<DescriptorMatch> {
        knn.iter()
            .filter_map(|row| match row.as_slice() {
                [first, second, ..] if (first.distance as f64) < ratio * second.distance as f64 => Some(*first),
                _ => None,
            })
            .collect()
    }

    /// Mutual nearest neighbours: `q -> t` survives only if `t`'s nearest query is `q`.
    ///
    /// Output is ordered by query index.
    pub fn cross_check_match(query: &[Descriptor], train: &[Descriptor]) -> Vec<DescriptorMatch> {
        let forward = Self::knn_match(query, train, 1);
        let backward = Self::knn_match(train, query, 1);

        forward
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .filter(|m| {
                backward[m.train_idx]
                    .first()
                    .map_or(false, |back| back.train_idx == m.query_idx)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn desc(fill: u8) -> Descriptor {
        [fill; 32]
    }

    fn with_bits(n: usize) -> Descriptor {
        let mut d = [0u8; 32];
        for i in 0..n {
            d[i / 8] |= 1 << (i % 8);
        }
        d
    }

    #[test]
    fn test_hamming_distance() {
        assert_eq!(hamming_distance(&desc(0), &desc(0)), 0);
        assert_eq!(hamming_distance(&desc(0), &desc(0xff)), 256);
        assert_eq!(hamming_distance(&with_bits(3), &with_bits(10)), 7);
    }

    #[test]
    fn test_knn_sorted_and_tie_break() {
        let query = vec![with_bits(0)];
        let train = vec![with_bits(5), with_bits(2), with_bits(2), with_bits(40)];
        let knn = BruteForceMatcher::knn_match(&query, &train, 2);

        assert_eq!(knn.len(), 1);
        let row = &knn[0];
        assert_eq!(row.len(), 2);
        assert_eq!((row[0].train_idx, row[0].distance), (1, 2));
        assert_eq!((row[1].train_idx, row[1].distance), (2, 2));
    }

    #[test]
    fn test_knn_short_train() {
        let knn = BruteForceMatcher::knn_match(&[desc(1), desc(2)], &[desc(3)], 2);
        assert!(knn.iter().all(|row| row.len() == 1));
        assert!(BruteForceMatcher::knn_match(&[desc(1)], &[], 2)[0].is_empty());
    }

    #[test]
    fn test_ratio_test_rejects_ambiguous() {
        let query = vec![with_bits(0), with_bits(100)];
        let train = vec![with_bits(1), with_bits(60), with_bits(99), with_bits(101)];
        let knn = BruteForceMatcher::knn_match(&query, &train, 2);
        let good = BruteForceMatcher::ratio_test(&knn, 0.75);

        // Query 0: 1 vs 59 is distinctive; query 1: 1 vs 1 is ambiguous
        assert_eq!(good.len(), 1);
        assert_eq!((good[0].query_idx, good[0].train_idx), (0, 0));
    }

    #[test]
    fn test_cross_check_is_mutual() {
        let query = vec![with_bits(0), with_bits(1), with_bits(200)];
        let train = vec![with_bits(0), with_bits(190)];
        let matches = BruteForceMatcher::cross_check_match(&query, &train);

        let pairs: Vec<(usize, usize)> = matches.iter().map(|m| (m.query_idx, m.train_idx)).collect();
        assert_eq!(pairs, vec![(0, 0), (2, 1)]);
    }

    proptest! {
        #[test]
        fn prop_knn_matches_linear_scan(
            query in prop::collection::vec(prop::array::uniform32(any::<u8>()), 1..8),
            train in prop::collection::vec(prop::array::uniform32(any::<u8>()), 1..16),
        ) {
            let knn = BruteForceMatcher::knn_match(&query, &train, 2);
            for (qi, row) in knn.iter().enumerate() {
                let mut all: Vec<(u32, usize)> = train
                    .iter()
                    .enumerate()
                    .map(|(ti, t)| (hamming_distance(&query[qi], t), ti))
                    .collect();
                all.sort();
                let expected: Vec<(u32, usize)> = all.into_iter().take(2).collect();
                let got: Vec<(u32, usize)> = row.iter().map(|m| (m.distance, m.train_idx)).collect();
                prop_assert_eq!(got, expected);
            }
        }
    }
}
