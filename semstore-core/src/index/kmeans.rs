//! K-means clustering with k-means++ seeding.
//!
//! Used both for IVF partitioning and for training product-quantization
//! codebooks. Seeded so that rebuilding an index over the same rows yields
//! the same partitions.

use rand::rngs::StdRng;
use rand::Rng;

use crate::distance::euclidean_distance_squared;

/// Index of the centroid nearest to `point` (squared L2).
pub fn nearest_centroid(centroids: &[Vec<f32>], point: &[f32]) -> usize {
    let mut best = 0;
    let mut best_dist = f32::MAX;
    for (i, c) in centroids.iter().enumerate() {
        let d = euclidean_distance_squared(c, point);
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    best
}

/// Clusters `points` into `k` centroids.
///
/// When there are no more points than centroids, every point becomes its own
/// centroid and the result has `points.len()` entries.
pub fn kmeans(points: &[&[f32]], k: usize, max_iterations: usize, rng: &mut StdRng) -> Vec<Vec<f32>> {
    let n = points.len();
    if n == 0 || k == 0 {
        return Vec::new();
    }
    if n <= k {
        return points.iter().map(|p| p.to_vec()).collect();
    }

    let dim = points[0].len();
    let mut centroids = seed_plus_plus(points, k, rng);
    let mut assignments = vec![usize::MAX; n];

    for _ in 0..max_iterations {
        let mut changed = false;
        for (i, p) in points.iter().enumerate() {
            let c = nearest_centroid(&centroids, p);
            if assignments[i] != c {
                assignments[i] = c;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = vec![vec![0.0f32; dim]; k];
        let mut counts = vec![0usize; k];
        for (i, p) in points.iter().enumerate() {
            let c = assignments[i];
            counts[c] += 1;
            for (s, v) in sums[c].iter_mut().zip(p.iter()) {
                *s += v;
            }
        }
        for c in 0..k {
            // Empty clusters keep their previous centroid.
            if counts[c] > 0 {
                let inv = 1.0 / counts[c] as f32;
                centroids[c] = sums[c].iter().map(|s| s * inv).collect();
            }
        }
    }

    centroids
}

fn seed_plus_plus(points: &[&[f32]], k: usize, rng: &mut StdRng) -> Vec<Vec<f32>> {
    let n = points.len();
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.gen_range(0..n)].to_vec());

    let mut min_dist: Vec<f32> = points
        .iter()
        .map(|p| euclidean_distance_squared(p, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f32 = min_dist.iter().sum();
        let next = if total <= 0.0 {
            // All remaining points coincide with a centroid.
            rng.gen_range(0..n)
        } else {
            let mut target = rng.gen::<f32>() * total;
            let mut chosen = n - 1;
            for (i, d) in min_dist.iter().enumerate() {
                if target < *d {
                    chosen = i;
                    break;
                }
                target -= d;
            }
            chosen
        };

        let centroid = points[next].to_vec();
        for (i, p) in points.iter().enumerate() {
            let d = euclidean_distance_squared(p, &centroid);
            if d < min_dist[i] {
                min_dist[i] = d;
            }
        }
        centroids.push(centroid);
    }

    centroids
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_two_clear_clusters() {
        let data: Vec<Vec<f32>> = (0..20)
            .map(|i| {
                if i % 2 == 0 {
                    vec![0.0 + i as f32 * 0.001, 0.0]
                } else {
                    vec![10.0 + i as f32 * 0.001, 10.0]
                }
            })
            .collect();
        let points: Vec<&[f32]> = data.iter().map(|v| v.as_slice()).collect();
        let mut rng = StdRng::seed_from_u64(7);

        let centroids = kmeans(&points, 2, 25, &mut rng);
        assert_eq!(centroids.len(), 2);

        let a = nearest_centroid(&centroids, &[0.0, 0.0]);
        let b = nearest_centroid(&centroids, &[10.0, 10.0]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_fewer_points_than_clusters() {
        let data = [vec![1.0, 2.0], vec![3.0, 4.0]];
        let points: Vec<&[f32]> = data.iter().map(|v| v.as_slice()).collect();
        let mut rng = StdRng::seed_from_u64(1);
        let centroids = kmeans(&points, 8, 10, &mut rng);
        assert_eq!(centroids.len(), 2);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let data: Vec<Vec<f32>> = (0..50).map(|i| vec![(i as f32).sin(), (i as f32).cos()]).collect();
        let points: Vec<&[f32]> = data.iter().map(|v| v.as_slice()).collect();

        let a = kmeans(&points, 4, 20, &mut StdRng::seed_from_u64(42));
        let b = kmeans(&points, 4, 20, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }
}
