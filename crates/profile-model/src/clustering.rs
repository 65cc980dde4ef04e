//! Small k-means used to group songs for explanations.

use crate::error::Result;
use agents::math::euclidean_distance;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeans {
    pub clusters: usize,
    pub iterations: usize,
    pub centroids: Vec<Vec<f64>>,
}

impl KMeans {
    pub fn new(clusters: usize, iterations: usize) -> Self {
        Self {
            clusters: clusters.max(1),
            iterations,
            centroids: Vec::new(),
        }
    }

    /// With fewer points than clusters every point becomes its own centroid.
    pub fn fit<R: Rng + ?Sized>(&mut self, points: &[Vec<f64>], rng: &mut R) -> Result<()> {
        if points.len() < self.clusters {
            self.centroids = points.to_vec();
            return Ok(());
        }

        self.centroids = rand::seq::index::sample(rng, points.len(), self.clusters)
            .into_iter()
            .map(|i| points[i].clone())
            .collect();

        for _ in 0..self.iterations {
            let mut sums: Vec<Vec<f64>> = self.centroids.iter().map(|c| vec![0.0; c.len()]).collect();
            let mut counts = vec![0usize; self.centroids.len()];

            for point in points {
                let nearest = self.nearest(point)?;
                counts[nearest] += 1;
                for (s, v) in sums[nearest].iter_mut().zip(point) {
                    *s += v;
                }
            }

            // empty clusters keep their previous centroid
            for ((centroid, sum), count) in self.centroids.iter_mut().zip(sums).zip(&counts) {
                if *count > 0 {
                    *centroid = sum.into_iter().map(|s| s / *count as f64).collect();
                }
            }
        }
        Ok(())
    }

    /// Nearest centroid, 0 before fitting.
    pub fn predict(&self, point: &[f64]) -> Result<usize> {
        if self.centroids.is_empty() {
            return Ok(0);
        }
        self.nearest(point)
    }

    fn nearest(&self, point: &[f64]) -> Result<usize> {
        let mut best = (0, f64::INFINITY);
        for (i, centroid) in self.centroids.iter().enumerate() {
            let d = euclidean_distance(point, centroid)?;
            if d < best.1 {
                best = (i, d);
            }
        }
        Ok(best.0)
    }

    pub fn is_fitted(&self) -> bool {
        !self.centroids.is_empty()
    }
}
