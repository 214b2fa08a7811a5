use rayon::prelude::*;

use super::Feature;
use crate::error::{Result, ServoError};

/// A ratio-test survivor between a query (reference) and a train (current) feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: u32,
    pub second_distance: u32,
}

impl Match {
    /// Best over second-best distance; lower is more distinctive.
    pub fn ratio(&self) -> f32 {
        if self.second_distance == 0 {
            1.0
        } else {
            self.distance as f32 / self.second_distance as f32
        }
    }
}

/// Brute-force two-nearest-neighbour matcher with Lowe's ratio test.
#[derive(Debug, Clone, Copy)]
pub struct RatioMatcher {
    ratio: f32,
}

impl RatioMatcher {
    pub fn new(ratio: f32) -> Result<RatioMatcher> {
        if !(ratio.is_finite() && ratio > 0.0 && ratio <= 1.0) {
            return Err(ServoError::InvalidConfiguration(format!(
                "match ratio must be in (0, 1], got {}",
                ratio
            )));
        }
        Ok(RatioMatcher { ratio })
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    /// Matches are returned in query order. Queries with fewer than two
    /// candidates cannot pass the ratio test and are dropped.
    pub fn knn_match(&self, query: &[Feature], train: &[Feature]) -> Vec<Match> {
        if train.len() < 2 {
            return Vec::new();
        }
        query
            .par_iter()
            .enumerate()
            .filter_map(|(query_idx, q)| {
                let mut best = (u32::MAX, 0usize);
                let mut second = u32::MAX;
                for (train_idx, t) in train.iter().enumerate() {
                    let d = q.descriptor.distance(&t.descriptor);
                    if d < best.0 {
                        second = best.0;
                        best = (d, train_idx);
                    } else if d < second {
                        second = d;
                    }
                }
                if (best.0 as f32) < self.ratio * second as f32 {
                    Some(Match {
                        query_idx,
                        train_idx: best.1,
                        distance: best.0,
                        second_distance: second,
                    })
                } else {
                    None
                }
            })
            .collect()
    }
}
