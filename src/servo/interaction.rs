use nalgebra as na;

use crate::error::{Result, ServoError};

/// Depth used for each point when building the interaction matrix.
#[derive(Debug, Clone, PartialEq)]
pub enum PointDepths {
    PerPoint(Vec<f64>),
    Uniform(f64),
}

impl PointDepths {
    /// Median of `depths` as a single uniform value.
    pub fn median_of(depths: &[f64]) -> Result<PointDepths> {
        median(depths).map(PointDepths::Uniform)
    }

    fn at(&self, i: usize) -> f64 {
        match self {
            PointDepths::PerPoint(z) => z[i],
            PointDepths::Uniform(z) => *z,
        }
    }

    fn check(&self, n: usize) -> Result<()> {
        let invalid = |z: f64| !(z.is_finite() && z > 0.0);
        match self {
            PointDepths::PerPoint(z) => {
                if z.len() != n {
                    return Err(ServoError::InputShapeMismatch(format!(
                        "{} points but {} depths",
                        n,
                        z.len()
                    )));
                }
                if let Some((i, d)) = z.iter().enumerate().find(|(_, d)| invalid(**d)) {
                    return Err(ServoError::DegenerateGeometry(format!(
                        "depth {} at point {} is not positive",
                        d, i
                    )));
                }
            }
            PointDepths::Uniform(z) => {
                if invalid(*z) {
                    return Err(ServoError::DegenerateGeometry(format!(
                        "uniform depth {} is not positive",
                        z
                    )));
                }
            }
        }
        Ok(())
    }
}

pub fn median(values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(ServoError::DegenerateGeometry(
            "median of an empty depth set".to_string(),
        ));
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    Ok(if sorted.len() % 2 == 0 {
        0.5 * (sorted[mid - 1] + sorted[mid])
    } else {
        sorted[mid]
    })
}

/// Two rows of the point-feature interaction matrix.
pub fn point_rows(x: f64, y: f64, z: f64) -> na::Matrix2x6<f64> {
    let iz = 1.0 / z;
    na::Matrix2x6::new(
        -iz,
        0.0,
        x * iz,
        x * y,
        -(1.0 + x * x),
        y,
        0.0,
        -iz,
        y * iz,
        1.0 + y * y,
        -x * y,
        -x,
    )
}

/// Stacks [`point_rows`] into a `2N×6` matrix for normalized points.
pub fn interaction_matrix(points: &[na::Vector2<f64>], depths: &PointDepths) -> Result<na::DMatrix<f64>> {
    depths.check(points.len())?;
    let mut l = na::DMatrix::zeros(2 * points.len(), 6);
    for (i, p) in points.iter().enumerate() {
        l.fixed_view_mut::<2, 6>(2 * i, 0)
            .copy_from(&point_rows(p.x, p.y, depths.at(i)));
    }
    Ok(l)
}
