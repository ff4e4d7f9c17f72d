//! Range-based tag localization
//!
//! The solver picks its model from the number of usable anchors:
//! - 2 anchors: intersection of two circles in the XY plane
//! - 3 anchors, or 4+ anchors that are nearly coplanar: linearized 2D least
//!   squares with the tag at the mean anchor height
//! - 4+ anchors spanning three dimensions: linearized 3D least squares
//!
//! Least-squares estimates are refined by Gauss-Newton on the range residuals.

use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::algorithms::gdop::geometric_dilution;
use crate::core::Point3;

/// Localization failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrilaterationError {
    #[error("{anchors} anchors but {distances} distances")]
    LengthMismatch { anchors: usize, distances: usize },
    #[error("insufficient anchors: {available} available, {required} required")]
    InsufficientAnchors { available: usize, required: usize },
    #[error("degenerate anchor geometry: {reason}")]
    DegenerateGeometry { reason: String },
    #[error("solver produced a non-finite position")]
    NumericalFailure,
}

/// Model used to obtain a fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolutionMode {
    TwoCircle,
    Planar,
    Spatial,
}

impl SolutionMode {
    fn dims(self) -> usize {
        match self {
            SolutionMode::Spatial => 3,
            _ => 2,
        }
    }
}

/// Localization result
#[derive(Debug, Clone, PartialEq)]
pub struct PositionFix {
    pub position: Point3,
    pub mode: SolutionMode,
    pub anchors_used: usize,
    /// Root mean square of (|p - anchor| - distance), meters
    pub residual_rms: f64,
    pub gdop: Option<f64>,
}

/// Trilateration engine
#[derive(Debug, Clone)]
pub struct Trilateration {
    /// Maximum Gauss-Newton iterations
    pub max_iterations: usize,
    /// Step length below which refinement stops (meters)
    pub convergence_tolerance: f64,
    /// Condition number above which 3D anchor layouts count as coplanar
    pub coplanar_condition_limit: f64,
    /// Condition number above which any layout counts as degenerate
    pub singular_condition_limit: f64,
}

impl Default for Trilateration {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            convergence_tolerance: 1e-6,
            coplanar_condition_limit: 1e4,
            singular_condition_limit: 1e10,
        }
    }
}

/// Localize with the default engine
pub fn trilaterate(anchors: &[Point3], distances: &[f64]) -> Result<PositionFix, TrilaterationError> {
    Trilateration::default().solve(anchors, distances)
}

impl Trilateration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimate the tag position from anchor coordinates and measured ranges
    pub fn solve(&self, anchors: &[Point3], distances: &[f64]) -> Result<PositionFix, TrilaterationError> {
        if anchors.len() != distances.len() {
            return Err(TrilaterationError::LengthMismatch {
                anchors: anchors.len(),
                distances: distances.len(),
            });
        }
        if anchors.len() < 2 {
            return Err(TrilaterationError::InsufficientAnchors {
                available: anchors.len(),
                required: 2,
            });
        }

        let (position, mode) = match anchors.len() {
            2 => (
                two_circle(&anchors[0], &anchors[1], distances[0], distances[1])?,
                SolutionMode::TwoCircle,
            ),
            3 => (self.planar(anchors, distances)?, SolutionMode::Planar),
            _ => match self.spatial(anchors, distances)? {
                Some(position) => (position, SolutionMode::Spatial),
                None => {
                    debug!("Anchors nearly coplanar, solving in the plane");
                    (self.planar(anchors, distances)?, SolutionMode::Planar)
                }
            },
        };

        let position = match mode {
            SolutionMode::TwoCircle => position,
            _ => self.refine(anchors, distances, position, mode.dims()),
        };

        if !position.iter().all(|v| v.is_finite()) {
            return Err(TrilaterationError::NumericalFailure);
        }

        Ok(PositionFix {
            position,
            mode,
            anchors_used: anchors.len(),
            residual_rms: residual_rms(anchors, distances, &position),
            gdop: geometric_dilution(anchors, &position, mode.dims()),
        })
    }

    /// Differences against the first anchor, XY unknowns, tag at mean anchor height
    fn planar(&self, anchors: &[Point3], distances: &[f64]) -> Result<Point3, TrilaterationError> {
        let (a, b) = linearize(anchors, distances, 2);
        let solution = self.least_squares(a, b)?.ok_or_else(|| TrilaterationError::DegenerateGeometry {
            reason: "anchors are collinear".to_string(),
        })?;
        Ok(Point3::new(solution[0], solution[1], mean_height(anchors)))
    }

    /// Differences against the first anchor in three unknowns.
    /// Ok(None) when the layout does not span three dimensions.
    fn spatial(&self, anchors: &[Point3], distances: &[f64]) -> Result<Option<Point3>, TrilaterationError> {
        let (a, b) = linearize(anchors, distances, 3);
        if condition_number(&a) > self.coplanar_condition_limit {
            return Ok(None);
        }
        Ok(self
            .least_squares(a, b)?
            .map(|s| Point3::new(s[0], s[1], s[2])))
    }

    /// Ok(None) for singular systems
    fn least_squares(&self, a: DMatrix<f64>, b: DVector<f64>) -> Result<Option<DVector<f64>>, TrilaterationError> {
        if condition_number(&a) > self.singular_condition_limit {
            return Ok(None);
        }
        let svd = a.svd(true, true);
        let solution = svd
            .solve(&b, 1e-12)
            .map_err(|reason| TrilaterationError::DegenerateGeometry {
                reason: reason.to_string(),
            })?;
        Ok(Some(solution))
    }

    /// Gauss-Newton on r_i = |p - a_i| - d_i over the first `dims` axes.
    /// Keeps the initial estimate if refinement does not lower the residual.
    fn refine(&self, anchors: &[Point3], distances: &[f64], initial: Point3, dims: usize) -> Point3 {
        let mut position = initial;

        for _ in 0..self.max_iterations {
            let mut jacobian = DMatrix::zeros(anchors.len(), dims);
            let mut residuals = DVector::zeros(anchors.len());
            for (row, (anchor, distance)) in anchors.iter().zip(distances).enumerate() {
                let offset = position - anchor;
                let range = offset.norm();
                if range < 1e-9 {
                    return best_of(anchors, distances, initial, position);
                }
                for col in 0..dims {
                    jacobian[(row, col)] = offset[col] / range;
                }
                residuals[row] = range - distance;
            }

            let step = match jacobian.svd(true, true).solve(&(-residuals), 1e-12) {
                Ok(step) => step,
                Err(_) => break,
            };
            for col in 0..dims {
                position[col] += step[col];
            }
            if step.norm() < self.convergence_tolerance {
                break;
            }
        }

        best_of(anchors, distances, initial, position)
    }
}

fn best_of(anchors: &[Point3], distances: &[f64], initial: Point3, refined: Point3) -> Point3 {
    let refined_ok = refined.iter().all(|v| v.is_finite());
    if refined_ok && residual_rms(anchors, distances, &refined) <= residual_rms(anchors, distances, &initial) {
        refined
    } else {
        initial
    }
}

/// Two-circle intersection in the XY plane. Of the two crossings the one on
/// the left of A→B is returned. Circles that do not meet give the point where
/// their radical line crosses A→B, which lies beyond both circles when one
/// contains the other.
fn two_circle(a: &Point3, b: &Point3, ra: f64, rb: f64) -> Result<Point3, TrilaterationError> {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let d = (dx * dx + dy * dy).sqrt();
    if d < 1e-9 {
        return Err(TrilaterationError::DegenerateGeometry {
            reason: "anchors share the same XY position".to_string(),
        });
    }

    let (ux, uy) = (dx / d, dy / d);
    let along = (d * d + ra * ra - rb * rb) / (2.0 * d);
    let across = (ra * ra - along * along).max(0.0).sqrt();

    Ok(Point3::new(
        a.x + ux * along - uy * across,
        a.y + uy * along + ux * across,
        (a.z + b.z) / 2.0,
    ))
}

/// Rows 2(aᵢ - a₀) and right-hand side d₀² - dᵢ² + |aᵢ|² - |a₀|² for the first `dims` axes
fn linearize(anchors: &[Point3], distances: &[f64], dims: usize) -> (DMatrix<f64>, DVector<f64>) {
    let p0 = anchors[0];
    let mut a = DMatrix::zeros(anchors.len() - 1, dims);
    let mut b = DVector::zeros(anchors.len() - 1);

    for (row, (pi, di)) in anchors.iter().zip(distances).enumerate().skip(1).map(|(i, v)| (i - 1, v)) {
        for col in 0..dims {
            a[(row, col)] = 2.0 * (pi[col] - p0[col]);
        }
        b[row] = distances[0].powi(2) - di.powi(2) + pi.norm_squared() - p0.norm_squared();
    }

    (a, b)
}

fn condition_number(a: &DMatrix<f64>) -> f64 {
    let singular_values = a.clone().svd(false, false).singular_values;
    let max = singular_values.max();
    let min = singular_values.min();
    if min <= f64::EPSILON * max.max(1.0) {
        f64::INFINITY
    } else {
        max / min
    }
}

fn mean_height(anchors: &[Point3]) -> f64 {
    anchors.iter().map(|p| p.z).sum::<f64>() / anchors.len() as f64
}

fn residual_rms(anchors: &[Point3], distances: &[f64], position: &Point3) -> f64 {
    let sum: f64 = anchors
        .iter()
        .zip(distances)
        .map(|(anchor, distance)| ((position - anchor).norm() - distance).powi(2))
        .sum();
    (sum / anchors.len() as f64).sqrt()
}
