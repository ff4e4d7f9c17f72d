//! Geometric dilution of precision for a solved tag position

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::core::Point3;

/// Quality classes for GDOP values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryQuality {
    Excellent,
    Good,
    Moderate,
    Fair,
    Poor,
}

impl GeometryQuality {
    const THRESHOLDS: [f64; 4] = [2.0, 5.0, 10.0, 20.0];

    pub fn from_gdop(gdop: f64) -> Self {
        match gdop {
            g if g <= Self::THRESHOLDS[0] => GeometryQuality::Excellent,
            g if g <= Self::THRESHOLDS[1] => GeometryQuality::Good,
            g if g <= Self::THRESHOLDS[2] => GeometryQuality::Moderate,
            g if g <= Self::THRESHOLDS[3] => GeometryQuality::Fair,
            _ => GeometryQuality::Poor,
        }
    }
}

/// sqrt(trace((HᵀH)⁻¹)) where H holds the unit line-of-sight vectors from each
/// anchor to `position`, restricted to the first `dims` axes (2 or 3).
///
/// Returns `None` when the geometry is singular or the tag sits on an anchor.
pub fn geometric_dilution(anchors: &[Point3], position: &Point3, dims: usize) -> Option<f64> {
    if !(2..=3).contains(&dims) || anchors.len() < dims {
        return None;
    }

    let mut h = DMatrix::zeros(anchors.len(), dims);
    for (row, anchor) in anchors.iter().enumerate() {
        let line_of_sight = position - anchor;
        let range = line_of_sight.norm();
        if range < 1e-9 {
            return None;
        }
        for col in 0..dims {
            h[(row, col)] = line_of_sight[col] / range;
        }
    }

    let inverse = (h.transpose() * &h).try_inverse()?;
    let trace = inverse.trace();
    if !trace.is_finite() || trace <= 0.0 {
        return None;
    }
    Some(trace.sqrt())
}
