//! Core data types for the positioning pipeline

use nalgebra::Vector3;

use super::constants::{ANCHOR_SLOTS, UNDEPLOYED_ANCHOR_Z};

/// Cartesian point in the anchor frame (meters)
pub type Point3 = Vector3<f64>;

/// Anchor slot as configured by the user
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorSlot {
    pub index: usize,
    pub position: Option<Point3>,
}

impl AnchorSlot {
    pub fn new(index: usize, position: Option<Point3>) -> Self {
        Self { index, position }
    }

    /// A slot with no coordinates, or with the sentinel height, takes no part in localization
    pub fn deployed_position(&self) -> Option<Point3> {
        self.position
            .filter(|p| (p.z - UNDEPLOYED_ANCHOR_Z).abs() > 1e-9)
    }
}

/// Decoded measurement line, before localization
#[derive(Debug, Clone, PartialEq)]
pub struct UwbReading {
    /// Module clock (seconds)
    pub device_time: f64,
    pub distances: [Option<f64>; ANCHOR_SLOTS],
    pub acc: [f64; 3],
    pub gyro: [f64; 3],
    pub mag: [f64; 3],
    /// pitch, roll, yaw
    pub angle: [f64; 3],
    pub tag_id: String,
}

impl UwbReading {
    pub fn present_distances(&self) -> usize {
        self.distances.iter().filter(|d| d.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undeployed_slot() {
        let slot = AnchorSlot::new(2, Some(Point3::new(1.0, 2.0, UNDEPLOYED_ANCHOR_Z)));
        assert!(slot.deployed_position().is_none());

        let slot = AnchorSlot::new(0, Some(Point3::new(1.0, 2.0, 0.5)));
        assert_eq!(slot.deployed_position(), Some(Point3::new(1.0, 2.0, 0.5)));

        assert!(AnchorSlot::new(1, None).deployed_position().is_none());
    }
}
