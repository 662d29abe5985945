use std::fmt;
use serde::{Deserialize, Serialize};

/// Identifies one silicon sensor by its position in the barrel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SensorId {
    pub layer: u8,
    pub ladder: u8,
    pub sensor: u8,
}

impl SensorId {
    pub fn new(layer: u8, ladder: u8, sensor: u8) -> Self {
        SensorId { layer, ladder, sensor }
    }

    /// Pack into a single integer: 8 bits layer, 8 bits ladder, 8 bits sensor.
    pub fn to_packed(&self) -> u32 {
        ((self.layer as u32) << 16) | ((self.ladder as u32) << 8) | self.sensor as u32
    }

    pub fn from_packed(packed: u32) -> Self {
        SensorId {
            layer: ((packed >> 16) & 0xff) as u8,
            ladder: ((packed >> 8) & 0xff) as u8,
            sensor: (packed & 0xff) as u8,
        }
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.layer, self.ladder, self.sensor)
    }
}

/// Readout view of a double-sided strip sensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    U,
    V,
}

impl Side {
    pub fn from_is_u(is_u: bool) -> Self {
        if is_u { Side::U } else { Side::V }
    }

    pub fn is_u(&self) -> bool {
        matches!(self, Side::U)
    }

    pub fn both() -> [Side; 2] {
        [Side::U, Side::V]
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::U => write!(f, "U"),
            Side::V => write!(f, "V"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_id() {
        let id = SensorId::new(4, 7, 2);
        assert_eq!(SensorId::from_packed(id.to_packed()), id);
        assert_eq!(id.to_string(), "4.7.2");
    }

    #[test]
    fn test_side_flag() {
        assert_eq!(Side::from_is_u(true), Side::U);
        assert!(!Side::V.is_u());
        assert!(Side::U < Side::V);
    }
}
