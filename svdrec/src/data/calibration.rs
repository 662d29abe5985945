use std::collections::HashMap;

use svdcore::{SensorId, Side};

/// Strip noise lookup, in ADC counts.
pub trait NoiseSource: Send + Sync {
    fn noise(&self, sensor: SensorId, side: Side, strip: usize) -> Option<f32>;
}

/// Same noise on every strip of every sensor.
#[derive(Clone, Copy, Debug)]
pub struct ConstantNoise(pub f32);

impl NoiseSource for ConstantNoise {
    fn noise(&self, _sensor: SensorId, _side: Side, _strip: usize) -> Option<f32> {
        Some(self.0)
    }
}

/// Per-strip noise table with an optional fallback for strips that are not listed.
#[derive(Clone, Debug, Default)]
pub struct NoiseTable {
    table: HashMap<(SensorId, Side, usize), f32>,
    fallback: Option<f32>,
}

impl NoiseTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(fallback: f32) -> Self {
        NoiseTable { table: HashMap::new(), fallback: Some(fallback) }
    }

    pub fn insert(&mut self, sensor: SensorId, side: Side, strip: usize, noise: f32) {
        self.table.insert((sensor, side, strip), noise);
    }

    /// Number of strips with an explicit entry.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// All explicit entries, sorted by sensor, side and strip.
    pub fn entries(&self) -> Vec<(SensorId, Side, usize, f32)> {
        let mut out: Vec<(SensorId, Side, usize, f32)> =
            self.table.iter().map(|(&(sensor, side, strip), &n)| (sensor, side, strip, n)).collect();
        out.sort_by(|a, b| (a.0, a.1, a.2).cmp(&(b.0, b.1, b.2)));
        out
    }
}

impl NoiseSource for NoiseTable {
    fn noise(&self, sensor: SensorId, side: Side, strip: usize) -> Option<f32> {
        self.table.get(&(sensor, side, strip)).copied().or(self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_fallback() {
        let id = SensorId::new(3, 1, 1);
        let mut table = NoiseTable::new();
        table.insert(id, Side::U, 10, 2.5);

        assert_eq!(table.noise(id, Side::U, 10), Some(2.5));
        assert_eq!(table.noise(id, Side::U, 9), None);
        assert_eq!(table.noise(id, Side::V, 10), None);
        assert_eq!(table.len(), 1);

        let mut with_fallback = NoiseTable::with_fallback(4.0);
        with_fallback.insert(id, Side::V, 0, 1.0);
        assert_eq!(with_fallback.noise(id, Side::V, 0), Some(1.0));
        assert_eq!(with_fallback.noise(id, Side::U, 100), Some(4.0));
    }

    #[test]
    fn test_entries_sorted() {
        let a = SensorId::new(3, 1, 1);
        let b = SensorId::new(4, 1, 1);
        let mut table = NoiseTable::new();
        table.insert(b, Side::U, 0, 1.0);
        table.insert(a, Side::V, 3, 2.0);
        table.insert(a, Side::U, 5, 3.0);

        let entries = table.entries();
        assert_eq!(entries[0], (a, Side::U, 5, 3.0));
        assert_eq!(entries[1], (a, Side::V, 3, 2.0));
        assert_eq!(entries[2], (b, Side::U, 0, 1.0));
    }

    #[test]
    fn test_sparse_strip_indices() {
        let id = SensorId::new(3, 1, 1);
        let mut table = NoiseTable::new();
        table.insert(id, Side::U, 1usize << 40, 2.0);
        table.insert(id, Side::U, usize::MAX, 3.0);
        table.insert(id, Side::U, 1usize << 40, 2.5);

        assert_eq!(table.len(), 2);
        assert_eq!(table.noise(id, Side::U, 1usize << 40), Some(2.5));
        assert_eq!(table.noise(id, Side::U, usize::MAX), Some(3.0));
        assert_eq!(table.entries().last(), Some(&(id, Side::U, usize::MAX, 3.0)));
    }
}
