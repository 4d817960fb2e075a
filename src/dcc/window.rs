use crate::error::DccError;

/// Ring of the most recent occupancy samples.
///
/// The first fill appends; once full, the oldest sample is overwritten.
#[derive(Debug, Clone, Default)]
pub struct OccupancyWindow {
    capacity: usize,
    samples: Vec<f64>,
    write_cursor: Option<usize>,
}

impl OccupancyWindow {
    pub fn new(capacity: usize) -> Self {
        let mut window = Self::default();
        window.reset(capacity);
        window
    }

    /// Clear all samples and set a new capacity. Zero leaves the window unconfigured.
    pub fn reset(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.samples = Vec::with_capacity(capacity);
        self.write_cursor = None;
    }

    pub fn insert(&mut self, value: f64) -> Result<(), DccError> {
        if self.capacity == 0 {
            return Err(DccError::UnconfiguredWindow);
        }
        if !value.is_finite() {
            return Err(DccError::NonFiniteSample(value));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(DccError::SampleOutOfRange(value));
        }

        let cursor = match self.write_cursor {
            None if self.samples.len() < self.capacity => {
                self.samples.push(value);
                return Ok(());
            }
            None => 0,
            Some(cursor) => cursor,
        };
        self.samples[cursor] = value;
        self.write_cursor = Some((cursor + 1) % self.capacity);
        Ok(())
    }

    pub fn min(&self) -> Result<f64, DccError> {
        self.samples
            .iter()
            .copied()
            .reduce(f64::min)
            .ok_or(DccError::EmptyWindow)
    }

    pub fn max(&self) -> Result<f64, DccError> {
        self.samples
            .iter()
            .copied()
            .reduce(f64::max)
            .ok_or(DccError::EmptyWindow)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.samples.len() == self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_latest_capacity_samples() -> Result<(), DccError> {
        let mut window = OccupancyWindow::new(3);
        let values = [0.9, 0.1, 0.5, 0.3, 0.4, 0.35, 0.2];

        for (index, value) in values.iter().enumerate() {
            window.insert(*value)?;
            let start = (index + 1).saturating_sub(3);
            let recent = &values[start..=index];
            let expected_min = recent.iter().copied().fold(f64::INFINITY, f64::min);
            let expected_max = recent.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            assert_eq!(window.min()?, expected_min);
            assert_eq!(window.max()?, expected_max);
            assert_eq!(window.len(), recent.len());
        }
        assert!(window.is_full());
        Ok(())
    }

    #[test]
    fn single_slot_window_tracks_last_value() -> Result<(), DccError> {
        let mut window = OccupancyWindow::new(1);
        window.insert(0.7)?;
        window.insert(0.2)?;
        assert_eq!(window.min()?, 0.2);
        assert_eq!(window.max()?, 0.2);
        assert_eq!(window.len(), 1);
        Ok(())
    }

    #[test]
    fn zero_capacity_rejects_inserts() {
        let mut window = OccupancyWindow::new(0);
        assert_eq!(window.insert(0.5), Err(DccError::UnconfiguredWindow));
    }

    #[test]
    fn empty_window_has_no_extremes() {
        let window = OccupancyWindow::new(4);
        assert_eq!(window.min(), Err(DccError::EmptyWindow));
        assert_eq!(window.max(), Err(DccError::EmptyWindow));
    }

    #[test]
    fn reset_discards_history() -> Result<(), DccError> {
        let mut window = OccupancyWindow::new(2);
        window.insert(0.8)?;
        window.insert(0.6)?;
        window.insert(0.1)?;

        window.reset(5);
        assert!(window.is_empty());
        assert_eq!(window.capacity(), 5);
        window.insert(0.3)?;
        assert_eq!(window.max()?, 0.3);
        Ok(())
    }

    #[test]
    fn non_finite_samples_are_rejected() {
        let mut window = OccupancyWindow::new(2);
        assert!(matches!(
            window.insert(f64::NAN),
            Err(DccError::NonFiniteSample(_))
        ));
        assert!(window.is_empty());
    }

    #[test]
    fn ratios_outside_unit_interval_are_rejected() -> Result<(), DccError> {
        let mut window = OccupancyWindow::new(2);
        window.insert(0.4)?;

        assert_eq!(window.insert(1.5), Err(DccError::SampleOutOfRange(1.5)));
        assert_eq!(window.insert(-0.1), Err(DccError::SampleOutOfRange(-0.1)));
        assert_eq!(window.len(), 1);
        assert_eq!(window.max()?, 0.4);
        Ok(())
    }
}
