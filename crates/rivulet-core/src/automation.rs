//! Control automation kept per audio channel: named lanes of breakpoints
//! read by recalls when a tick starts.

/// One breakpoint of an automation lane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Acceleration {
    /// Position in ticks.
    pub x: u32,
    /// Control value at `x`.
    pub value: f32,
}

impl Acceleration {
    /// Creates a breakpoint.
    pub fn new(x: u32, value: f32) -> Self {
        Self { x, value }
    }
}

/// Automation of one control on one audio channel, breakpoints sorted by `x`.
#[derive(Clone, Debug, PartialEq)]
pub struct Automation {
    /// Audio channel the lane belongs to.
    pub audio_channel: usize,
    /// Name of the automated control.
    pub control: String,
    points: Vec<Acceleration>,
}

impl Automation {
    /// Creates an empty lane.
    pub fn new(audio_channel: usize, control: impl Into<String>) -> Self {
        Self {
            audio_channel,
            control: control.into(),
            points: Vec::new(),
        }
    }

    /// Builder form of [`Automation::add`].
    #[must_use]
    pub fn with_point(mut self, x: u32, value: f32) -> Self {
        self.add(Acceleration::new(x, value));
        self
    }

    /// Inserts a breakpoint, replacing any existing one at the same `x`.
    pub fn add(&mut self, point: Acceleration) {
        match self.points.binary_search_by_key(&point.x, |p| p.x) {
            Ok(at) => self.points[at] = point,
            Err(at) => self.points.insert(at, point),
        }
    }

    /// Removes the breakpoint at `x`. Returns `false` if there was none.
    pub fn remove(&mut self, x: u32) -> bool {
        match self.points.binary_search_by_key(&x, |p| p.x) {
            Ok(at) => {
                self.points.remove(at);
                true
            }
            Err(_) => false,
        }
    }

    /// Breakpoints sorted by position.
    pub fn points(&self) -> &[Acceleration] {
        &self.points
    }

    /// Value at `x`: linear between breakpoints, held flat before the first
    /// and after the last. `None` for an empty lane.
    pub fn value_at(&self, x: u32) -> Option<f32> {
        let after = self.points.partition_point(|p| p.x <= x);
        match (after.checked_sub(1).map(|i| self.points[i]), self.points.get(after)) {
            (Some(a), Some(b)) => {
                #[allow(clippy::cast_precision_loss)]
                let t = (x - a.x) as f32 / (b.x - a.x) as f32;
                Some(a.value + (b.value - a.value) * t)
            }
            (Some(a), None) => Some(a.value),
            (None, Some(b)) => Some(b.value),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_stay_sorted_and_unique() {
        let lane = Automation::new(0, "gain")
            .with_point(8, 1.0)
            .with_point(0, 0.0)
            .with_point(8, 0.5);
        let xs: Vec<u32> = lane.points().iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![0, 8]);
        assert_eq!(lane.points()[1].value, 0.5);
    }

    #[test]
    fn value_interpolates_and_holds() {
        let lane = Automation::new(0, "gain").with_point(2, 0.0).with_point(6, 1.0);
        assert_eq!(lane.value_at(0), Some(0.0));
        assert_eq!(lane.value_at(4), Some(0.5));
        assert_eq!(lane.value_at(6), Some(1.0));
        assert_eq!(lane.value_at(100), Some(1.0));
        assert_eq!(Automation::new(0, "gain").value_at(3), None);
    }

    #[test]
    fn remove_reports_missing_point() {
        let mut lane = Automation::new(1, "pan").with_point(3, 0.2);
        assert!(!lane.remove(4));
        assert!(lane.remove(3));
        assert!(lane.points().is_empty());
    }
}
