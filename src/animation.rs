//! Per-frame animation of the quad's uniform color.

/// Bounces the red channel of a color between 0 and 1.
///
/// The bound check happens before the step, so red overshoots a bound by at
/// most one step before turning around.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorPulse {
    color: [f32; 4],
    step: f32,
    increment: f32,
}

impl ColorPulse {
    pub fn new(color: [f32; 4], step: f32) -> Self {
        let step = step.abs();
        Self {
            color,
            step,
            increment: step,
        }
    }

    /// The color to upload for the current frame.
    pub fn current(&self) -> [f32; 4] {
        self.color
    }

    /// Moves red one step, turning around once it has left `[0, 1]`.
    pub fn advance(&mut self) {
        let red = self.color[0];
        if red > 1.0 {
            self.increment = -self.step;
        } else if red < 0.0 {
            self.increment = self.step;
        }
        self.color[0] = red + self.increment;
    }
}

impl Default for ColorPulse {
    fn default() -> Self {
        Self::new([0.2, 0.3, 0.8, 1.0], 0.05)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_red_moves() {
        let mut pulse = ColorPulse::default();
        pulse.advance();
        let [r, g, b, a] = pulse.current();
        assert!((r - 0.25).abs() < 1e-6);
        assert_eq!([g, b, a], [0.3, 0.8, 1.0]);
    }

    #[test]
    fn test_turns_around_after_leaving_range() {
        let mut pulse = ColorPulse::new([0.98, 0.0, 0.0, 1.0], 0.05);
        pulse.advance();
        assert!(pulse.current()[0] > 1.0);
        pulse.advance();
        assert!((pulse.current()[0] - 0.98).abs() < 1e-6);
    }

    #[test]
    fn test_stays_within_one_step_of_range() {
        let mut pulse = ColorPulse::default();
        let mut rising = 0;
        let mut falling = 0;
        for _ in 0..1000 {
            let before = pulse.current()[0];
            pulse.advance();
            let after = pulse.current()[0];
            assert!((-0.05 - 1e-4..=1.05 + 1e-4).contains(&after));
            if after > before {
                rising += 1;
            } else {
                falling += 1;
            }
        }
        assert!(rising > 0 && falling > 0);
    }
}
