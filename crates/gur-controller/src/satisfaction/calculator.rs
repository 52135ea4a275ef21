//! Satisfaction: s = clamp(20 + 80 · exp(−k · (observed − target)²), 0, 100)

/// Residual reward at maximal deviation
pub const SATISFACTION_FLOOR: f64 = 20.0;

/// Reward when observed load equals the target
pub const SATISFACTION_CEILING: f64 = 100.0;

/// Decay constant suited to 5-minute windows
pub const DEFAULT_DECAY: f64 = 0.02;

/// Gaussian satisfaction curve around the target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SatisfactionFn {
    /// Penalty decay `k`; wider windows want a smaller value (0.002 for 15-30 min)
    decay: f64,
}

impl SatisfactionFn {
    pub fn new(decay: f64) -> Self {
        Self { decay }
    }

    pub fn decay(&self) -> f64 {
        self.decay
    }

    /// Score in [20, 100], rounded to two decimals
    pub fn score(&self, observed: u32, target: u32) -> f64 {
        let deviation = f64::from(observed) - f64::from(target);
        let raw = SATISFACTION_FLOOR
            + (SATISFACTION_CEILING - SATISFACTION_FLOOR) * (-self.decay * deviation * deviation).exp();
        let clamped = raw.clamp(0.0, SATISFACTION_CEILING);
        (clamped * 100.0).round() / 100.0
    }

    /// Observed load exceeds the target
    pub fn is_overload(observed: u32, target: u32) -> bool {
        observed > target
    }
}

impl Default for SatisfactionFn {
    fn default() -> Self {
        Self::new(DEFAULT_DECAY)
    }
}
