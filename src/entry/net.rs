use super::error::EntryError;
use serde::Serialize;

/// How many wrong answers cancel one correct answer. Always positive and finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PenaltyDivisor(f64);

impl PenaltyDivisor {
    pub const DEFAULT: f64 = 4.0;

    pub fn new(value: f64) -> Result<Self, EntryError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(EntryError::InvalidConfiguration(value));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

/// `max(0, correct - wrong / divisor)`, unrounded.
pub fn compute_net(correct: u32, wrong: u32, divisor: PenaltyDivisor) -> f64 {
    let net = f64::from(correct) - f64::from(wrong) / divisor.get();
    net.max(0.0)
}

#[cfg(test)]
pub fn compute_net_checked(correct: u32, wrong: u32, divisor: f64) -> Result<f64, EntryError> {
    Ok(compute_net(correct, wrong, PenaltyDivisor::new(divisor)?))
}
