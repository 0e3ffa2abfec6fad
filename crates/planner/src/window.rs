use crate::error::PlanError;
use model::core::timestamp::{self, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The global, closed time range `[mint, maxt]` requested for migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    mint: Timestamp,
    maxt: Timestamp,
}

impl Window {
    pub fn new(mint: Timestamp, maxt: Timestamp) -> Result<Self, PlanError> {
        if mint > maxt {
            return Err(PlanError::InvalidWindow { mint, maxt });
        }
        Ok(Self { mint, maxt })
    }

    pub fn mint(&self) -> Timestamp {
        self.mint
    }

    pub fn maxt(&self) -> Timestamp {
        self.maxt
    }

    /// Closed-closed containment check.
    pub fn contains(&self, mint: Timestamp, maxt: Timestamp) -> bool {
        mint >= self.mint && maxt <= self.maxt
    }

    /// Number of millisecond instants covered by the window. Widened so the
    /// full `i64` range cannot overflow.
    pub(crate) fn instants(&self) -> i128 {
        self.maxt as i128 - self.mint as i128 + 1
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}]",
            timestamp::display(self.mint),
            timestamp::display(self.maxt)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_window() {
        assert_eq!(
            Window::new(10, 9),
            Err(PlanError::InvalidWindow { mint: 10, maxt: 9 })
        );
    }

    #[test]
    fn zero_width_window_is_valid() {
        let window = Window::new(7, 7).unwrap();
        assert_eq!(window.instants(), 1);
        assert!(window.contains(7, 7));
        assert!(!window.contains(6, 7));
        assert!(!window.contains(7, 8));
    }

    #[test]
    fn instants_do_not_overflow() {
        let window = Window::new(i64::MIN, i64::MAX).unwrap();
        assert_eq!(window.instants(), 1i128 << 64);
    }
}
