//! Soft and hard deadlines for the analysis.
//!
//! Both signals are level-triggered and polled explicitly at the driver's
//! labeled checkpoints; nothing preempts a running transformation. A soft
//! expiry means "finalize with what you have", a hard expiry means "return
//! the current best immediately".

use std::time::{Duration, Instant};

use crate::settings::AnalysisSettings;

#[derive(Clone, Copy, Debug, Default)]
pub struct Timeouts {
    soft_deadline: Option<Instant>,
    hard_deadline: Option<Instant>,
}

fn deadline_from_secs(secs: u64) -> Option<Instant> {
    if secs == 0 {
        None
    } else {
        Instant::now().checked_add(Duration::from_secs(secs))
    }
}

impl Timeouts {
    pub fn from_settings(settings: &AnalysisSettings) -> Self {
        Timeouts {
            soft_deadline: deadline_from_secs(settings.soft_timeout_secs),
            hard_deadline: deadline_from_secs(settings.hard_timeout_secs),
        }
    }

    /// No budget; neither signal ever fires.
    pub fn unlimited() -> Self {
        Timeouts::default()
    }

    /// Both budgets already spent. For exercising the partial-result path.
    pub fn already_expired() -> Self {
        let past = Instant::now();
        Timeouts {
            soft_deadline: Some(past),
            hard_deadline: None,
        }
    }

    fn exceeded(deadline: Option<Instant>) -> bool {
        match deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    /// The hard deadline implies the soft one.
    pub fn soft(&self) -> bool {
        Self::exceeded(self.soft_deadline) || self.hard()
    }

    pub fn hard(&self) -> bool {
        Self::exceeded(self.hard_deadline)
    }
}
