use sprout_domain::{Color, DomainError};
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateEvent {
    /// Input accepted; this many colours are pending.
    Pending(usize),
    Unlocked,
    Rejected,
}

/// Collects colour taps and compares them against a fixed code.
#[derive(Clone, Debug)]
pub struct UnlockGate {
    code: Vec<Color>,
    pending: Vec<Color>,
    unlocked: bool,
}

impl UnlockGate {
    pub fn new(code: Vec<Color>) -> Result<Self, DomainError> {
        if code.is_empty() {
            return Err(DomainError::validation("unlock code must not be empty"));
        }
        Ok(Self {
            pending: Vec::with_capacity(code.len()),
            code,
            unlocked: false,
        })
    }

    /// Once the pending sequence reaches the code length it is compared and
    /// cleared, whatever the outcome.
    pub fn submit(&mut self, color: Color) -> GateEvent {
        self.pending.push(color);
        if self.pending.len() < self.code.len() {
            debug!(pending = self.pending.len(), "unlock input");
            return GateEvent::Pending(self.pending.len());
        }
        let matched = self.pending == self.code;
        self.pending.clear();
        if matched {
            info!("unlock code accepted");
            self.unlocked = true;
            GateEvent::Unlocked
        } else {
            debug!("unlock code rejected");
            GateEvent::Rejected
        }
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.unlocked = false;
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    pub fn pending(&self) -> &[Color] {
        &self.pending
    }

    pub fn code_len(&self) -> usize {
        self.code.len()
    }
}
