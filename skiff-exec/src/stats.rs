//! Execution statistics: cost metering and wasm/host time accounting.

use std::time::{Duration, Instant};

/// Per-executor accounting. Cost is charged per executed instruction and per
/// host call (the host function's declared cost); exceeding the ceiling
/// aborts the invocation with `CostLimitExceeded`.
#[derive(Debug)]
pub struct Statistics {
    cost_limit: u64,
    cost: u64,
    instr_count: u64,
    wasm_time: Duration,
    host_time: Duration,
    wasm_since: Option<Instant>,
    host_since: Option<Instant>,
    /// Number of times the host timer was started.
    host_starts: u64,
}

impl Statistics {
    /// Unlimited cost ceiling.
    pub fn new() -> Self {
        Self::with_cost_limit(u64::MAX)
    }

    pub fn with_cost_limit(cost_limit: u64) -> Self {
        Self {
            cost_limit,
            cost: 0,
            instr_count: 0,
            wasm_time: Duration::ZERO,
            host_time: Duration::ZERO,
            wasm_since: None,
            host_since: None,
            host_starts: 0,
        }
    }

    /// Charge `n` cost units. Returns false when the ceiling is exceeded;
    /// the charge is not applied in that case.
    #[must_use]
    pub fn add_cost(&mut self, n: u64) -> bool {
        match self.cost.checked_add(n) {
            Some(total) if total <= self.cost_limit => {
                self.cost = total;
                true
            }
            _ => false,
        }
    }

    pub fn count_instr(&mut self) {
        self.instr_count += 1;
    }

    pub fn start_record_wasm(&mut self) {
        if self.wasm_since.is_none() {
            self.wasm_since = Some(Instant::now());
        }
    }

    pub fn stop_record_wasm(&mut self) {
        if let Some(since) = self.wasm_since.take() {
            self.wasm_time += since.elapsed();
        }
    }

    pub fn start_record_host(&mut self) {
        if self.host_since.is_none() {
            self.host_since = Some(Instant::now());
            self.host_starts += 1;
        }
    }

    pub fn stop_record_host(&mut self) {
        if let Some(since) = self.host_since.take() {
            self.host_time += since.elapsed();
        }
    }

    pub fn cost(&self) -> u64 {
        self.cost
    }

    pub fn cost_limit(&self) -> u64 {
        self.cost_limit
    }

    pub fn instr_count(&self) -> u64 {
        self.instr_count
    }

    pub fn wasm_time(&self) -> Duration {
        self.wasm_time
    }

    pub fn host_time(&self) -> Duration {
        self.host_time
    }

    pub fn host_starts(&self) -> u64 {
        self.host_starts
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_ceiling() {
        let mut s = Statistics::with_cost_limit(10);
        assert!(s.add_cost(4));
        assert!(s.add_cost(6));
        assert!(!s.add_cost(1));
        // The rejected charge is not applied.
        assert_eq!(s.cost(), 10);
    }

    #[test]
    fn cost_overflow_rejected() {
        let mut s = Statistics::new();
        assert!(s.add_cost(u64::MAX));
        assert!(!s.add_cost(1));
    }

    #[test]
    fn timers_balance() {
        let mut s = Statistics::new();
        s.start_record_wasm();
        s.stop_record_wasm();
        s.start_record_host();
        s.stop_record_host();
        assert_eq!(s.host_starts(), 1);
        // Stopping an idle timer is a no-op.
        s.stop_record_host();
        assert_eq!(s.host_starts(), 1);
    }
}
