//! Memory budgeting for Runtime B isolates.

use wasmtime::ResourceLimiter;

/// Resource limiter enforcing the validator's memory budget.
///
/// Growth requests beyond the budget are denied, which traps the guest
/// rather than letting it exhaust host memory.
pub struct IsolateLimiter {
    /// Maximum memory in bytes.
    max_memory: u64,
    /// Current memory allocation.
    current_memory: u64,
    /// Maximum table elements.
    max_table_elements: u64,
    /// Whether the budget was exceeded.
    limit_exceeded: bool,
}

impl IsolateLimiter {
    /// Create a limiter with the given memory budget.
    pub fn new(max_memory: u64) -> Self {
        Self {
            max_memory,
            current_memory: 0,
            max_table_elements: 10_000,
            limit_exceeded: false,
        }
    }

    /// Check if the budget was exceeded at any point.
    pub fn limit_exceeded(&self) -> bool {
        self.limit_exceeded
    }

    /// Current memory usage in bytes.
    pub fn current_memory(&self) -> u64 {
        self.current_memory
    }
}

impl ResourceLimiter for IsolateLimiter {
    fn memory_growing(
        &mut self,
        _current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        let desired_bytes = desired as u64;
        if desired_bytes > self.max_memory {
            self.limit_exceeded = true;
            return Ok(false);
        }
        self.current_memory = desired_bytes;
        Ok(true)
    }

    fn table_growing(
        &mut self,
        _current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        if desired as u64 > self.max_table_elements {
            self.limit_exceeded = true;
            return Ok(false);
        }
        Ok(true)
    }
}

/// Per-run store state: the limiter plus the isolate's WASI context.
pub struct IsolateState {
    /// The resource limiter.
    pub limiter: IsolateLimiter,
    /// WASI Preview 1 context for the isolate.
    pub wasi: wasmtime_wasi::preview1::WasiP1Ctx,
}

impl IsolateState {
    /// Create state with the given memory budget and WASI context.
    pub fn new(max_memory: u64, wasi: wasmtime_wasi::preview1::WasiP1Ctx) -> Self {
        Self {
            limiter: IsolateLimiter::new(max_memory),
            wasi,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limiter_allows_within_budget() {
        let mut limiter = IsolateLimiter::new(1024 * 1024);
        assert!(limiter.memory_growing(0, 512 * 1024, None).unwrap());
        assert!(!limiter.limit_exceeded());
        assert_eq!(limiter.current_memory(), 512 * 1024);
    }

    #[test]
    fn test_limiter_denies_over_budget() {
        let mut limiter = IsolateLimiter::new(1024 * 1024);
        assert!(!limiter.memory_growing(0, 2 * 1024 * 1024, None).unwrap());
        assert!(limiter.limit_exceeded());
    }

    #[test]
    fn test_table_growth_bounded() {
        let mut limiter = IsolateLimiter::new(1024 * 1024);
        assert!(limiter.table_growing(0, 100, None).unwrap());
        assert!(!limiter.table_growing(0, 1_000_000, None).unwrap());
        assert!(limiter.limit_exceeded());
    }
}
