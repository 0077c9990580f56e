pub trait Clock: Clone {
    /// Monotonic time since boot.
    fn now_us(&self) -> u64;

    fn now_ms(&self) -> u64 {
        self.now_us() / 1_000
    }
}
