//! Manual override ("test value") shared between display and poller

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Highest value the test slider offers
pub const MAX_TEST_VALUE: u8 = 3;

/// Last-write-wins scalar: the display writes it, the poller snapshots it
/// while the game is not running.
#[derive(Debug, Clone, Default)]
pub struct TestValue(Arc<AtomicU8>);

impl TestValue {
    pub fn new(initial: u8) -> Self {
        let value = Self::default();
        value.set(initial);
        value
    }

    /// Store a value, clamped to `0..=MAX_TEST_VALUE`
    pub fn set(&self, value: u8) {
        self.0.store(value.min(MAX_TEST_VALUE), Ordering::Release);
    }

    pub fn get(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }
}
