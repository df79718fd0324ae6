use std::time::Duration;

/// Fixed pause inserted between successive profile mutations so a burst of
/// updates stays under the provider's rate limits.
#[derive(Debug, Clone)]
pub struct Pacer {
    delay: Duration,
}

impl Default for Pacer {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// No-delay pacer for tests.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}
