// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::time::Duration;

/// Exponential backoff schedule for reconnect probing: 0.5s base, doubling
/// up to a 10s cap.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub init_backoff: Duration,
    pub max_backoff: Duration,
    pub base: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            init_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            base: 2,
        }
    }
}

/// Iterator-style backoff state. Not shared across tasks; each reconnect
/// probe owns its own.
#[derive(Debug)]
pub struct Backoff {
    next: Duration,
    config: BackoffConfig,
}

impl Backoff {
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            next: config.init_backoff,
            config: config.clone(),
        }
    }

    /// The delay to wait before the next attempt.
    pub fn next(&mut self) -> Duration {
        let current = self.next;
        self.next = (current * self.config.base).min(self.config.max_backoff);
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped() {
        let mut backoff = Backoff::new(&BackoffConfig::default());
        let mut delays = Vec::new();
        for _ in 0..7 {
            delays.push(backoff.next());
        }
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(10),
                Duration::from_secs(10),
            ]
        );
    }
}
