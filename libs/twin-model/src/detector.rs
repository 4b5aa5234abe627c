//! Anomaly detectors comparing plant readings against model predictions.

/// Flags any single sample whose error exceeds the threshold.
#[derive(Debug, Clone, Copy)]
pub struct StatelessDetector {
    threshold: i64,
}

impl StatelessDetector {
    pub fn new(threshold: i64) -> Self {
        Self { threshold }
    }

    pub fn detect(&self, actual: i64, predicted: i64) -> bool {
        (actual - predicted).abs() > self.threshold
    }
}

/// CUSUM-style detector with a leaky accumulated residual.
///
/// Each sample adds its absolute error to the residual, then the
/// residual leaks by `delta` (never below zero). An alarm fires once
/// the residual exceeds the threshold, so isolated small errors decay
/// away while a sustained drift accumulates. Once an alarm has fired,
/// `deviation` freezes at the total error accumulated before detection.
#[derive(Debug, Clone, Copy)]
pub struct StatefulDetector {
    threshold: i64,
    delta: i64,
    residual: i64,
    deviation: i64,
    detected: bool,
}

impl StatefulDetector {
    pub fn new(threshold: i64, delta: i64) -> Self {
        Self {
            threshold,
            delta,
            residual: 0,
            deviation: 0,
            detected: false,
        }
    }

    pub fn residual(&self) -> i64 {
        self.residual
    }

    /// Total absolute error accumulated up to the first alarm.
    pub fn deviation(&self) -> i64 {
        self.deviation
    }

    pub fn detected(&self) -> bool {
        self.detected
    }

    pub fn detect(&mut self, actual: i64, predicted: i64) -> bool {
        let error = (actual - predicted).abs();
        self.residual = (self.residual + error - self.delta).max(0);

        if self.residual > self.threshold {
            self.detected = true;
            true
        } else {
            if !self.detected {
                self.deviation += error;
            }
            false
        }
    }
}
