//! Session clock and currently viewed driver, as last reported by the plugin.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering};

use crate::domain::roster::AUTO_DRIVER_ID;

/// Lock-free snapshot of the session clock.
///
/// Written by the read loop on SESSION_TIME and VEHICLE_CONTROL_CHANGED,
/// read by the visibility engine from any task.
#[derive(Debug)]
pub struct SessionClock {
    time: AtomicI64,
    decreasing: AtomicBool,
    viewed_driver: AtomicI32,
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            time: AtomicI64::new(0),
            decreasing: AtomicBool::new(false),
            viewed_driver: AtomicI32::new(AUTO_DRIVER_ID),
        }
    }

    /// Records a new session time and recomputes the direction flag.
    ///
    /// An unchanged time counts as running forward.
    pub fn tick(&self, time: i64) {
        let previous = self.time.swap(time, Ordering::AcqRel);
        self.decreasing.store(time < previous, Ordering::Release);
    }

    pub fn now(&self) -> i64 {
        self.time.load(Ordering::Acquire)
    }

    pub fn is_time_decreasing(&self) -> bool {
        self.decreasing.load(Ordering::Acquire)
    }

    pub fn set_viewed_driver(&self, driver_id: i32) {
        self.viewed_driver.store(driver_id, Ordering::Release);
    }

    /// Driver whose car the camera follows, or [`AUTO_DRIVER_ID`] if unknown.
    pub fn viewed_driver(&self) -> i32 {
        self.viewed_driver.load(Ordering::Acquire)
    }
}
