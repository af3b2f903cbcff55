//! Application layer use cases for the plugin.
//!
//! # What use cases does the plugin have?
//!
//! - **`widget_overrides`** – Keeps the per-widget overrides the director
//!   sent and answers "is this widget visible right now?".
//!
//! - **`dispatch_commands`** – Routes every frame the director sends to the
//!   layout loader or the override store.
//!
//! - **`telemetry_relay`** – Turns simulator events into outbound frames and
//!   remembers enough session state to bring a newly connected director up to
//!   date.
//!
//! None of these modules touch sockets; they talk to the connection through
//! the `FrameSink` and `FrameHandler` traits from `hud_core`.

pub mod dispatch_commands;
pub mod telemetry_relay;
pub mod widget_overrides;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use hud_core::{ConnectionError, Frame, FrameSink};

    /// Records everything written to it.
    #[derive(Default)]
    pub struct RecordingSink {
        frames: Mutex<Vec<Frame>>,
        batches: Mutex<Vec<Vec<Frame>>>,
        closed: AtomicBool,
    }

    impl RecordingSink {
        pub fn frames(&self) -> Vec<Frame> {
            self.frames.lock().unwrap().clone()
        }

        pub fn batches(&self) -> Vec<Vec<Frame>> {
            self.batches.lock().unwrap().clone()
        }

        /// Makes every later write fail as if no director were connected.
        pub fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl FrameSink for RecordingSink {
        async fn send(&self, frame: &Frame) -> Result<(), ConnectionError> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(ConnectionError::Closed);
            }
            self.frames.lock().unwrap().push(frame.clone());
            Ok(())
        }

        async fn send_batch(&self, frames: &[Frame]) -> Result<(), ConnectionError> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(ConnectionError::Closed);
            }
            self.frames.lock().unwrap().extend_from_slice(frames);
            self.batches.lock().unwrap().push(frames.to_vec());
            Ok(())
        }
    }
}
