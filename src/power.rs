//! ==============================================================================
//! power.rs - suspend transition for the node
//! ==============================================================================
//!
//! purpose:
//!     a host cannot deep-sleep, so suspension parks the node task until the
//!     armed wake source fires: a timer for `TimerDeadline`, the tilt edge for
//!     `ExternalSignal`.
//!
//! relationships:
//!     - uses: hal.rs (WakeTrigger)
//!     - used by: controller.rs (end of every active window)
//!
//! ==============================================================================

use std::future::Future;

use tracing::info;

use crate::domain::{WakeCause, WakeSource};
use crate::hal::WakeTrigger;

pub trait PowerControl: Send {
    /// suspend until `wake` fires and report what resumed the node
    fn suspend(&mut self, wake: WakeSource) -> impl Future<Output = WakeCause> + Send;
}

pub struct HostPower<W> {
    trigger: W,
}

impl<W: WakeTrigger> HostPower<W> {
    pub fn new(trigger: W) -> Self {
        Self { trigger }
    }
}

impl<W: WakeTrigger> PowerControl for HostPower<W> {
    async fn suspend(&mut self, wake: WakeSource) -> WakeCause {
        match wake {
            WakeSource::TimerDeadline(after) => {
                info!("suspending, timer wake in {}s", after.as_secs());
                tokio::time::sleep(after).await;
                WakeCause::Timer
            }
            WakeSource::ExternalSignal => {
                info!("suspending until tilt");
                self.trigger.wait_for_edge().await;
                WakeCause::Tilt
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    struct ChannelTrigger(mpsc::Receiver<()>);

    impl WakeTrigger for ChannelTrigger {
        async fn wait_for_edge(&mut self) {
            self.0.recv().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timer_wake_sleeps_for_deadline() {
        let (_tx, rx) = mpsc::channel(1);
        let mut power = HostPower::new(ChannelTrigger(rx));

        let before = Instant::now();
        let cause = power.suspend(WakeSource::TimerDeadline(Duration::from_secs(300))).await;
        assert_eq!(cause, WakeCause::Timer);
        let slept = before.elapsed();
        assert!(slept >= Duration::from_secs(300) && slept < Duration::from_secs(301));
    }

    #[tokio::test]
    async fn external_wake_waits_for_edge() {
        let (tx, rx) = mpsc::channel(1);
        let mut power = HostPower::new(ChannelTrigger(rx));
        tx.send(()).await.unwrap();
        assert_eq!(power.suspend(WakeSource::ExternalSignal).await, WakeCause::Tilt);
    }
}
