//! ==============================================================================
//! controller.rs - node duty-cycle controller
//! ==============================================================================
//!
//! purpose:
//!     owns the node's power state machine:
//!
//! ```text
//!         cold start ──► [BootWindow | Active] ──► Suspended ──► (wake) ──┐
//!                              ▲                                         │
//!                              └─────────────────────────────────────────┘
//!
//!     every cycle is the same active window: weigh, advertise, watch the
//!     tilt switch, stop advertising. what differs is the wake source armed
//!     afterwards. inside the boot window the node re-wakes on short timers so
//!     it stays reachable; after it, only a tilt wakes it.
//! ```
//!
//! state:
//!     `RetainedState` is the only thing that outlives a cycle. it is passed in
//!     by reference; measurements and payloads are dropped with the cycle.
//!
//! relationships:
//!     - uses: hal.rs (SensorReader, TiltInput), broadcaster.rs, power.rs
//!     - used by: main.rs (node role)
//!
//! ==============================================================================

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::broadcaster::Broadcaster;
use crate::config::NodeConfig;
use crate::domain::{DutyCycleState, Measurement, RetainedState, Timestamp, WakeCause, WakeSource};
use crate::error::NodeError;
use crate::hal::{SensorReader, TiltInput};
use crate::power::PowerControl;

#[derive(Clone, Copy, Debug)]
pub struct DutyCycleTiming {
    /// length of every active window (Tactive)
    pub active: Duration,
    /// how long after cold start the node keeps timer wakes (Tboot)
    pub boot_window: Duration,
    pub tilt_poll: Duration,
    pub init_retry: Duration,
    /// 0 waits forever
    pub init_retry_limit: u32,
}

impl From<&NodeConfig> for DutyCycleTiming {
    fn from(config: &NodeConfig) -> Self {
        Self {
            active: config.active(),
            boot_window: config.boot_window(),
            tilt_poll: config.tilt_poll(),
            init_retry: config.init_retry(),
            init_retry_limit: config.init_retry_limit,
        }
    }
}

/// what one active window did
#[derive(Clone, Debug)]
pub struct CycleReport {
    pub state: DutyCycleState,
    /// every payload advertised, in order; more than one means tilt restarts
    pub payloads: Vec<String>,
    pub window_start: Timestamp,
    pub window_end: Timestamp,
    pub wake: WakeSource,
}

pub struct DutyCycleController<S, T, B, P> {
    sensor: S,
    tilt: T,
    broadcaster: B,
    power: P,
    timing: DutyCycleTiming,
    state: DutyCycleState,
    show_readings: bool,
}

impl<S, T, B, P> DutyCycleController<S, T, B, P>
where
    S: SensorReader,
    T: TiltInput,
    B: Broadcaster,
    P: PowerControl,
{
    pub fn new(sensor: S, tilt: T, broadcaster: B, power: P, timing: DutyCycleTiming) -> Self {
        Self {
            sensor,
            tilt,
            broadcaster,
            power,
            timing,
            state: DutyCycleState::Suspended,
            show_readings: false,
        }
    }

    pub fn show_readings(mut self, show: bool) -> Self {
        self.show_readings = show;
        self
    }

    pub fn state(&self) -> DutyCycleState {
        self.state
    }

    // --------------------------------------------------------------------------
    // init barrier
    // --------------------------------------------------------------------------

    /// block until the sensor reports ready, then tare it.
    ///
    /// gives up with `SensorInitTimeout` after `init_retry_limit` attempts;
    /// a limit of 0 keeps retrying forever.
    pub async fn wait_for_sensor(&mut self) -> Result<(), NodeError> {
        info!("Initializing scale...");
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            if self.sensor.is_ready() {
                break;
            }
            if self.timing.init_retry_limit != 0 && attempts >= self.timing.init_retry_limit {
                return Err(NodeError::SensorInitTimeout { attempts, waited: started.elapsed() });
            }
            tokio::time::sleep(self.timing.init_retry).await;
        }

        if let Err(e) = self.sensor.tare() {
            warn!("tare failed, readings stay untared: {}", e);
        }
        info!("Scale ready after {} attempt(s)", attempts);
        Ok(())
    }

    // --------------------------------------------------------------------------
    // wake arbitration
    // --------------------------------------------------------------------------

    pub fn in_boot_window(&self, retained: &RetainedState, now: Timestamp) -> bool {
        now.saturating_duration_since(retained.boot_time) < self.timing.boot_window
    }

    pub fn choose_wake_source(&self, retained: &RetainedState, now: Timestamp) -> WakeSource {
        let elapsed = now.saturating_duration_since(retained.boot_time);
        if elapsed < self.timing.boot_window {
            WakeSource::TimerDeadline((self.timing.boot_window - elapsed).min(self.timing.active))
        } else {
            WakeSource::ExternalSignal
        }
    }

    // --------------------------------------------------------------------------
    // cycle
    // --------------------------------------------------------------------------

    /// cold-start bookkeeping and wake logging at the top of a cycle
    fn resume(&mut self, retained: &mut RetainedState, cause: WakeCause) {
        let now = Instant::now();
        if retained.is_first_boot {
            retained.boot_time = now;
            retained.is_first_boot = false;
            info!(
                "First boot - staying reachable for {} minutes",
                self.timing.boot_window.as_secs() / 60
            );
        } else {
            match cause {
                WakeCause::Tilt => info!("Woke up from tilt sensor"),
                WakeCause::Timer => info!("Woke up from timer"),
                WakeCause::ColdStart => info!("Resumed without a wake source"),
            }
        }

        self.state = if self.in_boot_window(retained, now) {
            let left = self.timing.boot_window - now.saturating_duration_since(retained.boot_time);
            info!("Boot window: {} minutes remaining", left.as_secs() / 60);
            DutyCycleState::BootWindow
        } else {
            DutyCycleState::Active
        };
    }

    /// a failed read still produces a broadcast, carrying the sentinel
    fn acquire(&mut self) -> Measurement {
        let measurement = match self.sensor.read() {
            Ok(m) => m,
            Err(e) => {
                warn!("Scale read failed: {}", e);
                Measurement::Unavailable
            }
        };
        if self.show_readings {
            info!("Current weight: {}", measurement);
        } else {
            debug!("Current weight: {}", measurement);
        }
        measurement
    }

    async fn advertise(&mut self, payload: &str) {
        if let Err(e) = self.broadcaster.start(payload).await {
            warn!("advertising start failed: {}", e);
        }
    }

    /// weigh, advertise and watch the tilt switch for one `active` window.
    ///
    /// the window end is fixed when the window opens; tilt restarts neither
    /// shorten nor extend it.
    pub async fn run_active_window(&mut self, retained: &RetainedState) -> CycleReport {
        let window_start = Instant::now();
        let deadline = window_start + self.timing.active;
        let state = self.state;

        let mut payloads = Vec::new();
        let payload = self.acquire().payload_text();
        self.advertise(&payload).await;
        payloads.push(payload);

        // a switch already high when the window opens is not an edge
        let mut was_tilted = self.tilt.is_tilted();

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(self.timing.tilt_poll.min(deadline - now)).await;
            if Instant::now() >= deadline {
                break;
            }

            let tilted = self.tilt.is_tilted();
            if tilted && !was_tilted {
                info!("Tilt detected during active period");
                let payload = self.acquire().payload_text();
                if let Err(e) = self.broadcaster.stop().await {
                    warn!("advertising stop failed: {}", e);
                }
                self.advertise(&payload).await;
                payloads.push(payload);
            }
            was_tilted = tilted;
        }

        if let Err(e) = self.broadcaster.stop().await {
            warn!("advertising stop failed: {}", e);
        }
        let window_end = Instant::now();
        let wake = self.choose_wake_source(retained, window_end);
        debug!("active window closed after {:?}, arming {:?}", window_end - window_start, wake);

        CycleReport { state, payloads, window_start, window_end, wake }
    }

    /// one full cycle: active window, then suspend on the chosen wake source.
    /// returns the window report and what ended the suspend.
    pub async fn run_cycle(&mut self, retained: &mut RetainedState, cause: WakeCause) -> (CycleReport, WakeCause) {
        self.resume(retained, cause);
        let report = self.run_active_window(retained).await;

        match report.wake {
            WakeSource::TimerDeadline(_) => info!("Still in boot window, setting timer wake"),
            WakeSource::ExternalSignal => info!("Enabling tilt wake mode"),
        }
        self.state = DutyCycleState::Suspended;
        let woke_by = self.power.suspend(report.wake).await;
        (report, woke_by)
    }

    /// duty-cycle forever
    pub async fn run(&mut self, retained: &mut RetainedState) {
        let mut cause = WakeCause::ColdStart;
        loop {
            let (_, woke_by) = self.run_cycle(retained, cause).await;
            cause = woke_by;
        }
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SensorError;
    use crate::radio::RadioError;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    const SEC: Duration = Duration::from_secs(1);

    fn timing(active_s: u64, boot_s: u64) -> DutyCycleTiming {
        DutyCycleTiming {
            active: Duration::from_secs(active_s),
            boot_window: Duration::from_secs(boot_s),
            tilt_poll: SEC,
            init_retry: Duration::from_millis(100),
            init_retry_limit: 5,
        }
    }

    struct ScriptedSensor {
        ready_after: u32,
        polls: u32,
        reads: VecDeque<Result<i64, ()>>,
        tared: Arc<Mutex<bool>>,
    }

    impl ScriptedSensor {
        fn new(reads: Vec<Result<i64, ()>>) -> Self {
            Self { ready_after: 0, polls: 0, reads: reads.into(), tared: Arc::new(Mutex::new(false)) }
        }
    }

    impl SensorReader for ScriptedSensor {
        fn is_ready(&mut self) -> bool {
            self.polls += 1;
            self.polls > self.ready_after
        }

        fn read(&mut self) -> Result<Measurement, SensorError> {
            match self.reads.pop_front().unwrap_or(Ok(100)) {
                Ok(g) => Ok(Measurement::grams(g)),
                Err(()) => Err(SensorError::NotReady),
            }
        }

        fn tare(&mut self) -> Result<(), SensorError> {
            *self.tared.lock().unwrap() = true;
            Ok(())
        }
    }

    /// high while the elapsed time since `origin` falls in any span
    struct ScheduledTilt {
        origin: Instant,
        high: Vec<(Duration, Duration)>,
    }

    impl TiltInput for ScheduledTilt {
        fn is_tilted(&mut self) -> bool {
            let at = self.origin.elapsed();
            self.high.iter().any(|(from, to)| at >= *from && at < *to)
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Radio {
        Start(String),
        Stop,
    }

    #[derive(Clone, Default)]
    struct RecordingBroadcaster {
        log: Arc<Mutex<Vec<(Radio, Instant)>>>,
    }

    impl Broadcaster for RecordingBroadcaster {
        async fn start(&mut self, payload: &str) -> Result<(), RadioError> {
            self.log.lock().unwrap().push((Radio::Start(payload.to_string()), Instant::now()));
            Ok(())
        }

        async fn stop(&mut self) -> Result<(), RadioError> {
            self.log.lock().unwrap().push((Radio::Stop, Instant::now()));
            Ok(())
        }
    }

    /// timer wakes sleep for real (paused clock); tilt wakes after ten minutes
    #[derive(Clone, Default)]
    struct RecordingPower {
        armed: Arc<Mutex<Vec<WakeSource>>>,
    }

    impl PowerControl for RecordingPower {
        async fn suspend(&mut self, wake: WakeSource) -> WakeCause {
            self.armed.lock().unwrap().push(wake);
            match wake {
                WakeSource::TimerDeadline(d) => {
                    tokio::time::sleep(d).await;
                    WakeCause::Timer
                }
                WakeSource::ExternalSignal => {
                    tokio::time::sleep(Duration::from_secs(600)).await;
                    WakeCause::Tilt
                }
            }
        }
    }

    fn controller(
        sensor: ScriptedSensor,
        tilt_high: Vec<(Duration, Duration)>,
        timing: DutyCycleTiming,
    ) -> (
        DutyCycleController<ScriptedSensor, ScheduledTilt, RecordingBroadcaster, RecordingPower>,
        RecordingBroadcaster,
        RecordingPower,
    ) {
        let radio = RecordingBroadcaster::default();
        let power = RecordingPower::default();
        let tilt = ScheduledTilt { origin: Instant::now(), high: tilt_high };
        let c = DutyCycleController::new(sensor, tilt, radio.clone(), power.clone(), timing);
        (c, radio, power)
    }

    fn assert_timer_near(wake: WakeSource, expected: Duration) {
        match wake {
            WakeSource::TimerDeadline(d) => {
                assert!(d <= expected && expected - d < SEC, "timer {:?}, expected about {:?}", d, expected);
            }
            other => panic!("expected a timer wake, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cold_boot_schedule_switches_to_tilt_wake_after_boot_window() {
        let (mut c, _radio, power) = controller(ScriptedSensor::new(vec![]), vec![], timing(300, 1800));
        let mut retained = RetainedState::cold_start();
        let boot = Instant::now();

        let (first, woke) = c.run_cycle(&mut retained, WakeCause::ColdStart).await;
        assert!(!retained.is_first_boot);
        assert_eq!(first.state, DutyCycleState::BootWindow);
        // 1800 - 300 = 1500 > 300, so the full active length
        assert_eq!(first.wake, WakeSource::TimerDeadline(Duration::from_secs(300)));
        assert_eq!(woke, WakeCause::Timer);

        let mut cause = woke;
        let mut reports = vec![first];
        while reports.last().unwrap().wake != WakeSource::ExternalSignal {
            let (report, woke) = c.run_cycle(&mut retained, cause).await;
            cause = woke;
            reports.push(report);
            assert!(reports.len() < 10, "never left the boot window");
        }

        assert_eq!(reports.len(), 4);
        assert_timer_near(reports[1].wake, Duration::from_secs(300));
        assert_timer_near(reports[2].wake, Duration::from_secs(300));

        let last = reports.last().unwrap();
        assert!(last.window_start.duration_since(boot) >= Duration::from_secs(1800));
        assert!(last.window_start.duration_since(boot) < Duration::from_secs(1801));
        assert_eq!(last.state, DutyCycleState::Active);
        assert_eq!(c.state(), DutyCycleState::Suspended);
        assert_eq!(power.armed.lock().unwrap().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn final_boot_window_timer_is_clipped_to_remaining_time() {
        let (mut c, _radio, _power) = controller(ScriptedSensor::new(vec![]), vec![], timing(300, 1000));
        let mut retained = RetainedState::cold_start();

        let (first, cause) = c.run_cycle(&mut retained, WakeCause::ColdStart).await;
        assert_eq!(first.wake, WakeSource::TimerDeadline(Duration::from_secs(300)));

        // second window ends at 900s: min(1000 - 900, 300) = 100s
        let (second, cause) = c.run_cycle(&mut retained, cause).await;
        assert_timer_near(second.wake, Duration::from_secs(100));

        let (third, _) = c.run_cycle(&mut retained, cause).await;
        assert_eq!(third.wake, WakeSource::ExternalSignal);
    }

    #[tokio::test(start_paused = true)]
    async fn boot_time_is_set_once() {
        let (mut c, _radio, _power) = controller(ScriptedSensor::new(vec![]), vec![], timing(10, 1800));
        let mut retained = RetainedState::cold_start();
        tokio::time::advance(Duration::from_secs(5)).await;
        let cold = Instant::now();

        let (_, cause) = c.run_cycle(&mut retained, WakeCause::ColdStart).await;
        assert_eq!(retained.boot_time, cold);
        c.run_cycle(&mut retained, cause).await;
        assert_eq!(retained.boot_time, cold);
    }

    #[tokio::test(start_paused = true)]
    async fn tilt_edge_restarts_payload_without_moving_window_end() {
        let sensor = ScriptedSensor::new(vec![Ok(100), Ok(150)]);
        // held high from 10s to 20s: one edge, not ten
        let tilt = vec![(Duration::from_millis(9_500), Duration::from_millis(20_500))];
        let (mut c, radio, _power) = controller(sensor, tilt, timing(300, 1800));
        let mut retained = RetainedState::cold_start();

        let (report, _) = c.run_cycle(&mut retained, WakeCause::ColdStart).await;
        assert_eq!(report.payloads, vec!["100g".to_string(), "150g".to_string()]);

        let window = report.window_end - report.window_start;
        assert!(window >= Duration::from_secs(300) && window < Duration::from_secs(301));

        let log = radio.log.lock().unwrap();
        let events: Vec<Radio> = log.iter().map(|(e, _)| e.clone()).collect();
        assert_eq!(
            events,
            vec![
                Radio::Start("100g".into()),
                Radio::Stop,
                Radio::Start("150g".into()),
                Radio::Stop,
            ]
        );
        let restart_at = log[2].1 - report.window_start;
        assert!(restart_at >= Duration::from_secs(10) && restart_at < Duration::from_secs(11));
        assert_eq!(log[3].1, report.window_end);
    }

    #[tokio::test(start_paused = true)]
    async fn switch_high_at_window_open_is_not_an_edge() {
        let tilt = vec![(Duration::ZERO, Duration::from_secs(5))];
        let (mut c, _radio, _power) = controller(ScriptedSensor::new(vec![]), tilt, timing(30, 1800));
        let mut retained = RetainedState::cold_start();

        let (report, _) = c.run_cycle(&mut retained, WakeCause::ColdStart).await;
        assert_eq!(report.payloads.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sensor_error_broadcasts_unavailable_and_completes_cycle() {
        let sensor = ScriptedSensor::new(vec![Err(())]);
        let (mut c, radio, power) = controller(sensor, vec![], timing(60, 1800));
        let mut retained = RetainedState::cold_start();

        let (report, _) = c.run_cycle(&mut retained, WakeCause::ColdStart).await;
        assert_eq!(report.payloads, vec!["ERR".to_string()]);
        assert_eq!(radio.log.lock().unwrap()[0].0, Radio::Start("ERR".into()));
        assert_eq!(power.armed.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn past_boot_window_always_arms_external_signal() {
        let (mut c, _radio, power) = controller(ScriptedSensor::new(vec![]), vec![], timing(60, 0));
        let mut retained = RetainedState::cold_start();

        let mut cause = WakeCause::ColdStart;
        for _ in 0..3 {
            let (report, woke) = c.run_cycle(&mut retained, cause).await;
            assert_eq!(report.state, DutyCycleState::Active);
            assert_eq!(report.wake, WakeSource::ExternalSignal);
            cause = woke;
        }
        assert_eq!(cause, WakeCause::Tilt);
        assert!(power.armed.lock().unwrap().iter().all(|w| *w == WakeSource::ExternalSignal));
    }

    #[tokio::test(start_paused = true)]
    async fn init_barrier_waits_then_tares() {
        let mut sensor = ScriptedSensor::new(vec![]);
        sensor.ready_after = 3;
        let tared = sensor.tared.clone();
        let (mut c, _radio, _power) = controller(sensor, vec![], timing(60, 1800));

        let start = Instant::now();
        c.wait_for_sensor().await.unwrap();
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(300) && waited < Duration::from_millis(310));
        assert!(*tared.lock().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn init_barrier_times_out() {
        let mut sensor = ScriptedSensor::new(vec![]);
        sensor.ready_after = u32::MAX;
        let (mut c, _radio, _power) = controller(sensor, vec![], timing(60, 1800));

        match c.wait_for_sensor().await {
            Err(NodeError::SensorInitTimeout { attempts, waited }) => {
                assert_eq!(attempts, 5);
                assert!(waited >= Duration::from_millis(400) && waited < Duration::from_millis(410));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_init_barrier_keeps_waiting() {
        let mut sensor = ScriptedSensor::new(vec![]);
        sensor.ready_after = 50;
        let mut t = timing(60, 1800);
        t.init_retry_limit = 0;
        let (mut c, _radio, _power) = controller(sensor, vec![], t);

        assert!(c.wait_for_sensor().await.is_ok());
    }
}
