//! ==============================================================================
//! hal.rs - Hardware Abstraction Layer
//! ==============================================================================
//!
//! purpose:
//!     the node's view of its hardware: the load cell (through an HX711
//!     amplifier) and the tilt switch. abstracts away the difference between
//!     a real Raspberry Pi (using `rppal`) and a development machine (mocks).
//!
//! design:
//!     - "Compile Anywhere": without the `hardware` feature the node runs on
//!       any machine against mock parts.
//!     - the tilt switch is exposed twice on purpose: `TiltInput` is the level
//!       polled during an active window, `WakeTrigger` is the edge that ends a
//!       suspend. they never share a code path.
//!
//! relationships:
//!     - used by: controller.rs (SensorReader, TiltInput), power.rs (WakeTrigger)
//!     - uses: rppal (on feature="hardware")
//!
//! ==============================================================================

use std::future::Future;

use crate::domain::Measurement;
use crate::error::SensorError;

pub trait SensorReader: Send {
    fn is_ready(&mut self) -> bool;
    fn read(&mut self) -> Result<Measurement, SensorError>;
    /// zero the scale once it is ready
    fn tare(&mut self) -> Result<(), SensorError> {
        Ok(())
    }
}

/// tilt level, polled during an active window
pub trait TiltInput: Send {
    fn is_tilted(&mut self) -> bool;
}

/// tilt edge registration, armed only for a suspend
pub trait WakeTrigger: Send {
    /// resolves on the next rising edge
    fn wait_for_edge(&mut self) -> impl Future<Output = ()> + Send;
}

// ==============================================================================================
// MOCK IMPLEMENTATION (For WSL / Non-Hardware Build)
// ==============================================================================================
#[cfg(not(feature = "hardware"))]
pub use mock::{MockScale as HalSensor, MockTilt as HalTilt};

#[cfg(not(feature = "hardware"))]
mod mock {
    use super::*;

    pub struct MockScale {
        grams: i64,
    }

    impl SensorReader for MockScale {
        fn is_ready(&mut self) -> bool {
            true
        }

        fn read(&mut self) -> Result<Measurement, SensorError> {
            tracing::debug!("[MOCK HX711] Reading {}g", self.grams);
            Ok(Measurement::grams(self.grams))
        }
    }

    /// never tilts; a node suspended on the external signal sleeps until shutdown
    #[derive(Clone)]
    pub struct MockTilt {
        pin: u8,
    }

    impl TiltInput for MockTilt {
        fn is_tilted(&mut self) -> bool {
            false
        }
    }

    impl WakeTrigger for MockTilt {
        async fn wait_for_edge(&mut self) {
            tracing::debug!("[MOCK TILT] Waiting for edge on pin {} (never fires)", self.pin);
            std::future::pending::<()>().await
        }
    }

    pub struct Hal {
        pub sensor: MockScale,
        pub tilt: MockTilt,
    }

    impl Hal {
        pub fn new(config: &crate::config::SensorsConfig) -> anyhow::Result<Self> {
            tracing::info!("Using MOCK HAL (No hardware access)");
            Ok(Self {
                sensor: MockScale { grams: config.hx711.mock_grams },
                tilt: MockTilt { pin: config.tilt.gpio_pin },
            })
        }
    }
}

#[cfg(not(feature = "hardware"))]
pub use mock::Hal;

// ==============================================================================================
// REAL IMPLEMENTATION (For Raspberry Pi)
// ==============================================================================================
#[cfg(feature = "hardware")]
pub use real::{Hal, Hx711 as HalSensor, TiltPin as HalTilt};

#[cfg(feature = "hardware")]
mod real {
    use super::*;
    use rppal::gpio::{Gpio, InputPin, OutputPin, Trigger};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    /// how long a single conversion may take before the read gives up
    const CONVERSION_TIMEOUT: Duration = Duration::from_millis(200);

    /// bit-banged HX711, channel A gain 128
    pub struct Hx711 {
        dout: InputPin,
        sck: OutputPin,
        scale: f32,
        offset: i64,
        samples: u8,
    }

    impl Hx711 {
        fn pulse(&mut self) {
            self.sck.set_high();
            spin(Duration::from_micros(1));
            self.sck.set_low();
            spin(Duration::from_micros(1));
        }

        fn read_raw(&mut self) -> Result<i64, SensorError> {
            let started = Instant::now();
            while self.dout.is_high() {
                if started.elapsed() > CONVERSION_TIMEOUT {
                    return Err(SensorError::NotReady);
                }
                std::thread::sleep(Duration::from_millis(1));
            }

            let mut value: u32 = 0;
            for _ in 0..24 {
                self.sck.set_high();
                spin(Duration::from_micros(1));
                value = (value << 1) | u32::from(self.dout.is_high());
                self.sck.set_low();
                spin(Duration::from_micros(1));
            }
            // 25th pulse selects channel A, gain 128 for the next conversion
            self.pulse();

            // sign-extend the 24-bit two's complement value
            Ok(((value << 8) as i32 >> 8) as i64)
        }

        fn read_average(&mut self) -> Result<i64, SensorError> {
            let samples = self.samples.max(1);
            let mut sum = 0i64;
            for _ in 0..samples {
                sum += self.read_raw()?;
            }
            Ok(sum / i64::from(samples))
        }
    }

    fn spin(d: Duration) {
        let start = Instant::now();
        while start.elapsed() < d {
            std::hint::spin_loop();
        }
    }

    impl SensorReader for Hx711 {
        fn is_ready(&mut self) -> bool {
            self.dout.is_low()
        }

        fn read(&mut self) -> Result<Measurement, SensorError> {
            if !self.is_ready() {
                return Err(SensorError::NotReady);
            }
            let raw = self.read_average()?;
            let grams = ((raw - self.offset) as f32 / self.scale).round() as i64;
            tracing::debug!("[HX711] raw {} -> {}g", raw, grams);
            Ok(Measurement::grams(grams))
        }

        fn tare(&mut self) -> Result<(), SensorError> {
            self.offset = self.read_average()?;
            tracing::info!("[HX711] tared at offset {}", self.offset);
            Ok(())
        }
    }

    /// tilt switch, pulled down, high when tilted
    #[derive(Clone)]
    pub struct TiltPin {
        pin: Arc<Mutex<InputPin>>,
    }

    impl TiltInput for TiltPin {
        fn is_tilted(&mut self) -> bool {
            self.pin.lock().unwrap_or_else(|e| e.into_inner()).is_high()
        }
    }

    impl WakeTrigger for TiltPin {
        async fn wait_for_edge(&mut self) {
            let pin = self.pin.clone();
            let result = tokio::task::spawn_blocking(move || -> rppal::gpio::Result<()> {
                let mut pin = pin.lock().unwrap_or_else(|e| e.into_inner());
                pin.set_interrupt(Trigger::RisingEdge, None)?;
                let fired = pin.poll_interrupt(true, None);
                pin.clear_interrupt()?;
                fired.map(|_| ())
            })
            .await;

            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("[TILT] wake interrupt failed: {}", e),
                Err(e) => tracing::warn!("[TILT] wake task failed: {}", e),
            }
        }
    }

    pub struct Hal {
        pub sensor: Hx711,
        pub tilt: TiltPin,
    }

    impl Hal {
        pub fn new(config: &crate::config::SensorsConfig) -> anyhow::Result<Self> {
            tracing::info!("Using REAL HARDWARE HAL (rppal)");
            let gpio = Gpio::new()?;

            let sensor = Hx711 {
                dout: gpio.get(config.hx711.dout_pin)?.into_input(),
                sck: gpio.get(config.hx711.sck_pin)?.into_output_low(),
                scale: config.hx711.scale,
                offset: 0,
                samples: config.hx711.samples,
            };
            let tilt = TiltPin {
                pin: Arc::new(Mutex::new(gpio.get(config.tilt.gpio_pin)?.into_input_pulldown())),
            };

            Ok(Self { sensor, tilt })
        }
    }
}
