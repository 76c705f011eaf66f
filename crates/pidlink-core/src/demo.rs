//! Demo Mode - simulated PID controller on the far end of the link
//!
//! Stands in for the embedded board so the bridge can run without hardware.
//! Simulates a ball-on-beam rig: the controller tilts the beam to hold the
//! ball at the setpoint distance and prints the measured distance (cm) once
//! per tick, the same way the firmware does. Tuning frames written to the
//! link are decoded and take effect on the next tick.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::protocol::{decode_frame, SerialLink, TuningParams, FRAME_LEN};

/// Firmware print interval
const TICK: Duration = Duration::from_millis(50);

/// Most ticks replayed at once after a long pause
const MAX_CATCH_UP: u32 = 20;

/// Usable length of the beam in cm
const BEAM_LEN_CM: f64 = 50.0;

/// Servo travel either side of level, degrees
const MAX_TILT_DEG: f64 = 15.0;

/// Simulated ball-on-beam controller
pub struct DemoController {
    params: TuningParams,
    /// Ball position (cm from sensor) and velocity (cm/s)
    position: f64,
    velocity: f64,
    integral: f64,
    prev_error: f64,
    /// Telemetry bytes not yet read by the host
    outbound: VecDeque<u8>,
    /// Partial command frame
    inbound: Vec<u8>,
    /// Chance of printing a garbled line instead of a value
    glitch_rate: f64,
    frames_received: u64,
    timeout: Duration,
    last_tick: Instant,
    rng: StdRng,
}

impl Default for DemoController {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoController {
    /// Create a controller with the factory tuning and a random noise seed
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic controller for tests
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            params: TuningParams::default(),
            position: 10.0,
            velocity: 0.0,
            integral: 0.0,
            prev_error: 0.0,
            outbound: VecDeque::new(),
            inbound: Vec::with_capacity(FRAME_LEN),
            glitch_rate: 0.0,
            frames_received: 0,
            timeout: Duration::from_secs(1),
            last_tick: Instant::now(),
            rng,
        }
    }

    /// Emit a garbled line with probability `rate` per tick
    pub fn with_glitch_rate(mut self, rate: f64) -> Self {
        self.glitch_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Tuning currently in effect
    pub fn params(&self) -> TuningParams {
        self.params
    }

    /// Complete command frames applied so far
    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    /// Simulated ball position in centimetres
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Advance one tick and queue the line the firmware would print
    pub fn step(&mut self) -> String {
        let dt = TICK.as_secs_f64();
        let p = self.params;

        let error = f64::from(p.setpoint) - self.position;
        self.integral = (self.integral + error).clamp(-1000.0, 1000.0);
        let derivative = error - self.prev_error;
        self.prev_error = error;

        let tilt = (f64::from(p.kp) * error
            + f64::from(p.ki) * self.integral
            + f64::from(p.kd) * derivative)
            .clamp(-MAX_TILT_DEG, MAX_TILT_DEG);

        // a = 5/7 g sin(theta) for a solid ball rolling without slipping
        let accel = 5.0 / 7.0 * 981.0 * tilt.to_radians().sin();
        self.velocity += accel * dt;
        self.position += self.velocity * dt;
        if self.position <= 0.0 || self.position >= BEAM_LEN_CM {
            self.position = self.position.clamp(0.0, BEAM_LEN_CM);
            self.velocity = 0.0;
        }

        let line = if self.glitch_rate > 0.0 && self.rng.gen_bool(self.glitch_rate) {
            "E#?\r\n".to_string()
        } else {
            let noise: f64 = self.rng.gen_range(-0.15..0.15);
            format!("{:.2}\r\n", self.position + noise)
        };
        self.outbound.extend(line.as_bytes());
        line
    }

    /// Run whatever ticks have elapsed on the wall clock
    fn catch_up(&mut self) {
        let elapsed = self.last_tick.elapsed();
        let ticks = (elapsed.as_millis() / TICK.as_millis()) as u32;
        if ticks == 0 {
            return;
        }
        for _ in 0..ticks.min(MAX_CATCH_UP) {
            self.step();
        }
        self.last_tick = Instant::now();
    }

    fn accept_frames(&mut self) {
        while self.inbound.len() >= FRAME_LEN {
            let mut frame = [0u8; FRAME_LEN];
            frame.copy_from_slice(&self.inbound[..FRAME_LEN]);
            self.inbound.drain(..FRAME_LEN);

            let params = decode_frame(&frame);
            tracing::debug!("demo controller: new tuning {:?}", params);
            self.params = params;
            self.integral = 0.0;
            self.frames_received += 1;
        }
    }
}

impl Read for DemoController {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.catch_up();
        if self.outbound.is_empty() {
            // Blocking read: wait for the next tick, bounded by the timeout
            let wait = TICK.saturating_sub(self.last_tick.elapsed()).min(self.timeout);
            std::thread::sleep(wait);
            self.catch_up();
        }
        if self.outbound.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "timed out"));
        }

        let n = buf.len().min(self.outbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.outbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for DemoController {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inbound.extend_from_slice(buf);
        self.accept_frames();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SerialLink for DemoController {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn bytes_to_read(&mut self) -> io::Result<u32> {
        self.catch_up();
        Ok(self.outbound.len() as u32)
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.outbound.clear();
        Ok(())
    }
}
