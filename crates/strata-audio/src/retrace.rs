//! Callback / client rendezvous
//!
//! In retrace mode the client thread drives the pump in lock-step with the
//! hardware callback: the callback publishes its period and signals `enter`,
//! the client pumps into the staging buffer and signals `leave`, and the
//! callback copies the result out. The callback's wait is bounded by one
//! period's wall-clock duration; a late client costs one silent period,
//! never a stalled device.
//!
//! State machine per period: idle → callback-waiting → client-working →
//! callback-finalizing → idle, all under one mutex with two condvars.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// How long a serving client waits for a callback before giving up
const CLIENT_WAIT: Duration = Duration::from_millis(500);

struct RetraceState {
    /// Client has declared retrace mode
    active: bool,
    /// Cleared during teardown to release both sides
    cb_running: bool,
    /// Frames of the period currently offered to the client (0 = none)
    pending_frames: usize,
    channels: usize,
    /// Client finished pumping the offered period
    done: bool,
    /// Client-written output for the current period
    staging: Vec<f32>,
}

pub(crate) struct Retrace {
    state: Mutex<RetraceState>,
    enter: Condvar,
    leave: Condvar,
}

impl Retrace {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RetraceState {
                active: false,
                cb_running: true,
                pending_frames: 0,
                channels: 0,
                done: false,
                staging: Vec::new(),
            }),
            enter: Condvar::new(),
            leave: Condvar::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().unwrap().active
    }

    /// Enter retrace mode; the callback starts offering periods to the client
    pub fn start(&self) {
        self.state.lock().unwrap().active = true;
    }

    /// Leave retrace mode, releasing whichever side is waiting
    pub fn stop(&self) {
        let mut st = self.state.lock().unwrap();
        st.active = false;
        st.pending_frames = 0;
        self.enter.notify_all();
        self.leave.notify_all();
    }

    /// Teardown: release both sides permanently
    pub fn shutdown(&self) {
        let mut st = self.state.lock().unwrap();
        st.cb_running = false;
        st.active = false;
        self.enter.notify_all();
        self.leave.notify_all();
    }

    /// Run one hardware period from the callback thread
    ///
    /// Outside retrace mode the pump runs directly on the callback. In
    /// retrace mode the period is offered to the client; if the client does
    /// not finish within `deadline` the buffer is zero-filled and the
    /// callback returns, keeping the hardware fed.
    pub fn callback_period(
        &self,
        out: &mut [f32],
        frames: usize,
        channels: usize,
        deadline: Duration,
        direct_pump: impl FnOnce(&mut [f32]),
    ) {
        let samples = frames * channels;
        let mut st = self.state.lock().unwrap();

        if !st.cb_running {
            out[..samples].fill(0.0);
            return;
        }

        if !st.active {
            drop(st);
            direct_pump(out);
            return;
        }

        st.pending_frames = frames;
        st.channels = channels;
        st.done = false;
        if st.staging.len() < samples {
            st.staging.resize(samples, 0.0);
        }
        self.enter.notify_one();

        let (mut st, _timeout) = self
            .leave
            .wait_timeout_while(st, deadline, |s| {
                !s.done && s.cb_running && s.active
            })
            .unwrap();

        if st.done {
            out[..samples].copy_from_slice(&st.staging[..samples]);
        } else {
            // Deadline miss or retrace break: recover locally with silence.
            out[..samples].fill(0.0);
            st.pending_frames = 0;
        }
        st.done = false;
    }

    /// Serve exactly one callback period from the client thread
    ///
    /// Blocks until the callback offers a period, runs `pump` into the
    /// staging buffer, and hands it back. Returns false when no period
    /// arrived (not in retrace mode, engine shutting down, or no callback
    /// within the client wait bound).
    pub fn client_serve_once(&self, pump: impl FnOnce(&mut [f32], usize, usize)) -> bool {
        let mut st = self.state.lock().unwrap();

        while st.pending_frames == 0 {
            if !st.active || !st.cb_running {
                return false;
            }
            let (guard, timeout) = self.enter.wait_timeout(st, CLIENT_WAIT).unwrap();
            st = guard;
            if timeout.timed_out() && st.pending_frames == 0 {
                return false;
            }
        }

        let frames = st.pending_frames;
        let channels = st.channels;
        let samples = frames * channels;
        let mut staging = std::mem::take(&mut st.staging);
        // The callback only waits on `leave` while a period is pending, so
        // the lock can be released for the duration of the pump.
        drop(st);

        pump(&mut staging[..samples], frames, channels);

        let mut st = self.state.lock().unwrap();
        st.staging = staging;
        st.pending_frames = 0;
        st.done = true;
        self.leave.notify_one();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    const PERIOD: Duration = Duration::from_millis(20);

    #[test]
    fn test_direct_pump_outside_retrace() {
        let rt = Retrace::new();
        let mut out = vec![0.0f32; 8];
        rt.callback_period(&mut out, 4, 2, PERIOD, |buf| buf.fill(0.5));
        assert!(out.iter().all(|v| *v == 0.5));
    }

    #[test]
    fn test_absent_client_zero_fills_within_deadline() {
        let rt = Retrace::new();
        rt.start();
        let mut out = vec![1.0f32; 8];

        let begin = Instant::now();
        rt.callback_period(&mut out, 4, 2, PERIOD, |_| panic!("no direct pump in retrace"));
        let elapsed = begin.elapsed();

        assert!(out.iter().all(|v| *v == 0.0));
        assert!(elapsed >= PERIOD);
        assert!(elapsed < PERIOD * 10);

        // A subsequent callback still occurs and still recovers.
        let mut out2 = vec![1.0f32; 8];
        rt.callback_period(&mut out2, 4, 2, PERIOD, |_| unreachable!());
        assert!(out2.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_client_serves_period_in_lockstep() {
        let rt = Arc::new(Retrace::new());
        rt.start();

        let client_rt = rt.clone();
        let client = std::thread::spawn(move || {
            let mut served = 0;
            while served < 3 {
                if client_rt.client_serve_once(|buf, frames, channels| {
                    assert_eq!(frames * channels, buf.len());
                    buf.fill(0.25);
                }) {
                    served += 1;
                }
            }
            served
        });

        for _ in 0..3 {
            let mut out = vec![0.0f32; 16];
            rt.callback_period(&mut out, 8, 2, Duration::from_millis(500), |_| {
                unreachable!()
            });
            assert!(out.iter().all(|v| *v == 0.25), "period not served: {:?}", out);
        }

        assert_eq!(client.join().unwrap(), 3);
    }

    #[test]
    fn test_shutdown_releases_waiting_client() {
        let rt = Arc::new(Retrace::new());
        rt.start();

        let client_rt = rt.clone();
        let client = std::thread::spawn(move || client_rt.client_serve_once(|_, _, _| {}));

        std::thread::sleep(Duration::from_millis(20));
        rt.shutdown();
        assert!(!client.join().unwrap());
    }

    #[test]
    fn test_retrace_break_restores_direct_pump() {
        let rt = Retrace::new();
        rt.start();
        rt.stop();

        let mut out = vec![0.0f32; 4];
        rt.callback_period(&mut out, 2, 2, PERIOD, |buf| buf.fill(1.0));
        assert!(out.iter().all(|v| *v == 1.0));
    }
}
