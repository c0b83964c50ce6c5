use nix::sys::signal::{self, SigHandler, Signal};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// The three loops of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopRole {
    Capture,
    Relay,
    Present,
}

impl LoopRole {
    pub fn name(&self) -> &'static str {
        match self {
            LoopRole::Capture => "capture",
            LoopRole::Relay => "relay",
            LoopRole::Present => "present",
        }
    }
}

impl fmt::Display for LoopRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEnd {
    /// Capture ran out of its wall-clock budget
    Deadline,
    /// Relay forwarded its configured number of frames
    FrameCount,
    /// Presenter saw the quit key
    Quit,
    /// The supervisor asked the loop to stop
    Stopped,
    /// An error ended the loop
    Failed(String),
}

impl LoopEnd {
    pub fn is_clean(&self) -> bool {
        !matches!(self, LoopEnd::Failed(_))
    }
}

impl fmt::Display for LoopEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopEnd::Deadline => f.write_str("deadline reached"),
            LoopEnd::FrameCount => f.write_str("frame count reached"),
            LoopEnd::Quit => f.write_str("quit requested"),
            LoopEnd::Stopped => f.write_str("stopped by supervisor"),
            LoopEnd::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Summary returned by every loop
#[derive(Debug, Clone, PartialEq)]
pub struct LoopReport {
    pub role: LoopRole,
    pub ended_by: LoopEnd,
    pub elapsed: Duration,
    /// Frames published (capture), relayed (relay) or rendered (present)
    pub frames: u64,
    /// Not-ready retries (capture), idle polls (relay) or persisted frames (present)
    pub secondary: u64,
}

/// Longest a stop-aware sleep goes without checking its signal
const STOP_CHECK_SLICE: Duration = Duration::from_millis(10);

static TERMINATION_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_termination(_signal: libc::c_int) {
    TERMINATION_REQUESTED.store(true, Ordering::SeqCst);
}

/// Route SIGTERM and SIGINT to a flag instead of killing the process, so a
/// loop can finish its iteration and release what it holds
pub fn install_termination_flag() {
    let handler = SigHandler::Handler(on_termination);
    for sig in [Signal::SIGTERM, Signal::SIGINT] {
        // The handler only stores to an atomic
        if let Err(e) = unsafe { signal::signal(sig, handler) } {
            warn!("Failed to install {} handler: {}", sig, e);
        }
    }
    debug!("SIGTERM/SIGINT routed to termination flag");
}

/// How the supervisor tells a loop to stop early
#[derive(Debug, Clone, Default)]
pub enum StopSignal {
    /// Only the loop's own bound ends it
    #[default]
    Never,
    /// Thread mode: a token cancelled by the supervisor
    Token(CancellationToken),
    /// Process mode: SIGTERM or SIGINT received (see [`install_termination_flag`])
    Termination,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        match self {
            StopSignal::Never => false,
            StopSignal::Token(token) => token.is_cancelled(),
            StopSignal::Termination => TERMINATION_REQUESTED.load(Ordering::SeqCst),
        }
    }

    /// Sleep for `duration`, waking early once stopped. Returns whether the
    /// signal fired.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_stopped() {
                return true;
            }
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return false;
            }
            thread::sleep(left.min(STOP_CHECK_SLICE));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_end_cleanliness() {
        assert!(LoopEnd::Deadline.is_clean());
        assert!(LoopEnd::Quit.is_clean());
        assert!(LoopEnd::Stopped.is_clean());
        assert!(!LoopEnd::Failed("device gone".to_string()).is_clean());
        assert_eq!(
            LoopEnd::Failed("device gone".to_string()).to_string(),
            "failed: device gone"
        );
    }

    #[test]
    fn test_token_stop_signal() {
        let token = CancellationToken::new();
        let stop = StopSignal::Token(token.clone());

        assert!(!stop.is_stopped());
        token.cancel();
        assert!(stop.is_stopped());
        assert!(!StopSignal::Never.is_stopped());
    }

    #[test]
    fn test_sleep_wakes_on_cancel() {
        let token = CancellationToken::new();
        let stop = StopSignal::Token(token.clone());

        let canceller = {
            let token = token.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                token.cancel();
            })
        };

        let started = Instant::now();
        assert!(stop.sleep(Duration::from_secs(30)));
        assert!(started.elapsed() < Duration::from_secs(5));
        canceller.join().unwrap();

        assert!(!StopSignal::Never.sleep(Duration::from_millis(5)));
    }
}
