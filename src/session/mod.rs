//! Interactive and one-shot code output.
//!
//! The interactive session ticks once a second, puts a fresh code on the
//! clipboard whenever the TOTP interval rolls over, and keeps a countdown
//! line updated on the terminal. It ends one full interval after the last
//! allowed refresh, or as soon as the shutdown future resolves. Either way
//! the clipboard is restored by the loop itself before returning.

use std::future::Future;
use std::io::Write;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::clipboard::{Clipboard, ClipboardGuard};
use crate::credential::Credential;
use crate::error::Result;
use crate::totp::{self, TotpError};

/// Distinct codes shown before an interactive session winds down.
pub const DEFAULT_REFRESH_LIMIT: u32 = 3;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Number of code refreshes after which the session ends. The last
    /// code is still shown for its whole interval.
    pub refresh_limit: u32,
    /// Display refresh cadence.
    pub tick: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            refresh_limit: DEFAULT_REFRESH_LIMIT,
            tick: Duration::from_secs(1),
        }
    }
}

/// Source of the current unix time in seconds.
pub trait Clock {
    fn now(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        // A clock set before 1970 is treated as the epoch.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// How an interactive session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Interrupted,
}

#[derive(Debug, Default)]
struct SessionState {
    last_code: String,
    last_interval: Option<u64>,
    refresh_count: u32,
    exit_at_interval: Option<u64>,
}

#[derive(Debug, PartialEq, Eq)]
enum Step {
    Show {
        code: String,
        remaining: u64,
        refreshed: bool,
    },
    Finished,
}

impl SessionState {
    fn step(
        &mut self,
        credential: &Credential,
        refresh_limit: u32,
        now: u64,
    ) -> std::result::Result<Step, TotpError> {
        let current = totp::interval(credential.period, now);
        if matches!(self.exit_at_interval, Some(exit) if current >= exit) {
            return Ok(Step::Finished);
        }

        let refreshed = self.last_interval != Some(current);
        if refreshed {
            self.last_code = credential.code_at(now)?;
            self.last_interval = Some(current);
            self.refresh_count += 1;
            debug!(interval = current, count = self.refresh_count, "new code");

            if self.refresh_count == refresh_limit {
                self.exit_at_interval = Some(current + 1);
            }
        }

        Ok(Step::Show {
            code: self.last_code.clone(),
            remaining: totp::remaining_seconds(credential.period, now),
            refreshed,
        })
    }
}

/// Run the interactive session until it completes or `shutdown` resolves.
///
/// The clipboard is saved on entry and restored on every way out, errors
/// included.
pub async fn run<C, K, W, S>(
    credential: &Credential,
    config: &SessionConfig,
    clipboard: C,
    clock: &K,
    out: &mut W,
    shutdown: S,
) -> Result<Outcome>
where
    C: Clipboard,
    K: Clock,
    W: Write,
    S: Future<Output = ()>,
{
    let mut guard = ClipboardGuard::acquire(clipboard);
    let mut state = SessionState::default();

    writeln!(out, "Provider: {}", credential.provider())?;

    let mut ticker = tokio::time::interval(config.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let outcome = loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break Outcome::Interrupted,
            _ = ticker.tick() => {}
        }

        match state.step(credential, config.refresh_limit, clock.now())? {
            Step::Finished => break Outcome::Completed,
            Step::Show {
                code,
                remaining,
                refreshed,
            } => {
                // Clipboard first so the code on screen is always pasteable.
                if refreshed {
                    guard.write(&code);
                }
                write!(
                    out,
                    "\rCurrent TOTP code: {} | Expires in: {:2} sec",
                    code, remaining
                )?;
                out.flush()?;
            }
        }
    };

    match outcome {
        Outcome::Completed => writeln!(out, "\r\x1b[KDone.")?,
        Outcome::Interrupted => writeln!(out, "\nRestoring original clipboard and exiting.")?,
    }
    match guard.restore() {
        Ok(true) => writeln!(out, "Original clipboard restored.")?,
        Ok(false) => {}
        Err(e) => warn!("could not restore clipboard: {}", e),
    }

    Ok(outcome)
}

/// Resolves on the first SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => debug!("received ctrl-c"),
        _ = terminate => debug!("received SIGTERM"),
    }
}

/// The code valid at `now`, for non-interactive use.
pub fn emit(credential: &Credential, now: u64) -> Result<String> {
    Ok(credential.code_at(now)?)
}

/// Write the code valid at `now` as a single line. A reader that went away
/// early surfaces as `Error::Output`.
pub fn write_code<W: Write>(out: &mut W, credential: &Credential, now: u64) -> Result<()> {
    let code = emit(credential, now)?;
    writeln!(out, "{}", code)?;
    out.flush()?;
    Ok(())
}
