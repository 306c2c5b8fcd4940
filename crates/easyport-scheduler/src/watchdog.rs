use std::sync::mpsc;
use std::time::{Duration, Instant};

use easyport_core::panic_payload_to_str;

use crate::{CancellationToken, TaskError};

/// Runs `f` on a dedicated thread against a deadline of `timeout`.
///
/// If the timeout elapses (or `cancel_token` is cancelled from outside), the token is cancelled
/// and the call keeps blocking until `f` has actually returned, so `f` never outlives the call.
/// The thread cannot be forcibly terminated; `f` is expected to cooperate by checking the token.
/// Whatever `f` returns after the deadline is discarded.
pub fn run_with_timeout<T, F>(
    timeout: Duration,
    cancel_token: CancellationToken,
    f: F,
) -> Result<T, TaskError>
where
    T: Send + 'static,
    F: FnOnce(CancellationToken) -> T + Send + 'static,
{
    if cancel_token.is_cancelled() {
        return Err(TaskError::Cancelled);
    }

    let (tx, rx) = mpsc::channel::<Result<T, TaskError>>();
    let token_for_task = cancel_token.clone();
    let spawned = std::thread::Builder::new()
        .name("easyport-watchdog".to_owned())
        .spawn(move || {
            let result =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(token_for_task)))
                    .map_err(|panic| TaskError::Panicked(panic_payload_to_str(&*panic).to_owned()));
            let _ = tx.send(result);
        });
    if let Err(err) = spawned {
        return Err(TaskError::Panicked(format!(
            "failed to spawn watchdog thread: {err}"
        )));
    }

    let deadline = Instant::now() + timeout;
    let poll_interval = Duration::from_millis(10);

    let outcome = loop {
        if cancel_token.is_cancelled() {
            break TaskError::Cancelled;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            cancel_token.cancel();
            break TaskError::DeadlineExceeded(timeout);
        }

        match rx.recv_timeout(remaining.min(poll_interval)) {
            Ok(result) => return result,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(TaskError::Panicked("watchdog thread vanished".to_owned()))
            }
        }
    };

    tracing::warn!(
        target = "easyport.scheduler",
        error = %outcome,
        "waiting for interrupted task to return"
    );
    // Either the late result or a disconnect; both mean the task is done.
    let _ = rx.recv();
    Err(outcome)
}
