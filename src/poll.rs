use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};

/// Probe `predicate` every `interval` until it returns true or `timeout`
/// elapses. Returns whether the predicate stabilized in time.
///
/// The predicate is probed once immediately, so a condition that already
/// holds never waits.
pub async fn poll_until<F, Fut>(interval: Duration, timeout: Duration, mut predicate: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if predicate().await {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        sleep(interval.min(deadline - now)).await;
    }
}

/// Outcome of a [`poll_settled`] wait: whether the samples settled, and the
/// last observation either way.
#[derive(Debug, Clone)]
pub struct Settled<T> {
    pub stable: bool,
    pub last: Option<T>,
}

/// Sample a value every `interval` until `required` consecutive samples agree
/// (per `agree`) or `timeout` elapses. A `None` sample resets the streak.
///
/// On timeout the last observed sample is still returned so callers can
/// proceed best-effort with whatever was seen.
pub async fn poll_settled<T, F, Fut, A>(
    interval: Duration,
    timeout: Duration,
    required: u32,
    mut sample: F,
    agree: A,
) -> Settled<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
    A: Fn(&T, &T) -> bool,
{
    let deadline = Instant::now() + timeout;
    let mut last: Option<T> = None;
    let mut streak = 0_u32;

    loop {
        match sample().await {
            Some(current) => {
                streak = match &last {
                    Some(previous) if agree(previous, &current) => streak + 1,
                    _ => 1,
                };
                last = Some(current);
                if streak >= required.max(1) {
                    return Settled { stable: true, last };
                }
            }
            None => streak = 0,
        }

        let now = Instant::now();
        if now >= deadline {
            return Settled {
                stable: false,
                last,
            };
        }
        sleep(interval.min(deadline - now)).await;
    }
}
