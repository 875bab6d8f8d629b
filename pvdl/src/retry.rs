use std::future::Future;
use std::io;
use std::mem::{Discriminant, discriminant};
use std::time::Duration;

/// How many attempts a task gets before it falls back to its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Unbounded,
    Attempts(u32),
}

/// What a failure looks like, for telling a repeating failure apart from a
/// flaky one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Api(Discriminant<pixiv::Error>, Option<u16>),
    Io(io::ErrorKind),
    Other,
}

impl FailureKind {
    pub fn of(e: &anyhow::Error) -> Self {
        for cause in e.chain() {
            if let Some(e) = cause.downcast_ref::<pixiv::Error>() {
                let status = match e {
                    pixiv::Error::Pixiv(st, _) => Some(*st),
                    _ => None,
                };
                return FailureKind::Api(discriminant(e), status);
            }
            if let Some(e) = cause.downcast_ref::<io::Error>() {
                return FailureKind::Io(e.kind());
            }
        }
        FailureKind::Other
    }
}

pub fn is_absent(e: &anyhow::Error) -> bool {
    e.chain()
        .filter_map(|c| c.downcast_ref::<pixiv::Error>())
        .any(pixiv::Error::is_absent)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Absent,
    Fatal,
    Exhausted,
}

enum State<T> {
    Attempting,
    Retrying,
    Stopped(Stop),
    Succeeded(T),
}

#[derive(Debug, Default)]
struct Streak {
    last: Option<FailureKind>,
    count: u32,
}

impl Streak {
    fn push(&mut self, kind: FailureKind) -> u32 {
        if self.last == Some(kind) {
            self.count += 1;
        } else {
            self.last = Some(kind);
            self.count = 1;
        }
        self.count
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub limit: Limit,
    /// A task stops once the same kind of failure occurs more than this many
    /// times in a row.
    pub fatal_streak: u32,
    pub pause: Duration,
}

impl RetryPolicy {
    pub fn new(limit: Limit) -> Self {
        Self {
            limit,
            fatal_streak: 5,
            pause: Duration::ZERO,
        }
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_limit(mut self, limit: Limit) -> Self {
        self.limit = limit;
        self
    }

    fn exhausted(&self, attempts: u32) -> bool {
        match self.limit {
            Limit::Unbounded => false,
            Limit::Attempts(n) => attempts >= n,
        }
    }

    /// Runs `op` until it succeeds or a stop condition fires, in which case
    /// `default` is returned. Stop conditions: an absence signal, the same
    /// failure kind repeating past `fatal_streak`, or the attempt limit.
    pub async fn run<T, F, Fut>(&self, label: &str, default: T, mut op: F) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut attempts = 0;
        let mut streak = Streak::default();
        let mut state = State::Attempting;
        loop {
            state = match state {
                State::Attempting => {
                    attempts += 1;
                    match op().await {
                        Ok(v) => State::Succeeded(v),
                        Err(e) if is_absent(&e) => {
                            debug!("{label}: absent: {e}");
                            State::Stopped(Stop::Absent)
                        }
                        Err(e) => {
                            report(label, attempts, &e);
                            if streak.push(FailureKind::of(&e)) > self.fatal_streak {
                                State::Stopped(Stop::Fatal)
                            } else if self.exhausted(attempts) {
                                State::Stopped(Stop::Exhausted)
                            } else {
                                State::Retrying
                            }
                        }
                    }
                }
                State::Retrying => {
                    if !self.pause.is_zero() {
                        tokio::time::sleep(self.pause).await;
                    }
                    State::Attempting
                }
                State::Stopped(stop) => {
                    match stop {
                        Stop::Absent => {}
                        Stop::Fatal => error!(
                            "{label}: FATAL: same error occurred {} times in a row, giving up",
                            streak.count
                        ),
                        Stop::Exhausted => warn!("{label}: giving up after {attempts} attempts"),
                    }
                    return default;
                }
                State::Succeeded(v) => return v,
            }
        }
    }
}

fn report(label: &str, attempt: u32, e: &anyhow::Error) {
    error!("{label}: attempt {attempt} failed: {e}");
    for cause in e.chain().skip(1) {
        error!("{label}:   caused by: {cause}");
    }
}
