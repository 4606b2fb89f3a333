//! Countdown to the end of the payment window.

use chrono::{DateTime, Utc};
use cryptopay_core::Countdown;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tokio_util::task::AbortOnDropHandle;

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Tick(Countdown),
    /// Sent once, after which the timer stops ticking.
    Expired,
}

#[derive(Debug)]
struct Signal {
    generation: u64,
    event: TimerEvent,
}

/// Restartable expiry timer.
///
/// Each [`start`](ExpiryTimer::start) replaces the previous countdown; events
/// from a stopped or replaced countdown are never delivered.
pub struct ExpiryTimer {
    tick: Duration,
    generation: u64,
    task: Option<AbortOnDropHandle<()>>,
    tx: UnboundedSender<Signal>,
    rx: UnboundedReceiver<Signal>,
    remaining: Option<Countdown>,
}

impl Default for ExpiryTimer {
    fn default() -> Self {
        Self::new(TICK_INTERVAL)
    }
}

impl ExpiryTimer {
    pub fn new(tick: Duration) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            tick,
            generation: 0,
            task: None,
            tx,
            rx,
            remaining: None,
        }
    }

    /// Count down to a wall-clock deadline.
    pub fn start(&mut self, expires_at: DateTime<Utc>) {
        let remaining = (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        self.start_in(remaining);
    }

    /// Count down `remaining` from now.
    pub fn start_in(&mut self, remaining: Duration) {
        self.stop();
        let deadline = Instant::now() + remaining;
        let generation = self.generation;
        let tick = self.tick;
        let tx = self.tx.clone();

        self.task = Some(AbortOnDropHandle::new(tokio::spawn(async move {
            let mut ticker = interval(tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                let event = if now >= deadline {
                    TimerEvent::Expired
                } else {
                    TimerEvent::Tick(Countdown::from_remaining(deadline - now))
                };
                if tx.send(Signal { generation, event }).is_err() || event == TimerEvent::Expired {
                    break;
                }
            }
        })));
        tracing::debug!(generation, ?remaining, "Expiry timer started");
    }

    /// Cancel the running countdown, if any.
    pub fn stop(&mut self) {
        if self.task.take().is_some() {
            tracing::debug!(generation = self.generation, "Expiry timer stopped");
        }
        self.generation += 1;
        self.remaining = None;
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub fn remaining(&self) -> Option<Countdown> {
        self.remaining
    }

    /// Next event of the current countdown. Pending forever while stopped.
    /// Cancel safe.
    pub async fn next(&mut self) -> TimerEvent {
        loop {
            // self.tx keeps the channel open, recv never yields None
            let Some(signal) = self.rx.recv().await else {
                continue;
            };
            if signal.generation != self.generation {
                continue;
            }
            match signal.event {
                TimerEvent::Tick(countdown) => self.remaining = Some(countdown),
                TimerEvent::Expired => {
                    self.remaining = Some(Countdown::default());
                    self.task = None;
                }
            }
            return signal.event;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test(start_paused = true)]
    async fn ticks_then_expires_exactly_once() {
        let mut timer = ExpiryTimer::default();
        let started = Instant::now();
        timer.start_in(Duration::from_secs(3));

        let mut ticks = Vec::new();
        loop {
            match timer.next().await {
                TimerEvent::Tick(c) => ticks.push(c),
                TimerEvent::Expired => break,
            }
        }

        assert!(Instant::now() - started >= Duration::from_secs(3));
        assert_eq!(
            ticks,
            vec![
                Countdown { minutes: 0, seconds: 3 },
                Countdown { minutes: 0, seconds: 2 },
                Countdown { minutes: 0, seconds: 1 },
            ]
        );
        assert!(!timer.is_running());

        // nothing after expiry
        assert!(timeout(Duration::from_secs(10), timer.next()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn never_expires_before_deadline() {
        let mut timer = ExpiryTimer::default();
        let started = Instant::now();
        timer.start_in(Duration::from_millis(2500));

        while timer.next().await != TimerEvent::Expired {
            assert!(Instant::now() - started < Duration::from_millis(2500));
        }
        assert!(Instant::now() - started >= Duration::from_millis(2500));
    }

    #[tokio::test(start_paused = true)]
    async fn past_deadline_expires_on_first_tick() {
        let mut timer = ExpiryTimer::default();
        timer.start(Utc::now() - chrono::Duration::seconds(5));
        assert_eq!(timer.next().await, TimerEvent::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_timer_delivers_nothing() {
        let mut timer = ExpiryTimer::default();
        timer.start_in(Duration::from_secs(2));
        assert!(matches!(timer.next().await, TimerEvent::Tick(_)));

        timer.stop();
        assert!(timer.remaining().is_none());
        assert!(timeout(Duration::from_secs(5), timer.next()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_discards_previous_countdown() {
        let mut timer = ExpiryTimer::default();
        timer.start_in(Duration::from_secs(1));
        timer.start_in(Duration::from_secs(30 * 60));

        match timer.next().await {
            TimerEvent::Tick(c) => assert_eq!(c, Countdown { minutes: 30, seconds: 0 }),
            TimerEvent::Expired => panic!("stale countdown delivered"),
        }
    }
}
