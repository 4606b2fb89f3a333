//! Confirmation polling against the payment service.

use cryptopay_core::{PaymentError, PaymentResult, PaymentStatus, SupportedCurrency};
use gateway::{CheckPaymentRequest, PaymentGateway};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::task::AbortOnDropHandle;

pub const POLL_INTERVAL: Duration = Duration::from_secs(15);

/// What is being watched. Polling restarts whenever any part changes.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorKey {
    pub address: String,
    pub currency: SupportedCurrency,
    pub expected_amount: f64,
}

impl MonitorKey {
    pub fn new(address: impl Into<String>, currency: SupportedCurrency, expected_amount: f64) -> Self {
        Self {
            address: address.into(),
            currency,
            expected_amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Status(PaymentStatus),
    Error(PaymentError),
}

struct PollUpdate {
    generation: u64,
    result: PaymentResult<PaymentStatus>,
}

/// Polls the payment service for one [`MonitorKey`] at a time.
pub struct StatusPoller {
    gateway: Arc<dyn PaymentGateway>,
    period: Duration,
    key: Option<MonitorKey>,
    generation: u64,
    task: Option<AbortOnDropHandle<()>>,
    tx: UnboundedSender<PollUpdate>,
    rx: UnboundedReceiver<PollUpdate>,
    status: PaymentStatus,
    error: Option<PaymentError>,
}

impl StatusPoller {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self::with_period(gateway, POLL_INTERVAL)
    }

    pub fn with_period(gateway: Arc<dyn PaymentGateway>, period: Duration) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            gateway,
            period,
            key: None,
            generation: 0,
            task: None,
            tx,
            rx,
            status: PaymentStatus::not_received(),
            error: None,
        }
    }

    /// Start monitoring `key`, or go inert with `None` (or an empty address).
    ///
    /// The same key again is a no-op. Any other change cancels the running
    /// poll before the new one starts.
    pub fn watch(&mut self, key: Option<MonitorKey>) {
        let key = key.filter(|k| !k.address.is_empty());
        if key == self.key && (key.is_none() || self.task.is_some()) {
            return;
        }

        self.halt();
        self.key = key.clone();

        let Some(key) = key else {
            self.status = PaymentStatus::not_received();
            self.error = None;
            return;
        };

        let generation = self.generation;
        let period = self.period;
        let gateway = Arc::clone(&self.gateway);
        let tx = self.tx.clone();
        tracing::debug!(address = %key.address, currency = %key.currency, generation, "Polling started");

        self.task = Some(AbortOnDropHandle::new(tokio::spawn(async move {
            let req = CheckPaymentRequest {
                address: key.address,
                currency: key.currency,
                expected_amount: key.expected_amount,
            };
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // first tick completes immediately
                ticker.tick().await;
                let result = gateway.check_payment(&req).await.map(PaymentStatus::from);
                if tx.send(PollUpdate { generation, result }).is_err() {
                    break;
                }
            }
        })));
    }

    /// Stop polling but keep the last status and key.
    pub fn halt(&mut self) {
        if self.task.take().is_some() {
            tracing::debug!(generation = self.generation, "Polling stopped");
        }
        self.generation += 1;
    }

    pub fn status(&self) -> &PaymentStatus {
        &self.status
    }

    pub fn error(&self) -> Option<&PaymentError> {
        self.error.as_ref()
    }

    /// Next result for the current key, applied to [`status`](Self::status)
    /// and [`error`](Self::error). Pending forever while inert. Cancel safe.
    pub async fn next(&mut self) -> PollOutcome {
        loop {
            let Some(update) = self.rx.recv().await else {
                continue;
            };
            if update.generation != self.generation {
                continue;
            }
            return match update.result {
                Ok(status) => {
                    self.status = status.clone();
                    self.error = None;
                    PollOutcome::Status(status)
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Payment status check failed");
                    self.status = PaymentStatus::not_received();
                    self.error = Some(err.clone());
                    PollOutcome::Error(err)
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway::mock::MockGateway;
    use gateway::{CheckPaymentResponse, RemoteState};
    use tokio::time::{sleep, timeout};

    fn key(address: &str) -> MonitorKey {
        MonitorKey::new(address, SupportedCurrency::Eth, 0.0333)
    }

    fn received(tx: &str) -> CheckPaymentResponse {
        CheckPaymentResponse {
            is_received: true,
            status: Some(RemoteState::Completed),
            tx_hash: Some(tx.to_string()),
            confirmations: Some(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn checks_immediately_then_every_interval() {
        let gw = MockGateway::new();
        let mut poller = StatusPoller::new(gw.clone());
        poller.watch(Some(key("0xabc")));

        sleep(Duration::from_secs(46)).await;
        // t = 0, 15, 30, 45
        assert_eq!(gw.check_calls(), 4);
        assert!(gw
            .check_requests()
            .iter()
            .all(|r| r.address == "0xabc" && r.expected_amount == 0.0333));
    }

    #[tokio::test(start_paused = true)]
    async fn inert_without_address() {
        let gw = MockGateway::new();
        let mut poller = StatusPoller::new(gw.clone());
        poller.watch(None);
        poller.watch(Some(key("")));

        sleep(Duration::from_secs(60)).await;
        assert_eq!(gw.check_calls(), 0);
        assert!(timeout(Duration::from_secs(1), poller.next()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn same_key_does_not_restart() {
        let gw = MockGateway::new();
        let mut poller = StatusPoller::new(gw.clone());
        poller.watch(Some(key("0xabc")));
        sleep(Duration::from_secs(1)).await;
        poller.watch(Some(key("0xabc")));
        sleep(Duration::from_secs(1)).await;

        assert_eq!(gw.check_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn changing_key_cancels_stale_polling() {
        let gw = MockGateway::new();
        let mut poller = StatusPoller::new(gw.clone());
        poller.watch(Some(key("0xold")));
        sleep(Duration::from_secs(1)).await;

        poller.watch(Some(key("0xnew")));
        sleep(Duration::from_secs(31)).await;

        let addresses: Vec<String> = gw.check_requests().into_iter().map(|r| r.address).collect();
        assert_eq!(addresses, vec!["0xold", "0xnew", "0xnew", "0xnew"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_results_are_discarded() {
        let gw = MockGateway::new();
        gw.push_check(Ok(received("0xstale")));
        let mut poller = StatusPoller::new(gw.clone());
        poller.watch(Some(key("0xold")));
        // let the first check land in the channel before switching
        sleep(Duration::from_millis(10)).await;

        poller.watch(Some(key("0xnew")));
        match poller.next().await {
            PollOutcome::Status(status) => assert!(!status.is_received()),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn each_result_replaces_the_last() {
        let gw = MockGateway::new();
        gw.push_check(Ok(received("0xdead")));
        let mut poller = StatusPoller::new(gw.clone());
        poller.watch(Some(key("0xabc")));

        assert!(matches!(poller.next().await, PollOutcome::Status(_)));
        assert_eq!(poller.status().tx_hash(), Some("0xdead"));

        // default mock answer is pending with no hash
        poller.next().await;
        assert_eq!(poller.status().tx_hash(), None);
        assert!(!poller.status().is_received());
    }

    #[tokio::test(start_paused = true)]
    async fn error_resets_status_and_is_reported_each_time() {
        let gw = MockGateway::new();
        gw.push_check(Ok(received("0xdead")));
        gw.push_check(Err(PaymentError::Network("blip".into())));
        gw.push_check(Err(PaymentError::Network("blip".into())));
        let mut poller = StatusPoller::new(gw.clone());
        poller.watch(Some(key("0xabc")));

        poller.next().await;
        assert!(poller.status().is_received());

        assert!(matches!(poller.next().await, PollOutcome::Error(_)));
        assert!(!poller.status().is_received());
        assert!(poller.error().is_some());
        assert!(matches!(poller.next().await, PollOutcome::Error(_)));

        // next success clears the error
        assert!(matches!(poller.next().await, PollOutcome::Status(_)));
        assert!(poller.error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn clearing_key_resets_status() {
        let gw = MockGateway::new();
        gw.push_check(Ok(received("0xdead")));
        let mut poller = StatusPoller::new(gw.clone());
        poller.watch(Some(key("0xabc")));
        poller.next().await;

        poller.watch(None);
        assert_eq!(poller.status(), &PaymentStatus::not_received());
        sleep(Duration::from_secs(60)).await;
        assert_eq!(gw.check_calls(), 1);
    }
}
