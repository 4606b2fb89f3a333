use crate::journal::{JournalEntry, SessionJournal};
use crate::poller::{MonitorKey, PollOutcome, StatusPoller, POLL_INTERVAL};
use crate::timer::{ExpiryTimer, TimerEvent, TICK_INTERVAL};
use chrono::Utc;
use cryptopay_core::{
    format_crypto_amount, validation, Countdown, Deposit, PaymentError, PaymentResult,
    PaymentSession, PaymentStatus, SessionEvent, SessionPhase, SupportedCurrency, WidgetOptions,
    PAYMENT_WINDOW_MINUTES,
};
use gateway::{CreatePaymentRequest, PaymentGateway, PaymentIntent};
use pricing::PriceConverter;
use std::sync::Arc;
use tokio::time::{sleep_until, Duration, Instant};

/// Delay between confirmation and the automatic close.
pub const CLOSE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
pub struct SessionTimings {
    pub poll_interval: Duration,
    pub tick_interval: Duration,
    pub close_delay: Duration,
    /// Used when the payment service does not report an expiry.
    pub payment_window: chrono::Duration,
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            tick_interval: TICK_INTERVAL,
            close_delay: CLOSE_DELAY,
            payment_window: chrono::Duration::minutes(PAYMENT_WINDOW_MINUTES),
        }
    }
}

type TextHook = Box<dyn FnMut(&str) + Send>;
type ErrorHook = Box<dyn FnMut(&PaymentError) + Send>;

/// Hooks the embedding application is notified through.
#[derive(Default)]
pub struct PaymentCallbacks {
    on_complete: Option<TextHook>,
    on_error: Option<ErrorHook>,
    on_pending: Option<TextHook>,
}

impl PaymentCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the transaction hash once the payment is confirmed.
    pub fn on_complete(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    /// Called for creation failures, poll errors (every occurrence) and expiry.
    pub fn on_error(mut self, f: impl FnMut(&PaymentError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Called with the payment service's session id when the address is issued.
    pub fn on_pending(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_pending = Some(Box::new(f));
        self
    }
}

enum Wake {
    Close,
    Poll(PollOutcome),
    Timer(TimerEvent),
}

/// Drives one payment widget: currency selection, address issuance,
/// countdown, confirmation polling and the automatic close.
///
/// Each widget owns its manager; nothing is shared between instances.
/// Background work (poller, timer) is cancelled whenever the session ends
/// and when the manager is dropped.
pub struct PaymentSessionManager {
    options: WidgetOptions,
    gateway: Arc<dyn PaymentGateway>,
    converter: PriceConverter,
    callbacks: PaymentCallbacks,
    journal: Option<SessionJournal>,
    timings: SessionTimings,
    session: PaymentSession,
    phase: SessionPhase,
    poller: StatusPoller,
    timer: ExpiryTimer,
    close_at: Option<Instant>,
    /// Window elapsed while a payment was reported received but unconfirmed.
    deadline_passed: bool,
    queued: Option<SessionEvent>,
    last_error: Option<PaymentError>,
}

impl PaymentSessionManager {
    pub fn new(
        options: WidgetOptions,
        gateway: Arc<dyn PaymentGateway>,
        converter: PriceConverter,
        callbacks: PaymentCallbacks,
    ) -> PaymentResult<Self> {
        validation::validate(&options).map_err(PaymentError::InvalidOptions)?;
        let timings = SessionTimings::default();

        Ok(Self {
            session: PaymentSession::new(options.fiat_amount),
            poller: StatusPoller::with_period(Arc::clone(&gateway), timings.poll_interval),
            timer: ExpiryTimer::new(timings.tick_interval),
            options,
            gateway,
            converter,
            callbacks,
            journal: None,
            timings,
            phase: SessionPhase::Idle,
            close_at: None,
            deadline_passed: false,
            queued: None,
            last_error: None,
        })
    }

    pub fn with_timings(mut self, timings: SessionTimings) -> Self {
        self.poller = StatusPoller::with_period(Arc::clone(&self.gateway), timings.poll_interval);
        self.timer = ExpiryTimer::new(timings.tick_interval);
        self.timings = timings;
        self
    }

    pub fn with_journal(mut self, journal: SessionJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn options(&self) -> &WidgetOptions {
        &self.options
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn session(&self) -> &PaymentSession {
        &self.session
    }

    /// Read-only copy for presentation code.
    pub fn snapshot(&self) -> PaymentSession {
        self.session.clone()
    }

    pub fn status(&self) -> &PaymentStatus {
        self.poller.status()
    }

    pub fn last_error(&self) -> Option<&PaymentError> {
        self.last_error.as_ref()
    }

    pub fn countdown(&self) -> Option<Countdown> {
        self.timer.remaining()
    }

    /// Amount to pay, formatted for display.
    pub fn quote(&self) -> Option<String> {
        let currency = self.session.selected_currency?;
        let amount = self.session.converted_amount?;
        Some(format_crypto_amount(amount, currency))
    }

    /// QR code content for the deposit address.
    pub fn payment_uri(&self) -> Option<String> {
        let currency = self.session.selected_currency?;
        let address = self.session.address()?;
        Some(currency.profile().payment_uri(address))
    }

    /// Resolve the price, create the payment and start monitoring it.
    ///
    /// Selecting the currency of the current session again returns the
    /// existing deposit without another backend call. Any other selection
    /// while a session exists is refused with [`PaymentError::SessionBusy`].
    pub async fn select_currency(&mut self, currency: SupportedCurrency) -> PaymentResult<Deposit> {
        self.discard_interrupted_setup();

        if !self.options.accepts(currency) {
            return Err(PaymentError::InvalidOptions(vec![format!(
                "{} is not an accepted currency",
                currency
            )]));
        }

        if self.session.created {
            return match (&self.session.deposit, self.session.selected_currency) {
                (Some(deposit), Some(selected)) if selected == currency => {
                    tracing::debug!(session_id = %deposit.session_id, "Payment already created for this selection");
                    Ok(deposit.clone())
                }
                _ => Err(PaymentError::SessionBusy),
            };
        }

        self.last_error = None;
        self.session.selected_currency = Some(currency);
        self.set_phase(SessionPhase::PriceResolving);
        let amount = self
            .converter
            .convert(self.session.fiat_amount, currency)
            .await;
        self.session.converted_amount = Some(amount);

        self.session.created = true;
        self.set_phase(SessionPhase::AddressRequesting);
        let req = CreatePaymentRequest { amount, currency };

        match self.gateway.create_payment(&req).await {
            Ok(intent) => Ok(self.activate(intent)),
            Err(err) => {
                tracing::error!(%currency, error = %err, "Payment creation failed");
                self.set_phase(SessionPhase::Failed);
                self.report_error(&err, "creation_failed");
                self.reset();
                Err(err)
            }
        }
    }

    /// Change the fiat amount. Re-quotes the selected currency and, while
    /// active, restarts polling for the new expected amount.
    pub async fn set_fiat_amount(&mut self, fiat_amount: f64) -> PaymentResult<()> {
        let mut candidate = self.options.clone();
        candidate.fiat_amount = fiat_amount;
        validation::validate(&candidate).map_err(PaymentError::InvalidOptions)?;

        self.options.fiat_amount = fiat_amount;
        self.session.fiat_amount = fiat_amount;

        if let Some(currency) = self.session.selected_currency {
            let amount = self.converter.convert(fiat_amount, currency).await;
            self.session.converted_amount = Some(amount);
            if self.phase == SessionPhase::Active {
                self.poller.watch(self.monitor_key());
            }
        }
        Ok(())
    }

    /// Close the widget without paying. Refused (returns `false`) once the
    /// payment has been received.
    pub fn dismiss(&mut self) -> bool {
        if self.poller.status().is_received() {
            tracing::info!("Dismiss refused, payment already received");
            return false;
        }
        if self.phase != SessionPhase::Idle {
            tracing::info!(session_id = ?self.session.session_id(), "Payment session dismissed");
            self.record("dismissed", |e| e);
            self.reset();
        }
        true
    }

    /// Wait for the next thing to happen to the session and apply it.
    ///
    /// Returns `None` once the session is idle. Cancel safe, so it can be
    /// raced against user input.
    pub async fn step(&mut self) -> Option<SessionEvent> {
        if let Some(event) = self.queued.take() {
            return Some(event);
        }
        loop {
            match self.phase {
                SessionPhase::Idle => return None,
                SessionPhase::PriceResolving | SessionPhase::AddressRequesting => {
                    self.discard_interrupted_setup();
                    return None;
                }
                _ => {}
            }

            let close_at = self.close_at;
            let wake = tokio::select! {
                biased;
                _ = sleep_until(close_at.unwrap_or_else(Instant::now)), if close_at.is_some() => Wake::Close,
                outcome = self.poller.next() => Wake::Poll(outcome),
                event = self.timer.next() => Wake::Timer(event),
            };

            let event = match wake {
                Wake::Close => Some(self.close()),
                Wake::Poll(outcome) => self.on_poll(outcome),
                Wake::Timer(event) => self.on_timer(event),
            };
            if event.is_some() {
                return event;
            }
        }
    }

    /// Step until the session is back to idle, returning every event.
    pub async fn run_until_idle(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.step().await {
            events.push(event);
        }
        events
    }

    fn activate(&mut self, intent: PaymentIntent) -> Deposit {
        let now = Utc::now();
        let expires_at = intent
            .expires_at
            .filter(|t| *t > now)
            .unwrap_or_else(|| now + self.timings.payment_window);

        if Some(intent.currency) != self.session.selected_currency {
            tracing::warn!(
                requested = ?self.session.selected_currency,
                issued = %intent.currency,
                "Payment service issued a different currency"
            );
        }

        let deposit = Deposit {
            session_id: intent.id,
            address: intent.address,
            created_at: now,
            expires_at,
        };
        self.session.deposit = Some(deposit.clone());
        self.set_phase(SessionPhase::Active);
        self.timer.start(expires_at);
        self.poller.watch(self.monitor_key());

        tracing::info!(
            session_id = %deposit.session_id,
            address = %deposit.address,
            expires_at = %expires_at,
            "Payment session active"
        );
        if let Some(hook) = self.callbacks.on_pending.as_mut() {
            hook(&deposit.session_id);
        }
        self.queued = Some(SessionEvent::Pending {
            session_id: deposit.session_id.clone(),
        });
        self.record("pending", |e| e);
        deposit
    }

    fn on_poll(&mut self, outcome: PollOutcome) -> Option<SessionEvent> {
        if self.phase != SessionPhase::Active {
            return None;
        }
        match outcome {
            PollOutcome::Status(status) => {
                self.last_error = None;
                match status.tx_hash() {
                    Some(tx_hash) if status.is_received() => Some(self.complete(tx_hash.to_string())),
                    _ if self.deadline_passed => Some(self.expire()),
                    _ => Some(SessionEvent::StatusChanged(status)),
                }
            }
            PollOutcome::Error(_) if self.deadline_passed => Some(self.expire()),
            PollOutcome::Error(err) => {
                self.report_error(&err, "poll_error");
                Some(SessionEvent::Error(err))
            }
        }
    }

    fn on_timer(&mut self, event: TimerEvent) -> Option<SessionEvent> {
        if self.phase != SessionPhase::Active {
            return None;
        }
        match event {
            TimerEvent::Tick(countdown) => Some(SessionEvent::Countdown(countdown)),
            TimerEvent::Expired if self.poller.status().is_received() => {
                // expires on the first later poll that does not confirm
                tracing::info!("Payment window elapsed after the payment was received");
                self.deadline_passed = true;
                None
            }
            TimerEvent::Expired => Some(self.expire()),
        }
    }

    fn expire(&mut self) -> SessionEvent {
        tracing::warn!(session_id = ?self.session.session_id(), "Payment window expired");
        self.set_phase(SessionPhase::Expired);
        let err = PaymentError::Expired;
        self.report_error(&err, "expired");
        self.reset();
        SessionEvent::Error(err)
    }

    fn complete(&mut self, tx_hash: String) -> SessionEvent {
        // latch the confirmation: no more polls can regress it
        self.poller.halt();
        self.timer.stop();
        self.set_phase(SessionPhase::Completed);
        self.close_at = Some(Instant::now() + self.timings.close_delay);

        tracing::info!(
            session_id = ?self.session.session_id(),
            tx_hash = %tx_hash,
            "Payment confirmed"
        );
        if let Some(hook) = self.callbacks.on_complete.as_mut() {
            hook(&tx_hash);
        }
        let journal_hash = tx_hash.clone();
        self.record("completed", move |e| e.with_tx_hash(journal_hash));
        SessionEvent::Completed { tx_hash }
    }

    fn close(&mut self) -> SessionEvent {
        self.record("closed", |e| e);
        self.reset();
        SessionEvent::Closed
    }

    fn reset(&mut self) {
        self.timer.stop();
        self.poller.watch(None);
        self.close_at = None;
        self.deadline_passed = false;
        self.queued = None;
        self.session.reset();
        self.set_phase(SessionPhase::Idle);
    }

    /// A `select_currency` future dropped mid-flight leaves a half-built session.
    fn discard_interrupted_setup(&mut self) {
        if matches!(
            self.phase,
            SessionPhase::PriceResolving | SessionPhase::AddressRequesting
        ) {
            tracing::warn!(phase = self.phase.as_str(), "Discarding interrupted session setup");
            self.reset();
        }
    }

    fn monitor_key(&self) -> Option<MonitorKey> {
        let deposit = self.session.deposit.as_ref()?;
        let currency = self.session.selected_currency?;
        Some(MonitorKey::new(
            deposit.address.clone(),
            currency,
            self.session.converted_amount.unwrap_or_default(),
        ))
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.phase != phase {
            tracing::debug!(from = self.phase.as_str(), to = phase.as_str(), "Session phase changed");
            self.phase = phase;
        }
    }

    fn report_error(&mut self, err: &PaymentError, event_type: &str) {
        self.last_error = Some(err.clone());
        if let Some(hook) = self.callbacks.on_error.as_mut() {
            hook(err);
        }
        let message = err.to_string();
        self.record(event_type, move |e| e.with_error(message));
    }

    fn record(&self, event_type: &str, extra: impl FnOnce(JournalEntry) -> JournalEntry) {
        let Some(journal) = &self.journal else {
            return;
        };
        let entry = JournalEntry::new(event_type, self.phase.as_str())
            .with_session(self.session.session_id())
            .with_currency(self.session.selected_currency.map(|c| c.to_string()))
            .with_deposit(self.session.address(), self.session.converted_amount);
        if let Err(e) = journal.record(&extra(entry)) {
            tracing::warn!(error = %e, path = %journal.path().display(), "Failed to write journal entry");
        }
    }
}
