//! Payment session state machine and its background monitors.

pub mod journal;
pub mod manager;
pub mod poller;
pub mod timer;

pub use journal::{JournalEntry, SessionJournal};
pub use manager::{PaymentCallbacks, PaymentSessionManager, SessionTimings, CLOSE_DELAY};
pub use poller::{MonitorKey, PollOutcome, StatusPoller, POLL_INTERVAL};
pub use timer::{ExpiryTimer, TimerEvent, TICK_INTERVAL};
