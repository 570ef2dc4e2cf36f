use crate::types::Publication;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Unsubscribed,
    Subscribing,
    Subscribed,
}

/// Mutable state of a client subscription.
#[derive(Debug)]
pub struct SubscriptionState {
    pub status: SubscriptionStatus,

    /// Whether the application wants the channel subscribed
    pub wants: bool,

    /// Bumped on every subscribe attempt and every loss; a reply carrying
    /// an older attempt number is stale
    pub attempt: u64,

    pub recoverable: bool,
    pub offset: u64,
    pub epoch: String,

    /// Set after the first successful subscribe
    pub subscribed_once: bool,
}

impl SubscriptionState {
    pub fn new() -> Self {
        Self {
            status: SubscriptionStatus::Unsubscribed,
            wants: false,
            attempt: 0,
            recoverable: false,
            offset: 0,
            epoch: String::new(),
            subscribed_once: false,
        }
    }

    /// Starts a new attempt and returns its number.
    pub fn begin_attempt(&mut self) -> u64 {
        self.attempt += 1;
        self.status = SubscriptionStatus::Subscribing;
        self.attempt
    }

    /// Drops to `Unsubscribed`, invalidating any in-flight attempt.
    /// Returns the status held before.
    pub fn reset(&mut self) -> SubscriptionStatus {
        self.attempt += 1;
        std::mem::replace(&mut self.status, SubscriptionStatus::Unsubscribed)
    }

    pub fn is_current(&self, attempt: u64) -> bool {
        self.attempt == attempt && self.status == SubscriptionStatus::Subscribing
    }

    /// Whether the next subscribe should ask the server for missed publications.
    pub fn should_recover(&self) -> bool {
        self.subscribed_once && self.recoverable
    }

    /// Remembers the stream position of a delivered publication.
    pub fn track(&mut self, publication: &Publication) {
        if self.recoverable && publication.offset > self.offset {
            self.offset = publication.offset;
        }
    }
}

impl Default for SubscriptionState {
    fn default() -> Self {
        Self::new()
    }
}
