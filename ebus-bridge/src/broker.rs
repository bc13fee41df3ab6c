//! Broker collaborator: out of scope to implement against a real message
//! bus, but the trait the link driver polls and an in-process test double.

use std::collections::VecDeque;
use std::time::Duration;

use crate::envelope::{TelegramPayload, TelegramRequest};
use crate::errors::BrokerError;

/// The driver's view of a message broker connection.
///
/// A real deployment implements this over an MQTT (or similar) client;
/// that wiring is deliberately not shipped here — see `LoopbackBroker` for
/// the in-process stand-in used by the driver's own tests.
pub trait BrokerClient {
    /// Wait up to `timeout` for a pending outgoing-telegram request.
    fn try_recv_request(&mut self, timeout: Duration) -> Result<Option<TelegramRequest>, BrokerError>;

    /// Publish an observed or answered telegram.
    fn publish(&mut self, payload: &TelegramPayload) -> Result<(), BrokerError>;
}

/// An in-process broker double: requests are queued in by the test, and
/// published payloads are collected for later inspection.
#[derive(Default)]
pub struct LoopbackBroker {
    pending: VecDeque<TelegramRequest>,
    published: Vec<TelegramPayload>,
}

impl LoopbackBroker {
    /// An empty loopback broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a request as if it had arrived from the broker.
    pub fn push_request(&mut self, request: TelegramRequest) {
        self.pending.push_back(request);
    }

    /// The payloads published so far, in order.
    pub fn published(&self) -> &[TelegramPayload] {
        &self.published
    }
}

impl BrokerClient for LoopbackBroker {
    fn try_recv_request(&mut self, _timeout: Duration) -> Result<Option<TelegramRequest>, BrokerError> {
        Ok(self.pending.pop_front())
    }

    fn publish(&mut self, payload: &TelegramPayload) -> Result<(), BrokerError> {
        self.published.push(payload.clone());
        Ok(())
    }
}
