//! The link driver (C5): a single-threaded cooperative loop pumping bytes
//! between the adapter transport and the codec/framer/TX engine, and
//! surfacing prepared RX payloads and requests to the broker collaborator.

use std::time::{Duration, Instant};

use ebus_link::{EnhancedDecoder, EnhancedEvent, EscapeDecoder, RxFramer, TxEngine, TxState, TxTimeouts};

use crate::broker::BrokerClient;
use crate::envelope::{TelegramPayload, TelegramRequest};
use crate::errors::TransportError;
use crate::transport::AdapterTransport;

/// Request-poll timeout for step 1 — bounded per spec.md §5 ("≤10 ms").
const REQUEST_POLL_TIMEOUT: Duration = Duration::from_millis(10);

/// One iteration of the cooperative loop, generic over the adapter
/// transport and broker collaborators so it can run against fakes in
/// tests.
pub struct Driver<T: AdapterTransport, B: BrokerClient> {
    transport: T,
    broker: B,
    enhanced: EnhancedDecoder,
    escape: EscapeDecoder,
    framer: RxFramer,
    tx: TxEngine,
    pending_publish: Option<TelegramPayload>,
}

impl<T: AdapterTransport, B: BrokerClient> Driver<T, B> {
    /// Wrap a connected transport and broker into a fresh driver, driving
    /// the TX engine with the given timeouts (typically
    /// `Config::tx_timeouts()`).
    pub fn new(transport: T, broker: B, tx_timeouts: TxTimeouts) -> Self {
        Self {
            transport,
            broker,
            enhanced: EnhancedDecoder::new(),
            escape: EscapeDecoder::new(),
            framer: RxFramer::new(),
            tx: TxEngine::with_timeouts(tx_timeouts),
            pending_publish: None,
        }
    }

    /// Count of plausible telegrams the RX framer has forwarded so far.
    pub fn rx_ok_count(&self) -> u64 {
        self.framer.ok_count()
    }

    /// Count of implausible (length ≤ 1) intervals the RX framer has seen.
    pub fn rx_bad_count(&self) -> u64 {
        self.framer.bad_count()
    }

    /// Run exactly one loop iteration: request ingest, RX publish, adapter
    /// drain, TX emit.
    pub fn run_once(&mut self, now: Instant) -> Result<(), TransportError> {
        self.ingest_request()?;
        self.publish_pending()?;
        self.drain_adapter(now)?;
        self.emit_tx(now)?;
        Ok(())
    }

    fn ingest_request(&mut self) -> Result<(), TransportError> {
        if self.tx.state() != TxState::Idle {
            return Ok(());
        }
        let request = self
            .broker
            .try_recv_request(REQUEST_POLL_TIMEOUT)
            .map_err(|e| TransportError::Io(std::io::Error::other(e.to_string())))?;
        if let Some(TelegramRequest { telegram }) = request
            && self.tx.submit(telegram).is_err()
        {
            log::warn!("dropped inbound request: TX engine unexpectedly busy");
        }
        Ok(())
    }

    fn publish_pending(&mut self) -> Result<(), TransportError> {
        if let Some(payload) = self.pending_publish.take() {
            self.broker
                .publish(&payload)
                .map_err(|e| TransportError::Io(std::io::Error::other(e.to_string())))?;
        }
        Ok(())
    }

    fn drain_adapter(&mut self, _now: Instant) -> Result<(), TransportError> {
        while self.pending_publish.is_none() {
            let Some(wire_byte) = self.transport.read_nonblocking()? else {
                break;
            };
            let Some(event) = self.enhanced.decode(wire_byte) else {
                continue;
            };
            match event {
                EnhancedEvent::Byte(b) => {
                    if let Some(raw) = self.escape.decode(b) {
                        self.tx.on_rx_byte(raw);
                        if let Some(telegram) = self.framer.push(raw) {
                            self.pending_publish = Some(TelegramPayload::new(telegram));
                        }
                    }
                }
                EnhancedEvent::ArbitrationWon => self.tx.on_arbitration_result(true),
                EnhancedEvent::ArbitrationLost => self.tx.on_arbitration_result(false),
                EnhancedEvent::Ignored(nibble) => {
                    log::debug!("ignored enhanced command nibble {nibble}");
                }
            }
        }
        Ok(())
    }

    fn emit_tx(&mut self, now: Instant) -> Result<(), TransportError> {
        let output = self.tx.tick(now);
        if let Some([first, second]) = output.bytes {
            self.transport.write(&[first, second])?;
        }
        Ok(())
    }
}
