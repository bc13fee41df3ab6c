//! TX engine: drives a single master request through bus arbitration,
//! data send, ACK await, response capture, and slave-ACK emission.

use std::fmt;
use std::time::{Duration, Instant};

use crate::codec::{EnhancedCmd, encode_enhanced, encode_escape};
use crate::telegram::{Telegram, is_master_address};

/// The TX sub-state machine's states, in the order the request moves
/// through them. Declaration order matters: `state >= TxState::SendData`
/// is used to decide whether the echo tap is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TxState {
    /// No request in flight.
    Idle,
    /// A request was just accepted; plausibility has not been checked yet.
    Start,
    /// Emitting the arbitration byte.
    ArbInit,
    /// Waiting for the adapter to report arbitration success or failure.
    ArbWait,
    /// Pacing the remaining data octets out, one echo at a time.
    SendData,
    /// Waiting for the slave's ACK/NAK (or the broadcast settle delay).
    AwaitAck,
    /// Waiting for the slave's response frame.
    AwaitResp,
    /// Emitting our ACK/NAK of the slave's response.
    SendAck,
    /// Emitting the trailing SYN.
    SendSyn,
    /// The request is done; about to fall back to `Idle`.
    Finished,
}

/// Returned by [`TxEngine::submit`] when a request arrives while TX is not
/// idle. The caller should drop the request and log a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxBusy;

impl fmt::Display for TxBusy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TX engine is busy with another request")
    }
}

impl std::error::Error for TxBusy {}

/// Configurable timeouts for the TX engine, in wall-clock time relative to
/// the last state change.
#[derive(Debug, Clone, Copy)]
pub struct TxTimeouts {
    /// How long to wait for an arbitration result before giving up.
    pub arbitration: Duration,
    /// How long to wait for a slave ACK/NAK before giving up.
    pub ack: Duration,
    /// How long to wait for a slave response frame before giving up.
    pub response: Duration,
    /// How long to wait after a broadcast before releasing the bus with a
    /// SYN (no ACK/response is ever expected for a broadcast).
    pub broadcast_settle: Duration,
}

impl Default for TxTimeouts {
    fn default() -> Self {
        Self {
            arbitration: Duration::from_secs(1),
            ack: Duration::from_secs(1),
            response: Duration::from_secs(1),
            broadcast_settle: Duration::from_millis(10),
        }
    }
}

/// Outbound octets prepared by a [`TxEngine::tick`] call, if any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOutput {
    /// The enhanced-framed pair to write to the adapter, if one was
    /// prepared this tick.
    pub bytes: Option<[u8; 2]>,
}

impl TxOutput {
    fn none() -> Self {
        Self::default()
    }

    fn pair(first: u8, second: u8) -> Self {
        Self { bytes: Some([first, second]) }
    }

    /// Whether any bytes were prepared.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_none()
    }
}

const BROADCAST: u8 = 0xFE;

/// Drives at most one master request at a time through arbitration,
/// pacing, ACK, and response capture.
///
/// `submit` accepts a new request (error if one is already in flight);
/// `tick` is polled once per driver iteration and returns any outbound
/// enhanced pair; `on_arbitration_result` and `on_rx_byte` feed back the
/// adapter's decoded echo stream.
pub struct TxEngine {
    state: TxState,
    timeouts: TxTimeouts,
    last_change: Instant,
    request: Telegram,
    expanded: Vec<u8>,
    enhanced: Vec<u8>,
    index: usize,
    echo: Telegram,
    arbitration: Option<bool>,
}

impl TxEngine {
    /// A fresh, idle engine with the default (spec) timeouts.
    pub fn new() -> Self {
        Self::with_timeouts(TxTimeouts::default())
    }

    /// A fresh, idle engine with custom timeouts.
    pub fn with_timeouts(timeouts: TxTimeouts) -> Self {
        Self {
            state: TxState::Idle,
            timeouts,
            last_change: Instant::now(),
            request: Telegram::new(),
            expanded: Vec::new(),
            enhanced: Vec::new(),
            index: 0,
            echo: Telegram::new(),
            arbitration: None,
        }
    }

    /// The current state, exposed so a caller can check `state() ==
    /// TxState::Idle` before writing to the adapter (testable property 6).
    pub fn state(&self) -> TxState {
        self.state
    }

    /// Accept a new master request. Only one telegram is in flight at a
    /// time: a request arriving while TX is not idle is rejected.
    pub fn submit(&mut self, request: Telegram) -> Result<(), TxBusy> {
        if self.state != TxState::Idle {
            return Err(TxBusy);
        }
        self.request = request;
        self.state = TxState::Start;
        Ok(())
    }

    /// Feed the adapter's arbitration-result report. Only has an effect
    /// while TX is waiting for one (`ArbWait`).
    pub fn on_arbitration_result(&mut self, won: bool) {
        if self.state == TxState::ArbWait {
            self.arbitration = Some(won);
        }
    }

    /// Feed one decoded raw bus octet into the echo/response tap. A no-op
    /// unless TX has a request in flight at `SendData` or later (testable
    /// property from spec.md §4.3 item 3).
    pub fn on_rx_byte(&mut self, byte: u8) {
        if self.state >= TxState::SendData {
            self.echo.push_bounded(byte);
        }
    }

    fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_change)
    }

    fn enter(&mut self, next: TxState, now: Instant) {
        if next != self.state {
            self.state = next;
            self.last_change = now;
        }
    }

    /// Advance the state machine by one step and return any outbound
    /// enhanced pair prepared along the way. Call once per driver
    /// iteration.
    pub fn tick(&mut self, now: Instant) -> TxOutput {
        match self.state {
            TxState::Idle => TxOutput::none(),

            TxState::Start => {
                if self.request.is_plausible_tx() {
                    self.expanded.clear();
                    for &b in self.request.as_bytes() {
                        encode_escape(b, &mut self.expanded);
                    }
                    self.enhanced.clear();
                    for &b in &self.expanded {
                        let (f, s) = encode_enhanced(b, EnhancedCmd::Received);
                        self.enhanced.push(f);
                        self.enhanced.push(s);
                    }
                    self.index = 0;
                    self.enter(TxState::ArbInit, now);
                } else {
                    log::warn!("ignored TX request: not a plausible master telegram");
                    self.enter(TxState::Finished, now);
                }
                TxOutput::none()
            }

            TxState::ArbInit => {
                let qq = self.request.get(0);
                let (first, second) = encode_enhanced(qq, EnhancedCmd::Arbitration);
                self.echo = Telegram::new();
                self.echo.push_bounded(self.expanded.first().copied().unwrap_or(qq));
                self.arbitration = None;
                self.enter(TxState::ArbWait, now);
                TxOutput::pair(first, second)
            }

            TxState::ArbWait => {
                match self.arbitration {
                    Some(true) => {
                        self.echo.truncate(1);
                        self.enter(TxState::SendData, now);
                    }
                    Some(false) => {
                        log::info!("arbitration lost, aborting request");
                        self.enter(TxState::Finished, now);
                    }
                    None => {
                        if self.elapsed(now) > self.timeouts.arbitration {
                            log::warn!("arbitration timeout");
                            self.enter(TxState::Finished, now);
                        }
                    }
                }
                TxOutput::none()
            }

            TxState::SendData => {
                if self.elapsed(now) > self.timeouts.arbitration {
                    log::warn!("send-data echo timeout");
                    self.enter(TxState::Finished, now);
                    return TxOutput::none();
                }
                if self.index == 0 {
                    // The QQ pair was already sent during arbitration.
                    self.index = 2;
                    TxOutput::none()
                } else if self.index < self.enhanced.len() {
                    if self.echo.len() * 2 >= self.index {
                        let first = self.enhanced[self.index];
                        let second = self.enhanced[self.index + 1];
                        self.index += 2;
                        TxOutput::pair(first, second)
                    } else {
                        TxOutput::none()
                    }
                } else {
                    self.enter(TxState::AwaitAck, now);
                    TxOutput::none()
                }
            }

            TxState::AwaitAck => {
                let zz = self.request.get(1);
                let req_len = self.request.len();
                if zz == BROADCAST {
                    if self.elapsed(now) > self.timeouts.broadcast_settle {
                        self.enter(TxState::SendSyn, now);
                    }
                } else if self.echo.len() > req_len {
                    match self.echo.get(req_len) {
                        0x00 => self.enter(TxState::AwaitResp, now),
                        _ => self.enter(TxState::SendSyn, now), // NAK or anything else: no retry
                    }
                } else if self.elapsed(now) > self.timeouts.ack {
                    log::warn!("ack timeout");
                    self.enter(TxState::Finished, now);
                }
                TxOutput::none()
            }

            TxState::AwaitResp => {
                let zz = self.request.get(1);
                let req_len = self.request.len();
                if is_master_address(zz) {
                    self.enter(TxState::SendSyn, now);
                } else {
                    let nn = self.echo.get(req_len + 1);
                    if self.echo.len() >= req_len + 3 && nn <= 16 && self.echo.len() >= req_len + 3 + nn as usize
                    {
                        self.enter(TxState::SendAck, now);
                    } else if self.elapsed(now) > self.timeouts.response {
                        log::warn!("response timeout");
                        self.enter(TxState::Finished, now);
                    }
                }
                TxOutput::none()
            }

            TxState::SendAck => {
                let ok = self.echo.slave_crc_ok(self.request.len());
                let (first, second) = if ok {
                    encode_enhanced(0x00, EnhancedCmd::Received)
                } else {
                    log::warn!("bad slave CRC, sending NAK");
                    encode_enhanced(0xFF, EnhancedCmd::Received)
                };
                self.enter(if ok { TxState::SendSyn } else { TxState::Finished }, now);
                TxOutput::pair(first, second)
            }

            TxState::SendSyn => {
                let (first, second) = encode_enhanced(0xAA, EnhancedCmd::Received);
                self.enter(TxState::Finished, now);
                TxOutput::pair(first, second)
            }

            TxState::Finished => {
                log::debug!("TX request finished");
                self.index = 0;
                self.enhanced.clear();
                self.expanded.clear();
                self.echo = Telegram::new();
                self.arbitration = None;
                self.enter(TxState::Idle, now);
                TxOutput::none()
            }
        }
    }
}

impl Default for TxEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::ebus_crc;

    fn make_request(qq: u8, zz: u8, pb: u8, sb: u8, data: &[u8]) -> Telegram {
        let mut bytes = vec![qq, zz, pb, sb, data.len() as u8];
        bytes.extend_from_slice(data);
        let crc = ebus_crc(&bytes);
        bytes.push(crc);
        Telegram::from_bytes(&bytes)
    }

    #[test]
    fn idle_iff_no_outstanding_work() {
        let engine = TxEngine::new();
        assert_eq!(engine.state(), TxState::Idle);
    }

    #[test]
    fn busy_request_is_rejected() {
        let mut engine = TxEngine::new();
        let req = make_request(0x10, 0xFE, 0xB5, 0x16, &[0x01, 0x70, 0x10]);
        engine.submit(req.clone()).unwrap();
        assert_eq!(engine.submit(req), Err(TxBusy));
    }

    #[test]
    fn s3_arbitration_won_broadcast_walk() {
        let mut engine = TxEngine::new();
        let req = make_request(0x10, 0xFE, 0xB5, 0x16, &[0x01, 0x70, 0x10]);
        engine.submit(req).unwrap();

        let t0 = Instant::now();
        // Start -> ArbInit (no bytes yet)
        assert!(engine.tick(t0).is_empty());
        assert_eq!(engine.state(), TxState::ArbInit);

        // ArbInit -> ArbWait, emits arbitration pair for QQ=0x10 (cmd=2)
        let out = engine.tick(t0);
        assert_eq!(out.bytes, Some([0xC8, 0x90]));
        assert_eq!(engine.state(), TxState::ArbWait);

        // Adapter reports arbitration success.
        engine.on_arbitration_result(true);
        assert!(engine.tick(t0).is_empty());
        assert_eq!(engine.state(), TxState::SendData);

        // First SendData tick just advances the index past the QQ pair.
        assert!(engine.tick(t0).is_empty());

        // Remaining 8 source octets after QQ: ZZ PB SB NN D1 D2 D3 CRC.
        let remaining = [0xFEu8, 0xB5, 0x16, 0x03, 0x01, 0x70, 0x10, 0x52];
        let mut sent = Vec::new();
        for &b in &remaining {
            let out = engine.tick(t0);
            let pair = out.bytes.expect("expected a pair");
            sent.push(pair);
            // Echo it back before the next pair is sent.
            engine.on_rx_byte(b);
        }
        assert_eq!(sent.len(), remaining.len());
        // One more tick notices index has caught up to the end of T_ee.
        assert!(engine.tick(t0).is_empty());
        assert_eq!(engine.state(), TxState::AwaitAck);

        // Broadcast: no ACK/response, just waits out the settle delay.
        assert!(engine.tick(t0).is_empty());
        let t1 = t0 + Duration::from_millis(11);
        assert!(engine.tick(t1).is_empty()); // AwaitAck -> SendSyn
        assert_eq!(engine.state(), TxState::SendSyn);
        let out = engine.tick(t1); // SendSyn emits and -> Finished
        assert_eq!(out.bytes, Some([0xC6, 0xAA])); // SYN
        assert_eq!(engine.state(), TxState::Finished);

        assert!(engine.tick(t1).is_empty());
        assert_eq!(engine.state(), TxState::Idle);
    }

    #[test]
    fn s4_arbitration_lost_aborts_without_further_bytes() {
        let mut engine = TxEngine::new();
        let req = make_request(0x10, 0x08, 0xB5, 0x16, &[0x01]);
        engine.submit(req).unwrap();
        let now = Instant::now();
        engine.tick(now); // Start -> ArbInit
        engine.tick(now); // ArbInit -> ArbWait (emits arbitration pair)

        engine.on_arbitration_result(false);
        let out = engine.tick(now);
        assert!(out.is_empty());
        assert_eq!(engine.state(), TxState::Finished);
    }

    #[test]
    fn s5_slave_response_with_good_crc_is_acked() {
        let mut engine = TxEngine::new();
        let req = make_request(0x10, 0x08, 0xB5, 0x16, &[0x01]);
        let req_len = req.len();
        engine.submit(req.clone()).unwrap();
        let now = Instant::now();

        engine.tick(now); // Start -> ArbInit
        engine.tick(now); // ArbInit -> ArbWait
        engine.on_arbitration_result(true);
        engine.tick(now); // ArbWait -> SendData
        engine.tick(now); // skip QQ pair

        // Drive SendData to completion by echoing each emitted pair.
        loop {
            let out = engine.tick(now);
            if engine.state() != TxState::SendData {
                assert!(out.is_empty());
                break;
            }
            if let Some(_pair) = out.bytes {
                // Figure out which source byte we just sent from `request`.
                let sent_index = (engine.index - 2) / 2;
                let byte = req.as_bytes()[sent_index];
                engine.on_rx_byte(byte);
            }
        }
        assert_eq!(engine.state(), TxState::AwaitAck);

        // Slave ACKs the request.
        engine.on_rx_byte(0x00);
        assert_eq!(engine.echo.len(), req_len + 1);
        engine.tick(now);
        assert_eq!(engine.state(), TxState::AwaitResp);

        // Slave responds: NN'=2, data, crc.
        let resp_data = [0x55u8, 0x66];
        let mut resp = vec![resp_data.len() as u8];
        resp.extend_from_slice(&resp_data);
        let resp_crc = ebus_crc(&resp);
        resp.push(resp_crc);
        for b in resp {
            engine.on_rx_byte(b);
        }
        engine.tick(now);
        assert_eq!(engine.state(), TxState::SendAck);

        let out = engine.tick(now);
        assert_eq!(out.bytes, Some(encode_enhanced(0x00, EnhancedCmd::Received).into()));
        assert_eq!(engine.state(), TxState::SendSyn);

        let out = engine.tick(now);
        assert_eq!(out.bytes, Some(encode_enhanced(0xAA, EnhancedCmd::Received).into()));
        assert_eq!(engine.state(), TxState::Finished);
    }

    #[test]
    fn arbitration_timeout_finishes_without_result() {
        let mut engine = TxEngine::new();
        let req = make_request(0x10, 0x08, 0xB5, 0x16, &[0x01]);
        engine.submit(req).unwrap();
        let t0 = Instant::now();
        engine.tick(t0); // Start -> ArbInit
        engine.tick(t0); // ArbInit -> ArbWait

        let t1 = t0 + Duration::from_millis(1001);
        let out = engine.tick(t1);
        assert!(out.is_empty());
        assert_eq!(engine.state(), TxState::Finished);
    }

    #[test]
    fn implausible_request_finishes_without_emitting() {
        let mut engine = TxEngine::new();
        let bad = Telegram::from_bytes(&[0x00, 0x08, 0xB5, 0x16, 0x01, 0x00]); // 0x00 not a master addr
        engine.submit(bad).unwrap();
        let out = engine.tick(Instant::now());
        assert!(out.is_empty());
        assert_eq!(engine.state(), TxState::Finished);
    }
}
