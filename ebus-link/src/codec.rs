//! Byte-stream codecs: raw escape substitution and the adapter's
//! "enhanced" two-byte framing.

/// Escape-encode a single raw bus octet, pushing the result (one or two
/// octets) into `out`.
///
/// `0xAA` → `0xA9 0x01`; `0xA9` → `0xA9 0x00`; everything else unchanged.
pub fn encode_escape(byte: u8, out: &mut Vec<u8>) {
    match byte {
        0xAA => out.extend_from_slice(&[0xA9, 0x01]),
        0xA9 => out.extend_from_slice(&[0xA9, 0x00]),
        b => out.push(b),
    }
}

/// Stateful decoder mirror of [`encode_escape`].
///
/// Escape state (whether the previous octet was the `0xA9` escape marker)
/// persists across calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct EscapeDecoder {
    pending: bool,
}

impl EscapeDecoder {
    /// A fresh decoder with no pending escape.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw wire octet; returns the decoded logical octet, if the
    /// pair is complete (an `0xA9` marker alone produces no output yet).
    pub fn decode(&mut self, byte: u8) -> Option<u8> {
        if self.pending {
            self.pending = false;
            return Some(match byte {
                0x00 => 0xA9,
                0x01 => 0xAA,
                other => other,
            });
        }
        if byte == 0xA9 {
            self.pending = true;
            return None;
        }
        Some(byte)
    }
}

/// Command nibble carried by an enhanced-framed pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnhancedCmd {
    /// Ordinary received/transmitted data octet.
    Received,
    /// Arbitration start (outbound) / success (inbound).
    Arbitration,
    /// Arbitration failure.
    Fail,
}

impl EnhancedCmd {
    fn nibble(self) -> u8 {
        match self {
            Self::Received => 1,
            Self::Arbitration => 2,
            Self::Fail => 10,
        }
    }
}

/// Encode one source octet as its two-octet enhanced-framing pair.
///
/// `first = 0xC0 | (cmd << 2) | ((b & 0xC0) >> 6)`, `second = 0x80 | (b &
/// 0x3F)`.
pub fn encode_enhanced(byte: u8, cmd: EnhancedCmd) -> (u8, u8) {
    let first = 0xC0 | (cmd.nibble() << 2) | ((byte & 0xC0) >> 6);
    let second = 0x80 | (byte & 0x3F);
    (first, second)
}

/// A decoded enhanced-framing event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnhancedEvent {
    /// An ordinary data octet (from a `cccc == 1` pair, or a legacy
    /// single-octet passthrough).
    Byte(u8),
    /// The adapter reported arbitration success (`cccc == 2`).
    ArbitrationWon,
    /// The adapter reported arbitration failure (`cccc == 10`).
    ArbitrationLost,
    /// An unrecognized command nibble was dropped.
    Ignored(u8),
}

/// Stateful decoder for the adapter's enhanced two-byte framing.
///
/// Holds the first octet of a pair ("first-byte pending") until its
/// partner arrives. Any octet with the top bit clear is a legacy
/// passthrough carrying its value directly and needs no partner.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnhancedDecoder {
    first: Option<u8>,
}

impl EnhancedDecoder {
    /// A fresh decoder with no pending first byte.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one wire octet; returns a decoded event once a full pair (or a
    /// legacy single octet) is available.
    pub fn decode(&mut self, byte: u8) -> Option<EnhancedEvent> {
        if byte & 0x80 == 0 {
            // Legacy passthrough: bit 7 clear, value carried directly.
            return Some(EnhancedEvent::Byte(byte));
        }
        if byte & 0xC0 == 0xC0 {
            // First byte of a pair.
            self.first = Some(byte);
            return None;
        }
        // byte & 0xC0 == 0x80: second byte of a pair.
        let first = self.first.take()?;
        let b = ((first & 0x03) << 6) | (byte & 0x3F);
        let cccc = (first & 0x3C) >> 2;
        Some(match cccc {
            2 => EnhancedEvent::ArbitrationWon,
            10 => EnhancedEvent::ArbitrationLost,
            1 => EnhancedEvent::Byte(b),
            other => {
                log::debug!("ignoring enhanced command nibble {other}");
                EnhancedEvent::Ignored(other)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_round_trip_for_every_byte() {
        for b in 0u8..=255 {
            let mut wire = Vec::new();
            encode_escape(b, &mut wire);
            let mut dec = EscapeDecoder::new();
            let mut out = None;
            for w in wire {
                if let Some(v) = dec.decode(w) {
                    out = Some(v);
                }
            }
            assert_eq!(out, Some(b), "round trip failed for {b:#04x}");
        }
    }

    #[test]
    fn escape_non_special_bytes_pass_through_unchanged() {
        let mut out = Vec::new();
        encode_escape(0x10, &mut out);
        assert_eq!(out, vec![0x10]);
    }

    #[test]
    fn enhanced_pair_round_trip_for_every_byte_and_cmd() {
        for cmd in [EnhancedCmd::Received, EnhancedCmd::Arbitration] {
            for b in 0u8..=255 {
                let (first, second) = encode_enhanced(b, cmd);
                let mut dec = EnhancedDecoder::new();
                assert_eq!(dec.decode(first), None);
                let event = dec.decode(second).unwrap();
                match cmd {
                    EnhancedCmd::Received => assert_eq!(event, EnhancedEvent::Byte(b)),
                    EnhancedCmd::Arbitration => assert_eq!(event, EnhancedEvent::ArbitrationWon),
                    EnhancedCmd::Fail => unreachable!(),
                }
            }
        }
    }

    #[test]
    fn enhanced_fail_nibble_reports_arbitration_lost() {
        let (first, second) = encode_enhanced(0x00, EnhancedCmd::Fail);
        let mut dec = EnhancedDecoder::new();
        assert_eq!(dec.decode(first), None);
        assert_eq!(dec.decode(second), Some(EnhancedEvent::ArbitrationLost));
    }

    #[test]
    fn enhanced_legacy_passthrough_needs_no_partner() {
        let mut dec = EnhancedDecoder::new();
        assert_eq!(dec.decode(0x10), Some(EnhancedEvent::Byte(0x10)));
    }

    #[test]
    fn enhanced_unknown_nibble_is_ignored_not_fatal() {
        // cccc = 0 (reset-ish): first byte 0xC0 | (0<<2) | top2bits.
        let first = 0xC0;
        let second = 0x80;
        let mut dec = EnhancedDecoder::new();
        assert_eq!(dec.decode(first), None);
        assert_eq!(dec.decode(second), Some(EnhancedEvent::Ignored(0)));
    }

    #[test]
    fn original_hardcoded_ack_nak_syn_pairs_match_formula() {
        // From the original C source's literal chars_to_send_bus constants.
        assert_eq!(encode_enhanced(0x00, EnhancedCmd::Received), (0xC4, 0x80)); // ACK
        assert_eq!(encode_enhanced(0xFF, EnhancedCmd::Received), (0xC7, 0xBF)); // NAK
        assert_eq!(encode_enhanced(0xAA, EnhancedCmd::Received), (0xC6, 0xAA)); // SYN
    }
}
