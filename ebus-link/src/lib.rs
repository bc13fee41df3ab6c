//! eBUS link-layer engine.
//!
//! This crate handles:
//! * The byte-level CRC-8 used to validate telegrams ([`crc`])
//! * Escape and "enhanced" adapter framing of the raw byte stream ([`codec`])
//! * Slicing a decoded byte stream into candidate telegrams ([`framer`])
//! * Driving a single master request through arbitration, ACK, and
//!   slave-response capture ([`txengine`])
//!
//! It is intentionally transport-agnostic: bring your own adapter
//! connection and message-bus client.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod crc;
pub mod framer;
pub mod telegram;
pub mod txengine;

pub use codec::{EnhancedCmd, EnhancedDecoder, EnhancedEvent, EscapeDecoder, encode_enhanced, encode_escape};
pub use crc::ebus_crc;
pub use framer::RxFramer;
pub use telegram::{MASTER_ADDRESSES, Telegram, is_master_address};
pub use txengine::{TxBusy, TxEngine, TxOutput, TxState, TxTimeouts};
