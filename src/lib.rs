//! # armlink
//!
//! A portable, no_std communication core for a multi-actuator robot arm
//! controller: a framed, escaped, CRC8-checked byte protocol shared by a
//! half-duplex actuator bus and a client command channel, plus the bus
//! arbitration that lets a background status poller and a foreground command
//! dispatcher safely time-share one physical wire.
//!
//! The crate owns no hardware. Bytes come in through [`io::ByteSource`],
//! go out through [`io::ByteSink`], and the external channel multiplexer is
//! driven through [`io::ChannelSelector`]; all three are injected
//! capabilities, so the same core runs against a UART, a TCP socket, or a
//! test script.
//!
//! ## Crate features
//! | Feature     | Description |
//! |-------------|-------------|
//! | `std`       | Disables `#![no_std]` and enables the std bindings of `thiserror`, `critical-section`, and `log` |
//! | `defmt-0-3` | Enables `defmt` formatting support in `heapless`, `nb`, and `embedded-hal` |
//!
//! ## Wire format
//!
//! Every frame is a single `0xAA` delimiter followed by the byte-stuffed
//! packet `address:u8, command:u8, length:u16 LE, payload, crc8`. The CRC
//! (polynomial 0x07, initial 0x00) covers address through payload. Raw
//! `0xAA`/`0xAB` bytes after the delimiter are stuffed as `0xAB, byte ^ 0x20`.
//!
//! ## Usage
//!
//! ```rust
//! use armlink::consts;
//! use armlink::link::SerialLink;
//!
//! let mut wire: Vec<u8> = Vec::new();
//! {
//!     let mut link = SerialLink::new(consts::MASTER, |chunk: &[u8]| {
//!         wire.extend_from_slice(chunk);
//!     });
//!     link.send_byte(consts::ACTUATOR_1, consts::CMD_PING, 0x01).unwrap();
//! }
//! assert_eq!(wire[0], consts::START_BYTE);
//! ```
//!
//! A controller pairs one [`bus::ActuatorBus`] (actuator channel, wrapped in
//! a [`shared::SharedBus`] so the poll task and the dispatch loop can share
//! it) with one [`dispatch::ClientSession`] (client channel), and routes each
//! decoded client command through [`dispatch::dispatch`] while holding the
//! bus.
//!
//! ## Integration notes
//!
//! - Feed received bytes one at a time into the matching channel's parser;
//!   the parser never blocks and resynchronizes on the next delimiter after
//!   any corruption.
//! - Request/response primitives busy-poll with a 1 ms delay up to
//!   [`consts::REPLY_TIMEOUT_MS`]; while one runs, the shared handle keeps
//!   the status poller off the bus.
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded environments.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(feature = "std"), no_std)]

pub use critical_section;
pub use heapless;

pub mod bus;
pub mod consts;
pub(crate) mod crc;
pub mod dispatch;
pub mod framing;
pub mod io;
pub mod link;
pub mod parser;
pub mod queue;
pub mod robot;
pub mod shared;
pub mod trajectory;
