//! The shared bus handle.
//!
//! The actuator bus is one physical resource used from two execution
//! contexts: the background status-poll task and the request-processing
//! loop. [`SharedBus`] is the single guarded handle both go through — a
//! `critical-section` mutex around the owned [`ActuatorBus`] — so whatever
//! runs inside [`with_bus`] (one poll step, one whole client command) holds
//! the bus exclusively, including the channel selector, and releases it on
//! every exit path.
//!
//! ```rust
//! use armlink::shared::{SharedBus, shared_bus_init, shared_bus_setup, with_bus};
//! use armlink::bus::ActuatorBus;
//! use core::convert::Infallible;
//! use embedded_hal_mock::eh1::delay::NoopDelay;
//!
//! fn bus_rx() -> nb::Result<u8, Infallible> { Err(nb::Error::WouldBlock) }
//! fn bus_tx(_bytes: &[u8]) {}
//! fn mux(_channel: u8) {}
//!
//! static BUS: SharedBus<fn() -> nb::Result<u8, Infallible>, fn(&[u8]), fn(u8), NoopDelay> =
//!     shared_bus_init();
//!
//! shared_bus_setup(&BUS, ActuatorBus::new(bus_rx, bus_tx, mux, NoopDelay::new()));
//! let position = with_bus(&BUS, |bus| bus.position()).unwrap();
//! assert_eq!(position.joint(0), 0.0);
//! ```

use crate::bus::ActuatorBus;
use core::cell::RefCell;
use critical_section::Mutex;

/// A bus instance behind the global exclusion primitive.
pub type SharedBus<R, W, M, D> = Mutex<RefCell<Option<ActuatorBus<R, W, M, D>>>>;

/// Initializes an empty shared-bus cell, usable in a `static`.
pub const fn shared_bus_init<R, W, M, D>() -> SharedBus<R, W, M, D> {
    Mutex::new(RefCell::new(None))
}

/// Installs a constructed bus into the shared cell.
pub fn shared_bus_setup<R, W, M, D>(shared: &SharedBus<R, W, M, D>, bus: ActuatorBus<R, W, M, D>) {
    critical_section::with(|cs| {
        let _ = shared.borrow(cs).replace(Some(bus));
    });
}

/// Runs `f` with exclusive access to the bus.
///
/// The whole closure executes under bus exclusion: run one poll step or one
/// complete client command per call, never less than a full transaction.
/// Returns `None` if no bus has been installed yet.
pub fn with_bus<R, W, M, D, T>(
    shared: &SharedBus<R, W, M, D>,
    f: impl FnOnce(&mut ActuatorBus<R, W, M, D>) -> T,
) -> Option<T> {
    critical_section::with(|cs| shared.borrow(cs).borrow_mut().as_mut().map(f))
}
