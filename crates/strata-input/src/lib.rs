//! Strata input device discovery
//!
//! Turns asynchronous OS hot-plug events into a stable, query-able set of
//! device tokens. The [`DeviceFinder`] owns the token set; a listener
//! backend (hidapi in-tree) feeds it connect/disconnect events, serialized
//! onto the listener's own thread, and supports manual rescans.

mod error;
mod finder;
mod hid_backend;
mod listener;
mod token;

pub use error::{InputError, InputResult};
pub use finder::DeviceFinder;
pub use hid_backend::HidApiListener;
pub use listener::{HidListener, ListenerCore};
pub use token::{DeviceDescriptor, DeviceHandle, DeviceToken};
