//! Relay loop: answers presenter refresh requests with the newest pool frame.

mod worker;

pub use worker::RelayLoop;
