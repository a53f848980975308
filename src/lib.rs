#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
//! ## Feature flags
#![doc = document_features::document_features!(feature_label = r#"<span class="stab portability"><code>{feature}</code></span>"#)]

// This must go FIRST so that all the other modules see its macros.
mod fmt;

/// Static board, regional and timing configuration
pub mod config;
/// FSK framing and the receive finisher
pub mod fsk;
/// The command/response interface between the driver and a chip
pub(crate) mod interface;
mod irq;
/// InterfaceVariant implementations using `embedded-hal`.
pub mod iv;
/// LoRa parameter mapping and the receive finisher
pub mod lora;
/// Specific implementation to support Semtech LR11xx chips
pub mod lr11xx;
/// Parameters used across the crate
pub mod mod_params;
/// Traits implemented externally or internally to support control of the chips
pub mod mod_traits;
/// The radio state machine
pub mod radio;
mod state;
/// Specific implementation to support Semtech SX126x chips
pub mod sx126x;
/// Time conversions, symbol counts and time-on-air
pub mod timings;

#[cfg(test)]
mod test;

pub use config::{DeviceConfig, PaLookup, RegionalParam};
pub use embedded_hal_async::delay::DelayNs;
pub use mod_params::*;
pub use mod_traits::{ChipOps, Clock, InterfaceVariant, RadioListener};
pub use radio::{FreqBand, Radio};
