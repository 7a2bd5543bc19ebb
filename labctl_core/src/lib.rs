//! Hardware-free core of the patch rig controller.
//!
//! - [`channel`]: logical channel lookup and physical channel parsing
//! - [`clock`]: sample clock pairing between the input and output cards
//! - [`waveform`]: output buffers (block waves, constants, pulses)
//! - [`session`]: validated session plans consumed by the acquisition engine
//! - [`stage`]: Ludl stage command formatting and reply parsing
//! - [`retry`]: bounded retry policy for stage commands
//! - [`config`]: JSON rig configuration

pub mod channel;
pub mod clock;
pub mod config;
pub mod error;
pub mod retry;
pub mod session;
pub mod stage;
pub mod utils;
pub mod waveform;

pub use channel::*;
pub use clock::*;
pub use config::*;
pub use error::*;
pub use retry::*;
pub use session::*;
pub use utils::*;
pub use waveform::*;
