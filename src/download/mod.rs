//! Download policy: local availability gate and the password flow

pub mod flow;
pub mod gate;

pub use flow::{FlowEvent, Outcome, PasswordFlow};
pub use gate::Availability;
