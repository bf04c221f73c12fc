mod error;

pub mod monetization;
pub mod policy;
pub mod safety;
#[cfg(feature = "server")]
pub mod server;

pub use error::{PersonaLabError, Result};
pub use monetization::{
    ClientKey, Clock, DailyCap, Decision, MonetizationConfig, Plan, QuotaGuard, SystemClock,
    resolve_identity, resolve_plan,
};
pub use policy::{AbGroup, Blender, Persona, PolicySet};
pub use safety::{SafetyConfig, SafetyExit, SafetyExitReason, SafetyGuard};
