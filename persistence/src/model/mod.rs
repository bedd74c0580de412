//! Row types for every table in `spec.md` §3. Grouped by the subsystem that
//! owns them, not alphabetically — mirrors the component table in §2.

pub mod exit;
pub mod identity;
pub mod intent;
pub mod market;
pub mod order;
pub mod signal;
pub mod trade;

pub use exit::*;
pub use identity::*;
pub use intent::*;
pub use market::*;
pub use order::*;
pub use signal::*;
pub use trade::*;
