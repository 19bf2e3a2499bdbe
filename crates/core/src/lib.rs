//! SplitPay Core
//!
//! Money type and split allocation shared by every SplitPay crate.
//!
//! All amounts are fixed-point integers of micro-units (`10^-6`), the same
//! precision as the USDC token used for settlement.

mod amount;
mod error;
mod split;

pub use amount::*;
pub use error::*;
pub use split::*;
