//! Primitives for Bazaar
//!
//! Stateless facades over an injected [`Store`](bazaar_core::Store):
//! - [`Market`]: `list_item` / `purchase_item` as optimistic transactions
//!   with a tri-state [`TradeOutcome`]
//! - [`SessionTracker`]: token-to-user mapping, last activity and recent
//!   views

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod market;
pub mod session;

pub use market::{
    ListOutcome, Listing, Market, PurchaseOutcome, Rejection, TradeOutcome, MAX_PRICE,
};
pub use session::SessionTracker;
