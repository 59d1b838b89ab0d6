//! Marketplace: list and purchase items under optimistic concurrency
//!
//! ## Design: STATELESS FACADE
//!
//! `Market` holds only the injected store and its retry policies. All state
//! lives in the store:
//!
//! ```text
//! inventory:<user>   set    item ids owned by <user>
//! market:            zset   "<item>.<seller>" scored by price
//! users:<user>       hash   funds
//! ```
//!
//! An item id is in exactly one place at a time: a seller's inventory or
//! the market. Both moves below change the two places in one conditional
//! commit, so no observer sees an item in both or in neither.
//!
//! ## Listing
//!
//! Watch the seller's inventory, check the item is there, then move it to
//! the market at the asking price.
//!
//! ## Purchasing
//!
//! Watch the market and the buyer's account, check the live price against
//! the price the buyer saw and against the buyer's funds, then transfer
//! funds to the seller and the item to the buyer's inventory.
//!
//! A failed check is final (`NotPossible`); only commit conflicts are
//! retried.

use bazaar_concurrency::{
    CancelToken, OptimisticExecutor, OptimisticTxn, RetryPolicy, TxnOutcome, Validation,
};
use bazaar_core::{keys, Error, Result, Store, WriteBatch};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

// =============================================================================
// Outcomes
// =============================================================================

/// Why a listing or purchase cannot happen with the data supplied
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// The seller does not hold the item
    #[error("item '{item}' is not in the inventory of '{seller}'")]
    ItemNotInInventory {
        /// Item id
        item: String,
        /// Seller id
        seller: String,
    },

    /// No such listing on the market
    #[error("item '{item}' is not listed by '{seller}'")]
    NotListed {
        /// Item id
        item: String,
        /// Seller id
        seller: String,
    },

    /// The live price differs from the price the buyer agreed to
    #[error("price changed: expected {expected}, listed at {actual}")]
    PriceChanged {
        /// Price the buyer expected
        expected: i64,
        /// Current market price
        actual: i64,
    },

    /// The buyer cannot afford the item
    #[error("insufficient funds: have {funds}, need {price}")]
    InsufficientFunds {
        /// Buyer's balance
        funds: i64,
        /// Listed price
        price: i64,
    },
}

/// Tri-state result of a marketplace operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeOutcome<R = Rejection> {
    /// Committed
    Succeeded,
    /// A precondition failed; nothing changed and retrying with the same
    /// inputs will not help
    NotPossible(R),
    /// Every attempt conflicted until the retry budget ran out; nothing
    /// changed
    FailedAfterRetries,
}

impl<R> TradeOutcome<R> {
    /// Whether the operation committed
    pub fn is_success(&self) -> bool {
        matches!(self, TradeOutcome::Succeeded)
    }

    /// The precondition failure, if that is how it ended
    pub fn rejection(&self) -> Option<&R> {
        match self {
            TradeOutcome::NotPossible(reason) => Some(reason),
            _ => None,
        }
    }
}

impl<R> From<TxnOutcome<R>> for TradeOutcome<R> {
    fn from(outcome: TxnOutcome<R>) -> Self {
        match outcome {
            TxnOutcome::Committed => TradeOutcome::Succeeded,
            TxnOutcome::Rejected(reason) => TradeOutcome::NotPossible(reason),
            TxnOutcome::Exhausted => TradeOutcome::FailedAfterRetries,
        }
    }
}

/// Outcome of [`Market::list_item`]
pub type ListOutcome = TradeOutcome<Rejection>;

/// Largest listable price; market scores are `f64`, exact up to 2^53
pub const MAX_PRICE: i64 = 1 << 53;

/// Outcome of [`Market::purchase_item`]
pub type PurchaseOutcome = TradeOutcome<Rejection>;

/// One active listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    /// Item id
    pub item: String,
    /// Seller id
    pub seller: String,
    /// Asking price
    pub price: i64,
}

// =============================================================================
// Transactions
// =============================================================================

struct ListItem<'a> {
    item: &'a str,
    seller: &'a str,
    price: i64,
}

impl OptimisticTxn for ListItem<'_> {
    type Snapshot = ();
    type Rejection = Rejection;

    fn name(&self) -> &'static str {
        "list_item"
    }

    fn watch_keys(&self) -> Vec<String> {
        vec![keys::inventory(self.seller)]
    }

    fn validate(&self, store: &dyn Store) -> Result<Validation<(), Rejection>> {
        if store.sismember(&keys::inventory(self.seller), self.item)? {
            Ok(Validation::Proceed(()))
        } else {
            Ok(Validation::Reject(Rejection::ItemNotInInventory {
                item: self.item.to_string(),
                seller: self.seller.to_string(),
            }))
        }
    }

    fn stage(&self, _: (), batch: &mut WriteBatch) {
        batch
            .zadd(
                keys::MARKET,
                keys::listing(self.item, self.seller),
                self.price as f64,
            )
            .srem(keys::inventory(self.seller), self.item);
    }
}

struct PurchaseItem<'a> {
    buyer: &'a str,
    item: &'a str,
    seller: &'a str,
    expected_price: i64,
}

impl OptimisticTxn for PurchaseItem<'_> {
    /// Live price
    type Snapshot = i64;
    type Rejection = Rejection;

    fn name(&self) -> &'static str {
        "purchase_item"
    }

    fn watch_keys(&self) -> Vec<String> {
        vec![keys::MARKET.to_string(), keys::account(self.buyer)]
    }

    fn validate(&self, store: &dyn Store) -> Result<Validation<i64, Rejection>> {
        let member = keys::listing(self.item, self.seller);
        let Some(score) = store.zscore(keys::MARKET, &member)? else {
            return Ok(Validation::Reject(Rejection::NotListed {
                item: self.item.to_string(),
                seller: self.seller.to_string(),
            }));
        };

        let price = price_from_score(score);
        if price != self.expected_price {
            return Ok(Validation::Reject(Rejection::PriceChanged {
                expected: self.expected_price,
                actual: price,
            }));
        }

        let funds = read_funds(store, self.buyer)?;
        if funds < price {
            return Ok(Validation::Reject(Rejection::InsufficientFunds { funds, price }));
        }
        Ok(Validation::Proceed(price))
    }

    fn stage(&self, price: i64, batch: &mut WriteBatch) {
        batch
            .hincr_by(keys::account(self.seller), keys::FUNDS_FIELD, price)
            .hincr_by(keys::account(self.buyer), keys::FUNDS_FIELD, -price)
            .sadd(keys::inventory(self.buyer), self.item)
            .zrem(keys::MARKET, keys::listing(self.item, self.seller));
    }
}

fn price_from_score(score: f64) -> i64 {
    score.round() as i64
}

fn read_funds(store: &dyn Store, user: &str) -> Result<i64> {
    let key = keys::account(user);
    match store.hget(&key, keys::FUNDS_FIELD)? {
        None => Ok(0),
        Some(raw) => raw.parse().map_err(|_| Error::NotAnInteger {
            key: format!("{}/{}", key, keys::FUNDS_FIELD),
        }),
    }
}

// =============================================================================
// Market
// =============================================================================

/// Listing and purchasing against a shared store
///
/// `Market` is `Send + Sync`; clones share the store and may run
/// concurrently on different threads.
///
/// # Example
///
/// ```
/// use bazaar_primitives::Market;
/// use bazaar_storage::MemoryStore;
/// use std::sync::Arc;
///
/// let market = Market::new(Arc::new(MemoryStore::new()));
/// market.grant_item("userX", "itemX").unwrap();
/// market.deposit("userY", 125).unwrap();
///
/// assert!(market.list_item("itemX", "userX", 10).unwrap().is_success());
/// assert!(market.purchase_item("userY", "itemX", "userX", 10).unwrap().is_success());
/// assert_eq!(market.funds("userY").unwrap(), 115);
/// ```
#[derive(Clone)]
pub struct Market {
    store: Arc<dyn Store>,
    list_policy: RetryPolicy,
    purchase_policy: RetryPolicy,
    cancel: Option<CancelToken>,
}

impl Market {
    /// Market over `store` with the default retry budgets (5 s to list,
    /// 10 s to purchase)
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            list_policy: RetryPolicy::listing(),
            purchase_policy: RetryPolicy::purchase(),
            cancel: None,
        }
    }

    /// Replace the retry policy used by [`Market::list_item`]
    pub fn with_list_policy(mut self, policy: RetryPolicy) -> Self {
        self.list_policy = policy;
        self
    }

    /// Replace the retry policy used by [`Market::purchase_item`]
    pub fn with_purchase_policy(mut self, policy: RetryPolicy) -> Self {
        self.purchase_policy = policy;
        self
    }

    /// Abandon retry loops once `token` is cancelled
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    fn executor(&self, policy: RetryPolicy) -> OptimisticExecutor {
        let executor = OptimisticExecutor::new(policy);
        match &self.cancel {
            Some(token) => executor.with_cancel(token.clone()),
            None => executor,
        }
    }

    // =========================================================================
    // Trades
    // =========================================================================

    /// Move `item` from `seller`'s inventory onto the market at `price`
    ///
    /// # Errors
    /// `Error::InvalidArgument` for a price outside `0..=MAX_PRICE` or a
    /// seller id containing the listing separator. Store errors propagate.
    pub fn list_item(&self, item: &str, seller: &str, price: i64) -> Result<ListOutcome> {
        if !(0..=MAX_PRICE).contains(&price) {
            return Err(Error::InvalidArgument(format!(
                "price must be between 0 and {}, got {}",
                MAX_PRICE, price
            )));
        }
        if seller.contains(keys::LISTING_SEPARATOR) {
            return Err(Error::InvalidArgument(format!(
                "seller id '{}' must not contain '{}'",
                seller,
                keys::LISTING_SEPARATOR
            )));
        }

        let txn = ListItem {
            item,
            seller,
            price,
        };
        let run = self.executor(self.list_policy).run(self.store.as_ref(), &txn)?;
        debug!(item, seller, stats = ?run.stats, "list_item finished");

        let outcome = TradeOutcome::from(run.outcome);
        match &outcome {
            TradeOutcome::Succeeded => info!(item, seller, price, "item listed"),
            TradeOutcome::FailedAfterRetries => {
                warn!(item, seller, attempts = run.stats.attempts, "listing gave up")
            }
            TradeOutcome::NotPossible(_) => {}
        }
        Ok(outcome)
    }

    /// Buy `item` from `seller` for `buyer`, provided it is still listed at
    /// `expected_price` and the buyer can afford it
    ///
    /// # Errors
    /// Store errors propagate; a non-integer funds field is
    /// `Error::NotAnInteger`.
    pub fn purchase_item(
        &self,
        buyer: &str,
        item: &str,
        seller: &str,
        expected_price: i64,
    ) -> Result<PurchaseOutcome> {
        let txn = PurchaseItem {
            buyer,
            item,
            seller,
            expected_price,
        };
        let run = self
            .executor(self.purchase_policy)
            .run(self.store.as_ref(), &txn)?;
        debug!(buyer, item, seller, stats = ?run.stats, "purchase_item finished");

        let outcome = TradeOutcome::from(run.outcome);
        match &outcome {
            TradeOutcome::Succeeded => {
                info!(buyer, item, seller, price = expected_price, "item purchased")
            }
            TradeOutcome::FailedAfterRetries => {
                warn!(buyer, item, seller, attempts = run.stats.attempts, "purchase gave up")
            }
            TradeOutcome::NotPossible(_) => {}
        }
        Ok(outcome)
    }

    // =========================================================================
    // Reads and account setup
    // =========================================================================

    /// Current asking price of a listing
    pub fn market_price(&self, item: &str, seller: &str) -> Result<Option<i64>> {
        Ok(self
            .store
            .zscore(keys::MARKET, &keys::listing(item, seller))?
            .map(price_from_score))
    }

    /// Balance of `user` (0 for an unknown user)
    pub fn funds(&self, user: &str) -> Result<i64> {
        read_funds(self.store.as_ref(), user)
    }

    /// Items owned by `user`, sorted
    pub fn inventory(&self, user: &str) -> Result<Vec<String>> {
        self.store.smembers(&keys::inventory(user))
    }

    /// Every active listing, cheapest first
    pub fn listings(&self) -> Result<Vec<Listing>> {
        let mut listings = Vec::new();
        for (member, score) in self.store.zrange_with_scores(keys::MARKET, 0, -1)? {
            match keys::split_listing(&member) {
                Some((item, seller)) => listings.push(Listing {
                    item: item.to_string(),
                    seller: seller.to_string(),
                    price: price_from_score(score),
                }),
                None => warn!(member = %member, "skipping malformed market entry"),
            }
        }
        Ok(listings)
    }

    /// Add `amount` to `user`'s funds
    pub fn deposit(&self, user: &str, amount: i64) -> Result<()> {
        self.store
            .hincr_by(&keys::account(user), keys::FUNDS_FIELD, amount)
    }

    /// Put `item` into `user`'s inventory
    pub fn grant_item(&self, user: &str, item: &str) -> Result<()> {
        self.store.sadd(&keys::inventory(user), item)
    }
}

impl std::fmt::Debug for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Market")
            .field("list_policy", &self.list_policy)
            .field("purchase_policy", &self.purchase_policy)
            .finish_non_exhaustive()
    }
}
