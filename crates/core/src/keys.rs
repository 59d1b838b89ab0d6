//! Key layout shared by every workflow
//!
//! Keys are plain strings with a `namespace:` prefix. The layout is a
//! convention between the components below, not a binary contract.
//!
//! | Key | Type | Holds |
//! |-----|------|-------|
//! | `inventory:<user>` | set | item ids owned by a user |
//! | `market:` | zset | `<item>.<seller>` scored by price |
//! | `users:<user>` | hash | account fields (`funds`) |
//! | `progress:file` / `progress:position` | string | ingestion checkpoint |
//! | `login:` | hash | session token -> user |
//! | `recent:` | zset | session token scored by last activity |
//! | `viewed:<token>` | zset | items viewed by a token, scored by time |
//! | `viewed:` | zset | global view tally per item (decreasing) |
//! | `sync:wait` | zset | replication wait tokens |

/// Sorted set of active listings
pub const MARKET: &str = "market:";

/// Hash field holding an account balance
pub const FUNDS_FIELD: &str = "funds";

/// Name of the file the ingestion checkpoint points into
pub const PROGRESS_FILE: &str = "progress:file";

/// Byte offset inside [`PROGRESS_FILE`]
pub const PROGRESS_POSITION: &str = "progress:position";

/// Hash mapping session tokens to users
pub const LOGIN: &str = "login:";

/// Sorted set of tokens by last activity
pub const RECENT: &str = "recent:";

/// Sorted set of global per-item view scores
pub const VIEWED: &str = "viewed:";

/// Sorted set of replication wait tokens
pub const SYNC_WAIT: &str = "sync:wait";

/// Separator between item and seller in a listing member
pub const LISTING_SEPARATOR: char = '.';

/// `inventory:<user>`
pub fn inventory(user: &str) -> String {
    format!("inventory:{}", user)
}

/// `users:<user>`
pub fn account(user: &str) -> String {
    format!("users:{}", user)
}

/// `viewed:<token>`
pub fn viewed_by(token: &str) -> String {
    format!("{}{}", VIEWED, token)
}

/// Market member for an item listed by a seller
pub fn listing(item: &str, seller: &str) -> String {
    format!("{}{}{}", item, LISTING_SEPARATOR, seller)
}

/// Split a market member back into `(item, seller)`
///
/// The seller is taken after the last separator so item ids may contain
/// dots.
pub fn split_listing(member: &str) -> Option<(&str, &str)> {
    member.rsplit_once(LISTING_SEPARATOR)
}
