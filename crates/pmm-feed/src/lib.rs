//! Shared read-mostly state fed by the external market-data and
//! account streams.
//!
//! Stream adapters are external collaborators: they push `FeedEvent`s
//! into a single bounded mpsc channel; the orchestrator's event loop
//! applies them to `MarketState` / `AccountState`. The tick loop only
//! ever reads, and never blocks on a stream task.

pub mod account_state;
pub mod events;
pub mod market_state;
pub mod paper_feed;

pub use account_state::AccountState;
pub use events::{AccountEvent, FeedEvent, MarketEvent};
pub use market_state::MarketState;
pub use paper_feed::PaperFeed;
