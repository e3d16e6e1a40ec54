pub mod index;
pub mod persist;
pub mod search;
pub mod tokenizer;

pub use index::{IndexStore, LoadOutcome, PageId};
pub use search::{MatchType, RankingMode, SearchEngine, SearchHit};
