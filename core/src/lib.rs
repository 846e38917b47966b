pub mod error;
pub mod persist;
pub mod postings;
pub mod scorer;
pub mod tiered;
pub mod tokenizer;
pub mod zone;

pub use error::IndexError;
pub use postings::{Posting, PostingsList};
pub use scorer::Scorer;
pub use tiered::{TieredIndexSet, Zone};
pub use zone::{SortWeights, ZoneConfig, ZoneIndex};

pub type DocId = u32;
pub type Position = u32;
