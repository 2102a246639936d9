pub mod config;
pub mod consensus;
pub mod corpus;
pub mod error;
pub mod events;
pub mod history;
pub mod matcher;
pub mod names;
pub mod predictions;
pub mod relationship;
pub mod reliability;
pub mod similarity;
pub mod titles;

pub use config::EngineConfig;
pub use corpus::{ConsensusQuery, Corpus, RelationshipQuery};
pub use error::QueryError;
