use thiserror::Error;

/// Rejected query arguments. Missing data is never an error; it yields an
/// empty report instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("athlete name is blank")]
    BlankAthlete,

    #[error("{0} and {1} are the same athlete")]
    SameAthlete(String, String),

    #[error("event name is blank")]
    BlankEvent,
}
