use crate::{native, results, translator};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("translation error: {0}")]
    Translation(#[from] translator::Error),
    #[error("native query error: {0}")]
    Native(#[from] native::Error),
    #[error("result processing error: {0}")]
    Results(#[from] results::Error),
}
