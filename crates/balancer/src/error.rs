use thiserror::Error;

#[derive(Debug, Error)]
pub enum BalanceError {
    #[error("dispatcher needs at least one node")]
    NoNodes,

    #[error("unknown dispatch algorithm: {0} (expected random, round, game or power)")]
    UnknownAlgorithm(String),
}
