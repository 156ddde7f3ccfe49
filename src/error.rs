use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store file unavailable: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store file is not a JSON object of strings: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum BankError {
    #[error("Failed to read question bank: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed question bank: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Question bank has no questions")]
    Empty,

    #[error("Question {index} has no accepted answers")]
    NoAnswers { index: usize },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {key} value: {value:?}")]
    Invalid { key: &'static str, value: String },
}
