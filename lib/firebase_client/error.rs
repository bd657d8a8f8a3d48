use thiserror::Error;

#[derive(Error, Debug)]
pub enum FirebaseClientError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unexpected HTTP status while fetching {resource}: {status}")]
    UnexpectedStatus { resource: String, status: u16 },
    #[error(transparent)]
    Request(#[from] reqwest::Error),
}
