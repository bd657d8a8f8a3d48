use crate::firebase_client::FirebaseClientError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The only run-level failure: without identifiers there is nothing to dispatch.
    #[error("failed to list top story identifiers")]
    ListIdentifiers(#[source] FirebaseClientError),

    #[error("configuration error: {0}")]
    Config(String),
}
