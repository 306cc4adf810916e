use std::{error::Error as StdError, fmt};

use aws_sdk_s3::error::{BuildError, DisplayErrorContext, ProvideErrorMetadata, SdkError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Rejected `Options`; no client handle was created.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A request payload the remote API cannot accept, caught before sending.
    #[error("{0}")]
    Param(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl Error {
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Error::Remote(err) => Some(err),
            _ => None,
        }
    }
}

/// Failure reported by the object store, message kept verbatim.
#[derive(Debug)]
pub struct RemoteError {
    code: Option<String>,
    message: String,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for RemoteError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn StdError + 'static))
    }
}

impl RemoteError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
            source: None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Wraps a non-service failure (body streaming, response decoding).
    pub fn transport(err: impl StdError + Send + Sync + 'static) -> Self {
        Self {
            code: None,
            message: DisplayErrorContext(&err).to_string(),
            source: Some(Box::new(err)),
        }
    }

    fn from_sdk<E, R>(err: SdkError<E, R>) -> Self
    where
        SdkError<E, R>: StdError + ProvideErrorMetadata + Send + Sync + 'static,
    {
        let code = err.code().map(str::to_owned);
        let message = match err.message() {
            Some(message) => message.to_owned(),
            None => DisplayErrorContext(&err).to_string(),
        };

        Self {
            code,
            message,
            source: Some(Box::new(err)),
        }
    }
}

impl<E, R> From<SdkError<E, R>> for Error
where
    SdkError<E, R>: StdError + ProvideErrorMetadata + Send + Sync + 'static,
{
    fn from(err: SdkError<E, R>) -> Self {
        Error::Remote(RemoteError::from_sdk(err))
    }
}

impl From<BuildError> for Error {
    fn from(err: BuildError) -> Self {
        Error::Param(err.to_string())
    }
}
