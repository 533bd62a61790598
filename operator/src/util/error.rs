use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("storm client error: {0}")]
    Client(#[from] storm_client::Error),

    #[error("jar acquisition error: {0}")]
    Jar(#[from] storm_jar::Error),

    #[error("invalid user input: {0}")]
    UserInput(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse timestamp: {0}")]
    Chrono(#[from] chrono::ParseError),

    #[error("duration out of range: {0}")]
    DurationOutOfRange(#[from] chrono::OutOfRangeError),

    #[error("finalizer error: {0}")]
    Finalizer(String),
}

impl Error {
    /// Whether this error should count as a validation failure rather than
    /// an infrastructure hiccup, for status-reporting purposes.
    pub fn is_user_input(&self) -> bool {
        matches!(self, Error::UserInput(_))
            || matches!(self, Error::Jar(storm_jar::Error::Validation(_)))
    }
}
