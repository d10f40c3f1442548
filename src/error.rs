use diesel::result::DatabaseErrorKind;
use thiserror::Error;

#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Could not establish database connection")]
    DatabaseConnectionError,
    #[error("There has been an error executing a query: '{0}'")]
    QueryError(String),
    #[error("An entity with the given unique identifier already exists: '{0}'")]
    DuplicateEntityError(String),
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
    #[error("Post or tag {0} has been modified concurrently, reload and try again")]
    ConcurrentModificationError(i64),
    #[error("The request input could not be validated: '{0}'")]
    InvalidRequestInputError(String),
    #[error("Illegal query input: {0}")]
    IllegalQueryInputError(String),
    #[error("Invalid configuration: {0}")]
    ConfigurationError(String),
    #[error("Failed to set up logging: {0}")]
    LoggingSetupError(String),
}

impl From<diesel::result::Error> for Error {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info) => {
                Error::DuplicateEntityError(
                    info.constraint_name()
                        .map(String::from)
                        .unwrap_or_else(|| info.message().to_string()),
                )
            }
            e => Error::QueryError(e.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(e: validator::ValidationErrors) -> Self {
        Error::InvalidRequestInputError(e.to_string())
    }
}
