use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Config load error: {0}")]
    ConfigLoad(String),

    #[error("Config validation error: {0}")]
    ConfigInvalid(String),
}

impl From<figment::Error> for ModelError {
    fn from(err: figment::Error) -> Self {
        ModelError::ConfigLoad(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
