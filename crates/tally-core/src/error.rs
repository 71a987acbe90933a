use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("property {0} must be a string, number or boolean")]
    InvalidPropertyValue(String),
}
