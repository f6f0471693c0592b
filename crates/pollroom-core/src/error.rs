use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("bad request: {0}")]
    BadRequest(String),
}
