use nb_core::errors::*;
use rocket::Responder;

err_impl! {SpawnerError,
    #[error("lab already exists for {0}")]
    AlreadyExists(String),

    #[error("no lab found for {0}")]
    NotFound(String),

    #[error("maximum namespace creation retries exceeded for {0}")]
    NamespaceCollision(String),

    #[error("image {0} is not available on this cluster")]
    UnknownImage(String),

    #[error("size {0} is not configured")]
    UnknownSize(String),
}

/// Everything the spawner can say over HTTP when it can't say "yes".
#[derive(Responder)]
pub enum ApiError {
    #[response(status = 400)]
    BadRequest(String),

    #[response(status = 403)]
    Forbidden(String),

    #[response(status = 404)]
    NotFound(String),

    #[response(status = 409)]
    Conflict(String),

    #[response(status = 500)]
    Internal(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast_ref::<SpawnerError>() {
            Some(SpawnerError::AlreadyExists(_)) => Self::Conflict(format!("{e}")),
            Some(SpawnerError::NotFound(_)) => Self::NotFound(format!("{e}")),
            Some(SpawnerError::UnknownImage(_)) | Some(SpawnerError::UnknownSize(_)) => {
                Self::BadRequest(format!("{e}"))
            },
            // NamespaceCollision and cluster errors are internal failures;
            // the record is already marked failed by the time we get here
            _ => Self::Internal(format!("nublado error: {e}")),
        }
    }
}
