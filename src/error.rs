use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("face models failed to load: {0}")]
    ModelLoad(String),

    #[error("camera unavailable: {0}")]
    Camera(String),

    #[error("capture not available while {0}")]
    NotReady(&'static str),

    #[error("no face detected, make sure your face is clearly visible and try again")]
    NoFaceDetected,

    #[error("no reference face stored for {0}, enroll first")]
    NoReference(String),

    #[error("face did not match (distance {distance:.3}), retry in good lighting")]
    Mismatch { distance: f32 },

    #[error("invalid face descriptor: {0}")]
    Descriptor(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("not signed in")]
    NotAuthenticated,

    #[error("please enter your email and password")]
    MissingCredentials,

    #[error("login failed: {message}. {remaining} attempts remaining")]
    InvalidCredentials { message: String, remaining: u32 },

    #[error("the password you entered is incorrect")]
    IncorrectPassword,

    #[error("too many failed attempts, check your email for unlock instructions")]
    Locked,

    #[error("{0}")]
    Validation(String),

    #[error("QR encoding failed: {0}")]
    Qr(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("encoding error: {0}")]
    Postcard(#[from] postcard::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    pub(crate) fn storage(err: anyhow::Error) -> Self {
        Error::Storage(format!("{:#}", err))
    }

    pub(crate) fn auth(err: anyhow::Error) -> Self {
        Error::Auth(format!("{:#}", err))
    }

    /// Whether the user can simply try again (capture or credentials).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::NoFaceDetected | Error::Mismatch { .. } | Error::InvalidCredentials { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
