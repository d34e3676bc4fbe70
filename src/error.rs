use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("script exited with status {status}: {stderr}")]
    ScriptFailed { status: i32, stderr: String },
    #[error("malformed reply at offset {offset}: {message}")]
    Reply { offset: usize, message: String },
    #[error("unexpected reply shape: {0}")]
    ReplyShape(String),
    #[error("failed to decode artwork: {0}")]
    Artwork(#[from] image::ImageError),
    #[error("change notifications unavailable: {0}")]
    Subscription(String),
    #[error("background worker is gone")]
    WorkerGone,
}

pub type Result<T> = std::result::Result<T, Error>;
