use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollectError {
    #[error("invalid collection config: {0}")]
    InvalidConfig(String),

    #[error("channel failure: {0}")]
    ChannelFailure(String),

    #[error("render failed: {0}")]
    RenderFailed(String),

    #[error("session store error: {0}")]
    SessionStore(String),

    #[error("collection already in progress")]
    AlreadyCollecting,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
