use thiserror::Error;

/// Every failure a stylist session can surface.
///
/// All variants are recoverable: they end the operation that raised them and
/// leave the session usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StylistError {
    #[error("no Gemini API key supplied (set GEMINI_API_KEY or pass --api-key)")]
    MissingCredential,

    #[error("unsupported model '{name}' (supported: {})", .supported.join(", "))]
    UnsupportedModel { name: String, supported: Vec<String> },

    #[error("invalid image '{name}': {reason}")]
    InvalidImage { name: String, reason: String },

    #[error("your closet is empty; upload at least one photo first")]
    EmptyCloset,

    #[error("message is empty")]
    EmptyPrompt,

    #[error("the stylist is still answering the previous message")]
    ReplyPending,

    #[error("no stylist request is awaiting a reply")]
    NoPendingRequest,

    #[error("{0}")]
    Generation(String),
}

impl StylistError {
    pub fn invalid_image(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidImage {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation(message.into())
    }
}
