//! Session core for the digital stylist: closet and transcript ownership,
//! request assembly, and the Gemini transport.

mod config;
mod images;
mod providers;
mod session;

pub use config::{ConfigOverrides, StylistConfig, DEFAULT_GEMINI_API_BASE};
pub use images::{load_upload, validate_upload};
pub use providers::{
    DryrunClient, GeminiClient, GenerationClient, GenerationRequest, GenerationResponse,
    CLOSET_PREAMBLE,
};
pub use session::{
    AddImagesReport, SessionController, SessionPhase, SessionState, TurnOutcome,
    STYLIST_SYSTEM_INSTRUCTION,
};

/// Builds the client a session should talk to: the offline dry-run client, or
/// Gemini with the configured credential.
pub fn build_client(
    config: &StylistConfig,
    dry_run: bool,
) -> Result<Box<dyn GenerationClient>, stylist_contracts::errors::StylistError> {
    if dry_run {
        return Ok(Box::new(DryrunClient));
    }
    Ok(Box::new(GeminiClient::new(config)?))
}
