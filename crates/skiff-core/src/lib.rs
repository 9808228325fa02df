mod agent;
mod compact;
mod detector;
mod error;
mod events;
mod prompts;
mod state;
mod stream;

pub use agent::{Agent, TurnOutcome};
pub use compact::{
    compaction_range, splice_summary, summary_request, summary_text, truncate_head_tail,
    CriticalInfoExtractor, RegexExtractor, SUMMARY_HEADER, SUMMARY_PLACEHOLDER,
};
pub use detector::{
    assess, normalize_error, StuckAssessment, StuckReason, ToolOutcome, ERROR_SAMPLE_CHARS,
    MAX_ERROR_SAMPLES,
};
pub use error::{AgentError, InvalidTransition};
pub use events::AgentEvent;
pub use prompts::{build_capabilities_section, system_prompt, MAX_CAPABILITIES_PROMPT_CHARS};
pub use state::ConversationState;
pub use stream::{
    parse_arguments, AssembledMessage, Fragment, PhaseEvent, RoundPhase, StreamAssembly,
    WordChunker,
};
