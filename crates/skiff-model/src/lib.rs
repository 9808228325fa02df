mod types;
mod provider;
mod mock;

pub use types::*;
pub use provider::{ModelProvider, ResponseStream};
pub use mock::{MockProvider, ScriptedMockProvider};

use anyhow::bail;

/// Construct a provider by name.  Only the echo mock ships with the
/// runtime; real endpoints are supplied by the embedding application.
pub fn from_name(provider: &str) -> anyhow::Result<Box<dyn ModelProvider>> {
    match provider {
        "mock" => Ok(Box::new(MockProvider)),
        other => bail!("unknown model provider: {other}"),
    }
}
