//! Command handlers for the Tessera CLI.

pub mod ask;
pub mod ingest;
pub mod search;
pub mod stats;

pub use ask::AskCommand;
pub use ingest::IngestCommand;
pub use search::SearchCommand;
pub use stats::StatsCommand;

use tessera_core::{AppError, AppResult};

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> AppResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Serialization(e.to_string()))?;
    println!("{}", json);
    Ok(())
}
