//! Services module - the individual pipeline steps.
//!
//! Each step is a plain function over explicit paths with no dependency on the
//! presentation layer or on [`StateManager`](crate::state::StateManager):
//!
//! - [`paths`]: naming-convention checks for user-selected folders (`PathValidator`)
//! - [`archive`]: zip extraction into the game's data root
//! - [`reconcile`]: clear the local server folder but keep `cluster_token.txt`
//! - [`tree_copy`]: non-destructive recursive merge of the world folder
//! - [`mods`]: rebuild the server's mods folder from the Steam client
//! - [`updater`]: run SteamCMD with a timeout and capture its output
//! - [`launcher`]: spawn the Master and Caves shards, fire-and-forget
//!
//! Filesystem steps are synchronous; the [`Pipeline`](crate::pipeline::Pipeline)
//! runs them on tokio's blocking pool. The updater is async so its timeout can
//! race the child process.

pub mod archive;
pub mod error;
pub mod launcher;
pub mod mods;
pub mod paths;
pub mod reconcile;
pub mod tree_copy;
pub mod updater;

pub use error::StepError;
pub use launcher::{ServerProcessHandle, Shard};
pub use mods::{MirrorSummary, MissingSourcePolicy};
pub use paths::{PathKind, PathValidator, ValidationError};
pub use reconcile::ReconcileSummary;
pub use tree_copy::CopyStats;
pub use updater::{TruncatedOutput, UpdateOutcome, UpdateReport};

/// Render a program invocation for logs, quoting arguments with spaces.
pub fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(|part| {
            if part.contains(' ') {
                format!("\"{}\"", part)
            } else {
                part.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
