use crate::services::command_line;
use crate::services::error::StepError;
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::process::Command;

/// One of the two cooperating server processes of a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shard {
    Master,
    Caves,
}

impl Shard {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Master => "Master",
            Self::Caves => "Caves",
        }
    }
}

impl fmt::Display for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A spawned shard.
///
/// Nothing waits on or owns the process after launch; this is just a record
/// of what was started. A supervisor could poll `pid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerProcessHandle {
    pub shard: Shard,
    pub pid: u32,
    pub command_line: String,
    pub working_directory: Utf8PathBuf,
}

/// `-console -cluster <cluster> -shard <shard>`
pub fn shard_args(cluster_name: &str, shard: Shard) -> Vec<String> {
    vec![
        "-console".to_string(),
        "-cluster".to_string(),
        cluster_name.to_string(),
        "-shard".to_string(),
        shard.as_str().to_string(),
    ]
}

/// Spawn the Master and Caves shards and return without waiting.
///
/// If Caves fails to spawn, Master is already running and is left alone.
pub fn launch(
    executable: &Utf8Path,
    working_dir: &Utf8Path,
    cluster_name: &str,
) -> Result<[ServerProcessHandle; 2], StepError> {
    if !working_dir.is_dir() {
        return Err(StepError::NotFound {
            what: "Server binary directory",
            path: working_dir.to_path_buf(),
        });
    }
    if !executable.is_file() {
        return Err(StepError::NotFound {
            what: "Server executable",
            path: executable.to_path_buf(),
        });
    }

    let master = spawn_shard(executable, working_dir, cluster_name, Shard::Master)?;
    let caves = spawn_shard(executable, working_dir, cluster_name, Shard::Caves)?;

    Ok([master, caves])
}

fn spawn_shard(
    executable: &Utf8Path,
    working_dir: &Utf8Path,
    cluster_name: &str,
    shard: Shard,
) -> Result<ServerProcessHandle, StepError> {
    let args = shard_args(cluster_name, shard);
    let command_line = command_line(executable.as_str(), &args);

    let mut command = Command::new(executable.as_std_path());
    command.args(&args).current_dir(working_dir);

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NEW_CONSOLE: u32 = 0x0000_0010;
        command.creation_flags(CREATE_NEW_CONSOLE);
    }
    #[cfg(not(windows))]
    {
        use std::process::Stdio;
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
    }

    // Dropping the Child handle does not terminate the process
    let child = command
        .spawn()
        .map_err(|source| StepError::LaunchFailed { shard, source })?;

    tracing::info!("Launched {} shard (pid {}): {}", shard, child.id(), command_line);

    Ok(ServerProcessHandle {
        shard,
        pid: child.id(),
        command_line,
        working_directory: working_dir.to_path_buf(),
    })
}
