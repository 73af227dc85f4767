use std::{
    env,
    path::{Path, PathBuf},
    process::Stdio,
};

use anyhow::{anyhow, Context, Result};
use sysinfo::{get_current_pid, Process, Signal, System};
use tracing::info;

use super::daemon_path::to_daemon_path;

/// A daemon is either the `dwell-daemon` binary or the cli running `serve`.
fn is_daemon(process: &Process, cli: &Path, daemon: &Path) -> bool {
    let Some(exe) = process.exe().filter(|v| v.exists()) else {
        return false;
    };
    exe == daemon || (exe == cli && process.cmd().iter().any(|v| v == "serve"))
}

/// Terminates every running daemon except the current process and its children.
pub fn kill_previous_servers() -> Result<usize> {
    let cli = env::current_exe().context("Can't operate without an executable")?;
    let daemon = to_daemon_path(cli.clone());
    let system = System::new_all();
    let current_id = get_current_pid().map_err(|e| anyhow!("Can't find own pid {e}"))?;

    let mut killed = 0;
    for (pid, process) in system.processes().iter() {
        if *pid == current_id {
            continue;
        }
        if matches!(process.parent(), Some(p) if p == current_id) {
            continue;
        }

        if is_daemon(process, &cli, &daemon) {
            info!("Stopping daemon {pid}");
            // This will forcefully terminate the process on Windows. Anything better will require a
            // lot more work.
            if process.kill_with(Signal::Term).is_none() {
                process.kill();
            }
            process.wait();
            killed += 1;
        }
    }
    Ok(killed)
}

/// Shuts previous daemons down and starts a new detached one. The daemon binary detaches
/// itself, so this only waits for the launcher to exit.
pub fn restart_server(dir: Option<PathBuf>) -> Result<()> {
    kill_previous_servers()?;

    let daemon = to_daemon_path(env::current_exe().context("Can't operate without an executable")?);
    let mut command = std::process::Command::new(&daemon);
    if let Some(dir) = dir {
        command.arg("--dir").arg(std::path::absolute(dir)?);
    }
    command.stdin(Stdio::null());
    command.stdout(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    println!("Spawning {daemon:?}");
    let status = command
        .status()
        .with_context(|| format!("Failed to start {daemon:?}"))?;
    if !status.success() {
        return Err(anyhow!("Daemon launcher exited with {status}"));
    }
    println!("Success");
    Ok(())
}
