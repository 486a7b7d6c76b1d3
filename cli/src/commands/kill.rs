//! Kill command - terminate a process by pid.

use anyhow::{bail, Result};
use devdash_core::ProcessKiller;

pub async fn run(pid: u32, force: bool) -> Result<()> {
    let killer = ProcessKiller::new();

    if !force {
        println!(
            "Killing PID {} (SIGKILL after {}s)...",
            pid,
            killer.grace_period().as_secs()
        );
    }

    if killer.kill(pid, force).await? {
        println!("Killed PID {}", pid);
        Ok(())
    } else {
        bail!("Failed to kill PID {}", pid)
    }
}
