//! Stop command - stop a docker container.

use anyhow::{bail, Result};
use devdash_core::DockerCli;

pub async fn run(container: &str) -> Result<()> {
    println!("Stopping '{}'...", container);

    if DockerCli::new().stop_container(container).await? {
        println!("Stopped '{}'", container);
        Ok(())
    } else {
        bail!("Failed to stop '{}'", container)
    }
}
