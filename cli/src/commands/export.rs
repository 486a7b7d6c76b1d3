//! Export command - write one JSON snapshot of every table.

use anyhow::Result;
use devdash_core::application::{collect, default_export_dir, write_export, ExportDocument};
use devdash_core::{Config, LocalHost, PollGroup};

pub async fn run(config: &Config) -> Result<()> {
    let host = LocalHost::new(config.interest_patterns.clone());
    let (dev, system) = tokio::join!(
        collect(&host, PollGroup::Dev, config.process_limit),
        collect(&host, PollGroup::System, config.process_limit)
    );

    let document = ExportDocument::new(
        dev.snapshots.iter().chain(system.snapshots.iter()),
        system.stats.as_ref(),
    );
    let path = write_export(&default_export_dir()?, &document).await?;
    println!("{}", path.display());
    Ok(())
}
