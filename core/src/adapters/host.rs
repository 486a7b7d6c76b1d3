//! The local machine as seen by the engine.

use crate::domain::{AggregateStats, Entity};
use crate::error::Result;
use crate::ports::{MutationPort, SnapshotProvider};

use super::docker::DockerCli;
use super::killer::ProcessKiller;
use super::system::SystemProvider;

/// Combines the sysinfo provider, the docker CLI and the signal killer
/// behind the two engine ports.
pub struct LocalHost {
    system: SystemProvider,
    docker: DockerCli,
    killer: ProcessKiller,
}

impl LocalHost {
    /// Create a host adapter matching processes of interest against `patterns`.
    pub fn new(patterns: Vec<String>) -> Self {
        Self {
            system: SystemProvider::new(patterns),
            docker: DockerCli::new(),
            killer: ProcessKiller::new(),
        }
    }

    pub fn docker(&self) -> &DockerCli {
        &self.docker
    }

    pub fn system(&self) -> &SystemProvider {
        &self.system
    }
}

impl SnapshotProvider for LocalHost {
    async fn list_processes_of_interest(&self) -> Result<Vec<Entity>> {
        self.system.processes_of_interest().await
    }

    async fn list_containers(&self) -> Result<Vec<Entity>> {
        self.docker.list_containers().await
    }

    async fn list_all_processes(&self, limit: usize) -> Result<Vec<Entity>> {
        self.system.all_processes(limit).await
    }

    async fn aggregate_stats(&self) -> Result<AggregateStats> {
        self.system.stats().await
    }
}

impl MutationPort for LocalHost {
    async fn terminate_process(&self, pid: u32) -> Result<bool> {
        self.killer.kill_gracefully(pid).await
    }

    async fn stop_container(&self, id: &str) -> Result<bool> {
        self.docker.stop_container(id).await
    }
}
