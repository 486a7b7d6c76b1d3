//! Container provider backed by the docker CLI.
//!
//! Listing uses `docker ps --format '{{json .}}'`, one JSON object per line.
//! Every invocation carries a hard timeout so a hung daemon never stalls a
//! poll.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::truncate_display;
use crate::domain::{short_id, Entity};
use crate::error::{Error, Result};

/// Default paths to search for docker before falling back to `$PATH`.
const DOCKER_PATHS: &[&str] = &[
    "/opt/homebrew/bin/docker",
    "/usr/local/bin/docker",
    "/usr/bin/docker",
];

/// Ceiling for `docker ps`.
pub const LIST_TIMEOUT: Duration = Duration::from_secs(5);

/// Ceiling for `docker stop`.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(15);

/// Ceiling for joining the log reader after a stop request.
pub const LOG_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Lines requested from the log backlog.
const LOG_BACKLOG_LINES: &str = "100";

/// Lines buffered between the log reader and the UI; excess lines are dropped.
const LOG_CHANNEL_CAPACITY: usize = 1024;

/// Display width of the ports column.
const PORTS_DISPLAY_MAX: usize = 60;

const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";
const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";

/// One line of `docker ps --format '{{json .}}'`.
#[derive(Debug, Deserialize)]
struct PsLine {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Names")]
    names: String,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "Ports", default)]
    ports: String,
    #[serde(rename = "RunningFor", default)]
    running_for: String,
    #[serde(rename = "Labels", default)]
    labels: String,
}

/// Docker CLI wrapper.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: PathBuf,
}

impl DockerCli {
    /// Locate docker in the usual install paths, falling back to `$PATH`.
    pub fn new() -> Self {
        let binary = DOCKER_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
            .unwrap_or_else(|| PathBuf::from("docker"));
        Self { binary }
    }

    /// Use a specific binary.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// List running containers ordered by compose project, service, then name.
    pub async fn list_containers(&self) -> Result<Vec<Entity>> {
        let output = self
            .execute(&["ps", "--format", "{{json .}}"], LIST_TIMEOUT, "docker ps")
            .await?;
        Ok(parse_ps_output(&output))
    }

    /// Stop a container. Returns whether docker reported success.
    pub async fn stop_container(&self, id: &str) -> Result<bool> {
        info!(container = id, "Stopping container");
        let result = timeout(STOP_TIMEOUT, self.command(&["stop", id]).output()).await;

        match result {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    warn!(
                        container = id,
                        stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                        "docker stop failed"
                    );
                }
                Ok(output.status.success())
            }
            Ok(Err(e)) => Err(self.spawn_error(e)),
            Err(_) => Err(Error::Timeout {
                what: format!("docker stop {}", id),
                secs: STOP_TIMEOUT.as_secs(),
            }),
        }
    }

    /// Follow a container's logs, starting from the last 100 lines.
    ///
    /// Lines from stdout and stderr are interleaved in arrival order.
    pub fn tail_logs(&self, id: &str) -> Result<LogTail> {
        let mut child = self
            .command(&["logs", "--tail", LOG_BACKLOG_LINES, "--follow", id])
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::CommandFailed("docker logs has no stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::CommandFailed("docker logs has no stderr".to_string()))?;

        let (line_tx, line_rx) = mpsc::channel(LOG_CHANNEL_CAPACITY);
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let container = id.to_string();

        let reader = tokio::spawn(async move {
            let mut out = BufReader::new(stdout).lines();
            let mut err = BufReader::new(stderr).lines();
            let (mut out_done, mut err_done) = (false, false);

            while !(out_done && err_done) {
                let line = tokio::select! {
                    _ = stop_rx.changed() => break,
                    line = out.next_line(), if !out_done => match line {
                        Ok(Some(line)) => line,
                        _ => { out_done = true; continue; }
                    },
                    line = err.next_line(), if !err_done => match line {
                        Ok(Some(line)) => line,
                        _ => { err_done = true; continue; }
                    },
                };
                match line_tx.try_send(line) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        debug!(container = %container, "Log buffer full, dropping line");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }

            if let Err(e) = child.kill().await {
                debug!(container = %container, error = %e, "docker logs already exited");
            }
        });

        Ok(LogTail {
            container: id.to_string(),
            lines: line_rx,
            stop_tx,
            reader: Some(reader),
        })
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    fn spawn_error(&self, e: std::io::Error) -> Error {
        match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::ProviderUnavailable("docker is not installed".to_string())
            }
            _ => Error::CommandFailed(format!("Failed to run docker: {}", e)),
        }
    }

    /// Run a docker command and return its stdout.
    async fn execute(&self, args: &[&str], limit: Duration, what: &str) -> Result<String> {
        let result = timeout(limit, self.command(args).output()).await;

        match result {
            Ok(Ok(output)) => {
                if output.status.success() {
                    String::from_utf8(output.stdout)
                        .map_err(|e| Error::ParseError(format!("Invalid UTF-8 from {}: {}", what, e)))
                } else {
                    // Usually "Cannot connect to the Docker daemon".
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    let reason = stderr.lines().next().unwrap_or("docker failed").trim();
                    Err(Error::ProviderUnavailable(reason.to_string()))
                }
            }
            Ok(Err(e)) => Err(self.spawn_error(e)),
            Err(_) => Err(Error::Timeout {
                what: what.to_string(),
                secs: limit.as_secs(),
            }),
        }
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

/// A running `docker logs --follow`.
///
/// Dropping the tail kills the child; [`LogTail::stop`] additionally waits
/// (bounded) for the reader task to finish.
pub struct LogTail {
    container: String,
    lines: mpsc::Receiver<String>,
    stop_tx: watch::Sender<bool>,
    reader: Option<JoinHandle<()>>,
}

impl LogTail {
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Drain every line received since the last call.
    pub fn drain(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = self.lines.try_recv() {
            lines.push(line);
        }
        lines
    }

    /// Wait for the next line; `None` once the stream has ended.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Signal the reader to stop and wait at most 2s for it.
    pub async fn stop(mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(reader) = self.reader.take() {
            if timeout(LOG_JOIN_TIMEOUT, reader).await.is_err() {
                warn!(container = %self.container, "Log reader did not stop in time");
            }
        }
    }
}

impl Drop for LogTail {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse `docker ps` JSON lines into container entities.
///
/// Malformed lines are skipped.
pub(crate) fn parse_ps_output(output: &str) -> Vec<Entity> {
    let mut rows: Vec<(String, String, Entity)> = Vec::new();

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let ps: PsLine = match serde_json::from_str(line) {
            Ok(ps) => ps,
            Err(e) => {
                debug!(error = %e, "Skipping malformed docker ps line");
                continue;
            }
        };

        let labels = parse_labels(&ps.labels);
        let project = labels.get(COMPOSE_PROJECT_LABEL).cloned().unwrap_or_default();
        let service = labels.get(COMPOSE_SERVICE_LABEL).cloned().unwrap_or_default();
        let name = ps.names.split(',').next().unwrap_or_default().to_string();

        let entity = Entity::container(ps.id.clone(), name.clone())
            .with_ports(published_ports(&ps.ports))
            .with_group(project.clone())
            .field("ID", short_id(&ps.id))
            .field("Name", name)
            .field("Image", ps.image)
            .field("Status", ps.status)
            .field("Ports", or_dash(truncate_display(&ps.ports, PORTS_DISPLAY_MAX)))
            .field("Running For", ps.running_for)
            .field("Compose", or_dash(project.clone()))
            .field("Service", or_dash(service.clone()));

        rows.push((project, service, entity));
    }

    rows.sort_by(|a, b| {
        (&a.0, &a.1, &a.2.name).cmp(&(&b.0, &b.1, &b.2.name))
    });
    rows.into_iter().map(|(_, _, entity)| entity).collect()
}

fn or_dash(text: String) -> String {
    if text.is_empty() {
        "-".to_string()
    } else {
        text
    }
}

/// Parse docker's `k=v,k=v` label string.
fn parse_labels(labels: &str) -> HashMap<String, String> {
    labels
        .split(',')
        .filter_map(|part| part.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// Host ports from a ports column such as
/// `0.0.0.0:8080->80/tcp, :::8080->80/tcp, 5432/tcp`.
///
/// Unpublished container ports (no `->`) are ignored. Ranges like
/// `0.0.0.0:8000-8002->8000-8002/tcp` are expanded.
fn published_ports(ports: &str) -> Vec<u16> {
    let mut result = Vec::new();
    for mapping in ports.split(',').map(str::trim) {
        let Some((host, _)) = mapping.split_once("->") else {
            continue;
        };
        let Some((_, port)) = host.rsplit_once(':') else {
            continue;
        };
        match port.split_once('-') {
            Some((start, end)) => {
                if let (Ok(start), Ok(end)) = (start.parse::<u16>(), end.parse::<u16>()) {
                    result.extend(start..=end);
                }
            }
            None => {
                if let Ok(port) = port.parse::<u16>() {
                    result.push(port);
                }
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntityKey;

    const PS_OUTPUT: &str = r#"{"ID":"aaaaaaaaaaaa1111","Names":"shop-web-1","Image":"nginx:latest","Status":"Up 2 hours","Ports":"0.0.0.0:8080->80/tcp, :::8080->80/tcp","RunningFor":"2 hours ago","Labels":"com.docker.compose.project=shop,com.docker.compose.service=web"}
{"ID":"bbbbbbbbbbbb2222","Names":"redis","Image":"redis:7","Status":"Up 5 minutes","Ports":"6379/tcp","RunningFor":"5 minutes ago","Labels":""}
not json
{"ID":"cccccccccccc3333","Names":"shop-db-1","Image":"postgres:16","Status":"Up 2 hours","Ports":"127.0.0.1:5432->5432/tcp","RunningFor":"2 hours ago","Labels":"com.docker.compose.service=db,com.docker.compose.project=shop"}
"#;

    #[test]
    fn test_parse_ps_output() {
        let containers = parse_ps_output(PS_OUTPUT);
        assert_eq!(containers.len(), 3);

        // Sorted by (project, service, name): "" < "shop"/"db" < "shop"/"web".
        let names: Vec<&str> = containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["redis", "shop-db-1", "shop-web-1"]);

        let web = &containers[2];
        assert_eq!(web.key, EntityKey::Container("aaaaaaaaaaaa1111".into()));
        assert_eq!(web.ports, vec![8080]);
        assert_eq!(web.group.as_deref(), Some("shop"));
        assert_eq!(web.get("ID"), Some("aaaaaaaaaaaa"));
        assert_eq!(web.get("Service"), Some("web"));

        let redis = &containers[0];
        assert!(redis.ports.is_empty());
        assert_eq!(redis.group, None);
        assert_eq!(redis.get("Compose"), Some("-"));
        assert_eq!(redis.get("Ports"), Some("6379/tcp"));
    }

    #[test]
    fn test_fields_follow_column_order() {
        let containers = parse_ps_output(PS_OUTPUT);
        let names: Vec<&str> = containers[0].fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, crate::domain::TableId::Containers.columns());
    }

    #[test]
    fn test_published_ports() {
        assert_eq!(published_ports("0.0.0.0:8080->80/tcp, :::8080->80/tcp"), vec![8080, 8080]);
        assert_eq!(published_ports("5432/tcp"), Vec::<u16>::new());
        assert_eq!(
            published_ports("0.0.0.0:8000-8002->8000-8002/tcp"),
            vec![8000, 8001, 8002]
        );
        assert!(published_ports("").is_empty());
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let docker = DockerCli::with_binary("/nonexistent/docker-binary");
        let err = docker.list_containers().await.unwrap_err();
        assert!(err.is_unavailable());
        let err = docker.stop_container("abc").await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_log_tail_streams_and_stops() {
        // `yes` echoes its arguments forever, standing in for a chatty container.
        let docker = DockerCli::with_binary("yes");
        let mut tail = docker.tail_logs("web").unwrap();
        let line = tail.next_line().await.unwrap();
        assert_eq!(line, "logs --tail 100 --follow web");
        assert_eq!(tail.container(), "web");

        let started = std::time::Instant::now();
        tail.stop().await;
        assert!(started.elapsed() <= LOG_JOIN_TIMEOUT + Duration::from_millis(500));
    }
}
