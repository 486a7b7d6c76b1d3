//! Process and host metrics provider backed by sysinfo.
//!
//! sysinfo calls block, so every sample runs on the blocking pool while
//! holding the sampler lock. CPU percentages are deltas between refreshes,
//! which is why one [`System`] lives for the provider's whole lifetime.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use sysinfo::{
    CpuRefreshKind, Disks, MemoryRefreshKind, Networks, Pid, Process, ProcessRefreshKind,
    ProcessesToUpdate, System, UpdateKind, Users, MINIMUM_CPU_UPDATE_INTERVAL,
};
use tracing::debug;

use super::scanner::{ListenerMap, PortScanner};
use super::truncate_display;
use crate::domain::{AggregateStats, Entity, ProcessDetail};
use crate::error::{Error, Result};

/// Display width of the command column.
const COMMAND_DISPLAY_MAX: usize = 120;

const MIB: f64 = 1024.0 * 1024.0;

/// Plain per-process facts pulled out of sysinfo.
#[derive(Debug, Clone, Default)]
pub(crate) struct ProcessRecord {
    pub pid: u32,
    pub name: String,
    pub cmd: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub cpu_percent: f32,
    pub memory_bytes: u64,
    pub run_time_secs: u64,
    pub user: String,
    pub status: String,
}

impl ProcessRecord {
    fn memory_mb(&self) -> f64 {
        self.memory_bytes as f64 / MIB
    }

    /// The first interest pattern this process matches, checked against the
    /// process name and the basename of argv[0].
    fn matched_pattern<'p>(&self, patterns: &'p [String]) -> Option<&'p str> {
        let name = self.name.to_lowercase();
        let argv0 = self
            .cmd
            .first()
            .map(|arg| arg.rsplit('/').next().unwrap_or(arg).to_lowercase());

        patterns
            .iter()
            .find(|pattern| {
                let pattern = pattern.to_lowercase();
                name.contains(&pattern) || argv0.as_deref().is_some_and(|a| a.contains(&pattern))
            })
            .map(String::as_str)
    }

    fn command_label(&self) -> String {
        if self.cmd.is_empty() {
            return self.name.clone();
        }
        truncate_display(&self.cmd.join(" "), COMMAND_DISPLAY_MAX)
    }
}

/// Memoised `package.json` project names keyed by working directory.
#[derive(Debug, Default)]
pub(crate) struct ProjectNames {
    cache: Mutex<HashMap<PathBuf, String>>,
}

impl ProjectNames {
    /// Name from the nearest `package.json` at or above `cwd`, or empty.
    ///
    /// The search stops at the first `package.json` found, even if it is
    /// unreadable.
    pub fn lookup(&self, cwd: &Path) -> String {
        if let Some(name) = self.cache.lock().get(cwd) {
            return name.clone();
        }

        let mut name = String::new();
        for dir in cwd.ancestors() {
            let manifest = dir.join("package.json");
            if !manifest.is_file() {
                continue;
            }
            if let Ok(text) = std::fs::read_to_string(&manifest) {
                if let Ok(json) = serde_json::from_str::<serde_json::Value>(&text) {
                    name = json
                        .get("name")
                        .and_then(|n| n.as_str())
                        .unwrap_or_default()
                        .to_string();
                }
            }
            break;
        }

        self.cache.lock().insert(cwd.to_path_buf(), name.clone());
        name
    }
}

/// sysinfo handles plus the previous network sample.
struct Sampler {
    system: System,
    disks: Disks,
    networks: Networks,
    users: Users,
    last_process_refresh: Option<Instant>,
    last_net: Option<(Instant, u64, u64)>,
}

impl Sampler {
    fn new() -> Self {
        let mut system = System::new();
        // CPU usage needs two samples; take the first now.
        system.refresh_cpu_specifics(CpuRefreshKind::everything());

        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
            users: Users::new_with_refreshed_list(),
            last_process_refresh: None,
            last_net: None,
        }
    }

    /// Refresh the process table unless it was refreshed too recently for
    /// CPU deltas to mean anything.
    fn refresh_processes(&mut self) {
        let fresh = self
            .last_process_refresh
            .is_some_and(|at| at.elapsed() < MINIMUM_CPU_UPDATE_INTERVAL);
        if fresh {
            return;
        }

        self.system
            .refresh_memory_specifics(MemoryRefreshKind::nothing().with_ram());
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .with_cpu()
                .with_memory()
                .with_cwd(UpdateKind::OnlyIfNotSet)
                .with_cmd(UpdateKind::OnlyIfNotSet)
                .with_user(UpdateKind::OnlyIfNotSet),
        );
        self.last_process_refresh = Some(Instant::now());
    }

    fn records(&self) -> Vec<ProcessRecord> {
        self.system
            .processes()
            .iter()
            .map(|(pid, proc)| self.record(*pid, proc))
            .collect()
    }

    fn record(&self, pid: Pid, proc: &Process) -> ProcessRecord {
        ProcessRecord {
            pid: pid.as_u32(),
            name: proc.name().to_string_lossy().to_string(),
            cmd: proc
                .cmd()
                .iter()
                .map(|s| s.to_string_lossy().to_string())
                .collect(),
            cwd: proc.cwd().map(Path::to_path_buf),
            cpu_percent: proc.cpu_usage(),
            memory_bytes: proc.memory(),
            run_time_secs: proc.run_time(),
            user: proc
                .user_id()
                .and_then(|uid| self.users.get_user_by_id(uid))
                .map(|u| u.name().to_string())
                .unwrap_or_default(),
            status: proc.status().to_string().to_lowercase(),
        }
    }

    /// Everything sysinfo will tell about `pid`, or `None` once it is gone.
    fn detail_record(&mut self, pid: u32) -> Option<DetailRecord> {
        self.refresh_processes();
        let target = Pid::from_u32(pid);
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[target]),
            true,
            ProcessRefreshKind::everything(),
        );

        let proc = self.system.process(target)?;
        let record = self.record(target, proc);
        Some(DetailRecord {
            virtual_bytes: proc.virtual_memory(),
            threads: proc.tasks().map(|tasks| tasks.len()),
            environ: proc
                .environ()
                .iter()
                .map(|s| s.to_string_lossy().to_string())
                .collect(),
            children: self.descendants(target),
            record,
        })
    }

    fn descendants(&self, root: Pid) -> Vec<(u32, String)> {
        let tree: Vec<(u32, Option<u32>, String)> = self
            .system
            .processes()
            .iter()
            .map(|(pid, proc)| {
                (
                    pid.as_u32(),
                    proc.parent().map(Pid::as_u32),
                    proc.name().to_string_lossy().to_string(),
                )
            })
            .collect();
        descendants(root.as_u32(), &tree)
    }

    fn stats(&mut self) -> AggregateStats {
        self.system
            .refresh_cpu_specifics(CpuRefreshKind::nothing().with_cpu_usage());
        self.system
            .refresh_memory_specifics(MemoryRefreshKind::everything());
        self.disks.refresh(true);
        self.networks.refresh(true);

        let cpus = self.system.cpus();
        let cpu_percent = cpus.iter().map(sysinfo::Cpu::cpu_usage).sum::<f32>() as f64
            / cpus.len().max(1) as f64;

        let mem_total = self.system.total_memory();
        let mem_used = self.system.used_memory();
        let swap_total = self.system.total_swap();
        let swap_used = self.system.used_swap();

        // Root filesystem, or every disk summed when there is no `/` mount.
        let (disk_total, disk_free) = match self
            .disks
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))
        {
            Some(root) => (root.total_space(), root.available_space()),
            None => self.disks.iter().fold((0, 0), |acc, d| {
                (acc.0 + d.total_space(), acc.1 + d.available_space())
            }),
        };
        let disk_used = disk_total.saturating_sub(disk_free);

        let (sent, recv) = self.networks.iter().fold((0u64, 0u64), |acc, (_, data)| {
            (acc.0 + data.total_transmitted(), acc.1 + data.total_received())
        });
        let now = Instant::now();
        let (net_sent_per_sec, net_recv_per_sec) =
            network_rates(self.last_net, (now, sent, recv));
        self.last_net = Some((now, sent, recv));

        AggregateStats {
            cpu_percent,
            cpu_count: cpus.len().max(1),
            memory_total_gb: AggregateStats::gib(mem_total),
            memory_used_gb: AggregateStats::gib(mem_used),
            memory_percent: AggregateStats::percent(mem_used, mem_total),
            swap_total_gb: AggregateStats::gib(swap_total),
            swap_used_gb: AggregateStats::gib(swap_used),
            swap_percent: AggregateStats::percent(swap_used, swap_total),
            disk_total_gb: AggregateStats::gib(disk_total),
            disk_used_gb: AggregateStats::gib(disk_used),
            disk_free_gb: AggregateStats::gib(disk_free),
            disk_percent: AggregateStats::percent(disk_used, disk_total),
            net_sent_per_sec,
            net_recv_per_sec,
        }
    }
}

/// Bytes-per-second rates between two cumulative counter samples.
fn network_rates(
    previous: Option<(Instant, u64, u64)>,
    current: (Instant, u64, u64),
) -> (Option<f64>, Option<f64>) {
    let Some((then, sent_before, recv_before)) = previous else {
        return (None, None);
    };
    let elapsed = current.0.duration_since(then).as_secs_f64();
    if elapsed <= 0.0 {
        return (None, None);
    }
    (
        Some(current.1.saturating_sub(sent_before) as f64 / elapsed),
        Some(current.2.saturating_sub(recv_before) as f64 / elapsed),
    )
}

/// Every process below `root` in a `(pid, parent, name)` table, depth
/// first with siblings in pid order.
fn descendants(root: u32, tree: &[(u32, Option<u32>, String)]) -> Vec<(u32, String)> {
    let mut by_parent: HashMap<u32, Vec<(u32, &str)>> = HashMap::new();
    for (pid, parent, name) in tree {
        if let Some(parent) = parent {
            by_parent.entry(*parent).or_default().push((*pid, name.as_str()));
        }
    }
    for kids in by_parent.values_mut() {
        kids.sort_unstable();
    }

    let mut seen = HashSet::from([root]);
    let mut children = Vec::new();
    let mut stack: Vec<(u32, &str)> = by_parent
        .get(&root)
        .map(|kids| kids.iter().rev().copied().collect())
        .unwrap_or_default();
    while let Some((pid, name)) = stack.pop() {
        if !seen.insert(pid) {
            continue;
        }
        children.push((pid, name.to_string()));
        if let Some(kids) = by_parent.get(&pid) {
            stack.extend(kids.iter().rev().copied());
        }
    }
    children
}

/// Raw facts behind a [`ProcessDetail`].
#[derive(Debug, Clone, Default)]
pub(crate) struct DetailRecord {
    pub record: ProcessRecord,
    pub virtual_bytes: u64,
    pub threads: Option<usize>,
    pub children: Vec<(u32, String)>,
    /// `KEY=value` entries as the OS reports them.
    pub environ: Vec<String>,
}

fn process_detail(detail: DetailRecord, ports: Vec<u16>) -> ProcessDetail {
    let DetailRecord {
        record,
        virtual_bytes,
        threads,
        children,
        environ,
    } = detail;

    let mut environment: Vec<(String, String)> = environ
        .iter()
        .filter_map(|entry| {
            let (key, value) = entry.split_once('=')?;
            Some((key.to_string(), value.to_string()))
        })
        .collect();
    environment.sort();

    let known = |value: String| (!value.is_empty()).then_some(value);

    ProcessDetail {
        pid: record.pid,
        command: if record.cmd.is_empty() {
            record.name.clone()
        } else {
            record.cmd.join(" ")
        },
        name: record.name,
        status: record.status,
        user: known(record.user),
        cwd: record.cwd.map(|cwd| cwd.display().to_string()),
        cpu_percent: record.cpu_percent,
        rss_bytes: record.memory_bytes,
        virtual_bytes,
        threads,
        ports,
        children,
        environment,
    }
}

/// Processes and host metrics from the local machine.
#[derive(Clone)]
pub struct SystemProvider {
    sampler: Arc<Mutex<Sampler>>,
    scanner: Arc<PortScanner>,
    patterns: Arc<Vec<String>>,
    projects: Arc<ProjectNames>,
    home: Option<PathBuf>,
}

impl SystemProvider {
    /// Create a provider matching processes of interest against `patterns`.
    pub fn new(patterns: Vec<String>) -> Self {
        Self {
            sampler: Arc::new(Mutex::new(Sampler::new())),
            scanner: Arc::new(PortScanner::new()),
            patterns: Arc::new(patterns),
            projects: Arc::new(ProjectNames::default()),
            home: dirs::home_dir(),
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Processes matching the interest patterns, heaviest first.
    pub async fn processes_of_interest(&self) -> Result<Vec<Entity>> {
        // Ports only annotate rows; a missing `ss`/`lsof` leaves them blank.
        let listeners = match self.scanner.scan().await {
            Ok(listeners) => listeners,
            Err(e) => {
                debug!(error = %e, "Listener scan failed, ports omitted");
                ListenerMap::new()
            }
        };

        let patterns = Arc::clone(&self.patterns);
        let projects = Arc::clone(&self.projects);
        let home = self.home.clone();

        self.with_sampler(move |sampler| {
            sampler.refresh_processes();
            let mut records: Vec<(ProcessRecord, String)> = sampler
                .records()
                .into_iter()
                .filter_map(|r| {
                    let pattern = r.matched_pattern(&patterns)?.to_string();
                    Some((r, pattern))
                })
                .collect();
            records.sort_by(|a, b| b.0.memory_bytes.cmp(&a.0.memory_bytes));

            records
                .into_iter()
                .map(|(record, pattern)| {
                    let ports = listeners.get(&record.pid).cloned().unwrap_or_default();
                    let project = record
                        .cwd
                        .as_deref()
                        .map(|cwd| projects.lookup(cwd))
                        .unwrap_or_default();
                    dev_entity(&record, ports, &pattern, &project, home.as_deref())
                })
                .collect()
        })
        .await
    }

    /// Every process, heaviest first, truncated to `limit`.
    pub async fn all_processes(&self, limit: usize) -> Result<Vec<Entity>> {
        self.with_sampler(move |sampler| {
            sampler.refresh_processes();
            let total_memory = sampler.system.total_memory();
            heaviest(sampler.records(), limit, total_memory)
        })
        .await
    }

    /// A close look at one process: identity, resources, descendants,
    /// listening ports and environment.
    pub async fn process_detail(&self, pid: u32) -> Result<ProcessDetail> {
        let ports = match self.scanner.scan().await {
            Ok(mut listeners) => listeners.remove(&pid).unwrap_or_default(),
            Err(e) => {
                debug!(error = %e, "Listener scan failed, ports omitted");
                Vec::new()
            }
        };

        let record = self
            .with_sampler(move |sampler| sampler.detail_record(pid))
            .await?
            .ok_or(Error::ProcessNotFound(pid))?;
        Ok(process_detail(record, ports))
    }

    /// Host-wide metrics.
    pub async fn stats(&self) -> Result<AggregateStats> {
        self.with_sampler(Sampler::stats).await
    }

    async fn with_sampler<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Sampler) -> T + Send + 'static,
        T: Send + 'static,
    {
        let sampler = Arc::clone(&self.sampler);
        tokio::task::spawn_blocking(move || {
            let mut sampler = sampler.lock();
            f(&mut sampler)
        })
        .await
        .map_err(|e| Error::CommandFailed(format!("Sampler task failed: {}", e)))
    }
}

// ============================================================================
// Row formatting
// ============================================================================

fn dev_entity(
    record: &ProcessRecord,
    ports: Vec<u16>,
    pattern: &str,
    project: &str,
    home: Option<&Path>,
) -> Entity {
    let entity = Entity::process(record.pid, record.name.clone())
        .with_ports(ports)
        .with_group(pattern);
    let ports_label = entity.ports_label();
    let directory = record
        .cwd
        .as_deref()
        .map(|cwd| shorten_cwd(cwd, home))
        .unwrap_or_default();

    entity
        .field("PID", record.pid.to_string())
        .field("Project", if project.is_empty() { "-" } else { project })
        .field("Port(s)", ports_label)
        .field("Memory", format!("{:.0} MB", record.memory_mb()))
        .field("CPU", format!("{:.1}%", record.cpu_percent))
        .field("Uptime", format_uptime(record.run_time_secs))
        .field("Directory", directory)
        .field("Command", record.command_label())
}

/// The `limit` largest records by resident memory, as all-processes rows.
fn heaviest(mut records: Vec<ProcessRecord>, limit: usize, total_memory: u64) -> Vec<Entity> {
    records.sort_by(|a, b| b.memory_bytes.cmp(&a.memory_bytes));
    records.truncate(limit);
    records
        .iter()
        .map(|record| general_entity(record, total_memory))
        .collect()
}

fn general_entity(record: &ProcessRecord, total_memory: u64) -> Entity {
    let memory_percent = AggregateStats::percent(record.memory_bytes, total_memory);

    Entity::process(record.pid, record.name.clone())
        .field("PID", record.pid.to_string())
        .field("Name", record.name.clone())
        .field("CPU %", format!("{:.1}%", record.cpu_percent))
        .field("Memory", format!("{:.0} MB", record.memory_mb()))
        .field("Mem %", format!("{:.1}%", memory_percent))
        .field("User", record.user.clone())
        .field("Status", record.status.clone())
        .field("Command", record.command_label())
}

/// Replace a leading home directory with `~`.
fn shorten_cwd(cwd: &Path, home: Option<&Path>) -> String {
    match home.and_then(|home| cwd.strip_prefix(home).ok()) {
        Some(rest) if rest.as_os_str().is_empty() => "~".to_string(),
        Some(rest) => format!("~/{}", rest.display()),
        None => cwd.display().to_string(),
    }
}

/// `42s`, `5m`, `3h 7m`, `2d 4h`.
pub(crate) fn format_uptime(secs: u64) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    if secs < MINUTE {
        format!("{}s", secs)
    } else if secs < HOUR {
        format!("{}m", secs / MINUTE)
    } else if secs < DAY {
        format!("{}h {}m", secs / HOUR, (secs % HOUR) / MINUTE)
    } else {
        format!("{}d {}h", secs / DAY, (secs % DAY) / HOUR)
    }
}
