use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// `MemoryCurrent` value systemd reports when accounting is unavailable.
const MEMORY_UNAVAILABLE: u64 = u64::MAX;

/// Properties requested from `systemctl show`.
pub const STATUS_PROPERTIES: &str =
    "ActiveState,LoadState,UnitFileState,MainPID,MemoryCurrent,ExecMainStartTimestamp";

/// Lifecycle verbs accepted by the service-control collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
    Reload,
    Enable,
    Disable,
}

impl ServiceAction {
    pub const ALL: [ServiceAction; 6] = [
        ServiceAction::Start,
        ServiceAction::Stop,
        ServiceAction::Restart,
        ServiceAction::Reload,
        ServiceAction::Enable,
        ServiceAction::Disable,
    ];

    /// The `systemctl` verb.
    pub fn verb(&self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Restart => "restart",
            ServiceAction::Reload => "reload",
            ServiceAction::Enable => "enable",
            ServiceAction::Disable => "disable",
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

impl FromStr for ServiceAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceAction::ALL
            .into_iter()
            .find(|action| action.verb().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown action: {}", s))
    }
}

/// Uniform snapshot of a unit's state, mapped from `systemctl show` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub active_state: String,
    pub load_state: String,
    pub unit_file_state: String,

    /// `None` when the unit has no main process.
    pub main_pid: Option<u32>,

    /// `None` when memory accounting is unavailable.
    pub memory_bytes: Option<u64>,

    pub started_at: Option<SystemTime>,
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self {
            active_state: "unknown".to_string(),
            load_state: "unknown".to_string(),
            unit_file_state: "unknown".to_string(),
            main_pid: None,
            memory_bytes: None,
            started_at: None,
        }
    }
}

impl ServiceStatus {
    /// Parse `Key=Value` lines. Values may themselves contain `=`.
    pub fn parse_properties(output: &str) -> HashMap<String, String> {
        output
            .lines()
            .filter_map(|line| line.split_once('='))
            .filter(|(key, _)| !key.is_empty())
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    /// Build a snapshot from parsed properties.
    pub fn from_properties(properties: &HashMap<String, String>) -> Self {
        let state = |key: &str| {
            properties
                .get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .unwrap_or_else(|| "unknown".to_string())
        };

        let main_pid = properties
            .get("MainPID")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|pid| *pid != 0);

        let memory_bytes = properties
            .get("MemoryCurrent")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|bytes| *bytes != MEMORY_UNAVAILABLE);

        let started_at = properties
            .get("ExecMainStartTimestamp")
            .and_then(|v| parse_timestamp(v));

        Self {
            active_state: state("ActiveState"),
            load_state: state("LoadState"),
            unit_file_state: state("UnitFileState"),
            main_pid,
            memory_bytes,
            started_at,
        }
    }

    /// Parse raw `systemctl show` output.
    pub fn from_show_output(output: &str) -> Self {
        Self::from_properties(&Self::parse_properties(output))
    }

    pub fn is_active(&self) -> bool {
        self.active_state == "active"
    }

    pub fn is_failed(&self) -> bool {
        self.active_state == "failed"
    }

    pub fn is_enabled(&self) -> bool {
        self.unit_file_state == "enabled"
    }

    /// Memory usage rounded to whole MiB.
    pub fn memory_mb(&self) -> Option<u64> {
        self.memory_bytes
            .map(|bytes| (bytes as f64 / 1024.0 / 1024.0).round() as u64)
    }

    /// Time since the main process started, only while the unit is active.
    pub fn uptime(&self, now: SystemTime) -> Option<Duration> {
        if !self.is_active() {
            return None;
        }
        self.started_at
            .and_then(|started| now.duration_since(started).ok())
    }

    /// Whether a lifecycle verb makes sense in the current state.
    pub fn is_action_available(&self, action: ServiceAction) -> bool {
        match action {
            ServiceAction::Start => !self.is_active(),
            ServiceAction::Stop | ServiceAction::Reload => self.is_active(),
            ServiceAction::Restart => true,
            ServiceAction::Enable => self.unit_file_state != "enabled",
            ServiceAction::Disable => self.unit_file_state != "disabled",
        }
    }

    /// One-line human summary.
    pub fn summary(&self, now: SystemTime) -> String {
        let pid = self
            .main_pid
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| "Not running".to_string());
        let memory = self
            .memory_mb()
            .map(|mb| format!("{} MB", mb))
            .unwrap_or_else(|| "N/A".to_string());
        let uptime = self
            .uptime(now)
            .map(format_uptime)
            .unwrap_or_else(|| "Not running".to_string());

        format!(
            "active={} load={} enabled={} pid={} memory={} uptime={}",
            self.active_state, self.load_state, self.unit_file_state, pid, memory, uptime
        )
    }
}

/// Accepts `@<unix seconds>` (from `--timestamp=unix`) or bare microseconds.
/// Values past what `SystemTime` can hold are treated as absent.
fn parse_timestamp(raw: &str) -> Option<SystemTime> {
    let raw = raw.trim();
    if let Some(seconds) = raw.strip_prefix('@') {
        let seconds = seconds.parse::<u64>().ok().filter(|s| *s != 0)?;
        return UNIX_EPOCH.checked_add(Duration::from_secs(seconds));
    }
    let micros = raw.parse::<u64>().ok().filter(|m| *m != 0)?;
    UNIX_EPOCH.checked_add(Duration::from_micros(micros))
}

/// Compact uptime such as `1d 2h 3m`, `2h 5m`, `3m 4s` or `9s`.
pub fn format_uptime(uptime: Duration) -> String {
    let seconds = uptime.as_secs();
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{}d {}h {}m", days, hours % 24, minutes % 60)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACTIVE_OUTPUT: &str = "ActiveState=active\nLoadState=loaded\nUnitFileState=enabled\nMainPID=4242\nMemoryCurrent=52428800\nExecMainStartTimestamp=@1700000000\n";

    #[test]
    fn test_parse_active_unit() {
        let status = ServiceStatus::from_show_output(ACTIVE_OUTPUT);

        assert!(status.is_active());
        assert!(status.is_enabled());
        assert_eq!(status.load_state, "loaded");
        assert_eq!(status.main_pid, Some(4242));
        assert_eq!(status.memory_mb(), Some(50));
        assert_eq!(
            status.started_at,
            Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
        );
    }

    #[test]
    fn test_parse_inactive_unit() {
        let output = "ActiveState=inactive\nMainPID=0\nMemoryCurrent=18446744073709551615\nExecMainStartTimestamp=\n";
        let status = ServiceStatus::from_show_output(output);

        assert!(!status.is_active());
        assert_eq!(status.main_pid, None);
        assert_eq!(status.memory_bytes, None);
        assert_eq!(status.started_at, None);
        assert_eq!(status.load_state, "unknown");
        assert_eq!(status.unit_file_state, "unknown");
    }

    #[test]
    fn test_parse_properties_splits_on_first_equals() {
        let properties = ServiceStatus::parse_properties("Key=a=b\nnot a property\n=orphan\n");
        assert_eq!(properties.get("Key").map(String::as_str), Some("a=b"));
        assert_eq!(properties.len(), 1);
    }

    #[test]
    fn test_microsecond_timestamp() {
        let output = "ExecMainStartTimestamp=1700000000000000";
        let status = ServiceStatus::from_show_output(output);
        assert_eq!(
            status.started_at,
            Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
        );
    }

    #[test]
    fn test_out_of_range_timestamp_is_absent() {
        let output = "ActiveState=active\nExecMainStartTimestamp=@18446744073709551615\n";
        let status = ServiceStatus::from_show_output(output);

        assert!(status.is_active());
        assert_eq!(status.started_at, None);
        assert_eq!(status.uptime(SystemTime::now()), None);
    }

    #[test]
    fn test_uptime_only_while_active() {
        let status = ServiceStatus::from_show_output(ACTIVE_OUTPUT);
        let now = UNIX_EPOCH + Duration::from_secs(1_700_000_000 + 3_725);
        assert_eq!(status.uptime(now), Some(Duration::from_secs(3_725)));

        let stopped = ServiceStatus {
            active_state: "inactive".to_string(),
            ..status
        };
        assert_eq!(stopped.uptime(now), None);
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(9)), "9s");
        assert_eq!(format_uptime(Duration::from_secs(184)), "3m 4s");
        assert_eq!(format_uptime(Duration::from_secs(2 * 3600 + 5 * 60 + 7)), "2h 5m");
        assert_eq!(
            format_uptime(Duration::from_secs(86_400 + 2 * 3600 + 3 * 60)),
            "1d 2h 3m"
        );
    }

    #[test]
    fn test_action_availability() {
        let active = ServiceStatus::from_show_output(ACTIVE_OUTPUT);
        assert!(!active.is_action_available(ServiceAction::Start));
        assert!(active.is_action_available(ServiceAction::Stop));
        assert!(active.is_action_available(ServiceAction::Reload));
        assert!(active.is_action_available(ServiceAction::Restart));
        assert!(!active.is_action_available(ServiceAction::Enable));
        assert!(active.is_action_available(ServiceAction::Disable));

        let unknown = ServiceStatus::default();
        assert!(unknown.is_action_available(ServiceAction::Start));
        assert!(!unknown.is_action_available(ServiceAction::Stop));
        assert!(unknown.is_action_available(ServiceAction::Enable));
        assert!(unknown.is_action_available(ServiceAction::Disable));
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!("restart".parse::<ServiceAction>(), Ok(ServiceAction::Restart));
        assert_eq!("STOP".parse::<ServiceAction>(), Ok(ServiceAction::Stop));
        assert!("explode".parse::<ServiceAction>().is_err());
        assert_eq!(ServiceAction::Enable.to_string(), "enable");
    }

    #[test]
    fn test_summary() {
        let status = ServiceStatus::from_show_output(ACTIVE_OUTPUT);
        let now = UNIX_EPOCH + Duration::from_secs(1_700_000_009);
        assert_eq!(
            status.summary(now),
            "active=active load=loaded enabled=enabled pid=4242 memory=50 MB uptime=9s"
        );
    }
}
