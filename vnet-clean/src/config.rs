use std::time::Duration;

use vnet_node::platform::SHELL_TAG;

/// How interfaces and processes are found and removed on the running system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupFlavor {
    /// `ip link` listing and deletion, `pgrep` for processes. Linux.
    IpLink,
    /// `ifconfig -l` listing and `ifconfig destroy`, `ps` for processes, and vnet jails.
    /// FreeBSD.
    Ifconfig,
    /// `ifconfig` listing of `pair(4)` interfaces and per-domain loopbacks. OpenBSD.
    IfconfigPairs,
}

impl CleanupFlavor {
    /// The flavor for the operating system this was compiled for.
    pub const fn native() -> Self {
        if cfg!(target_os = "freebsd") {
            Self::Ifconfig
        } else if cfg!(target_os = "openbsd") {
            Self::IfconfigPairs
        } else {
            Self::IpLink
        }
    }
}

/// What cleanup looks for.
///
/// Process patterns are `pkill -f` / `pgrep -f` regular expressions. Patterns that would
/// otherwise match the shell running the cleanup command itself are written with a
/// bracketed first character, e.g. `[v]net:`.
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Processes killed by name in the first stage: controllers, software datapaths and
    /// helpers left behind by switch implementations.
    pub zombies: Vec<String>,
    /// Command line of the privileged wrapper that starts node shells.
    pub wrapper_pattern: String,
    /// Temporary files, as shell globs.
    pub temp_globs: Vec<String>,
    /// Command line marker of node shells.
    pub shell_pattern: String,
    /// Name marker of node jails.
    pub jail_tag: String,
    /// Command lines of stale terminal tunnels.
    pub tunnel_patterns: Vec<String>,
    /// Directory holding tunnel control sockets.
    pub tunnel_dir: String,
    /// Interfaces deleted per shell invocation.
    pub link_chunk: usize,
    /// Loopbacks deleted per shell invocation. A routing domain holds at most 256.
    pub loopback_chunk: usize,
    /// Pause between the polite and the forced kill of the first stage.
    pub settle: Duration,
    /// Pause between kill rounds while stale processes remain.
    pub poll_interval: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        let zombies = [
            "controller",
            "ofprotocol",
            "ofdatapath",
            "ping",
            "nox_core",
            "lt-nox_core",
            "ovs-openflowd",
            "ovs-controller",
            "ovs-testcontroller",
            "udpbwtest",
            "mnexec",
            "ivs",
            "ryu-manager",
        ];
        let temp_globs = ["/tmp/vconn*", "/tmp/vlogs*", "/tmp/*.out", "/tmp/*.log"];

        Self {
            zombies: zombies.map(String::from).to_vec(),
            wrapper_pattern: "sudo unshare --net".to_string(),
            temp_globs: temp_globs.map(String::from).to_vec(),
            shell_pattern: bracketed(SHELL_TAG),
            jail_tag: SHELL_TAG.to_string(),
            tunnel_patterns: vec!["[T]unnel=Ethernet".to_string(), "[.]ssh/vnet".to_string()],
            tunnel_dir: "~/.ssh/vnet".to_string(),
            link_chunk: 1000,
            loopback_chunk: 256,
            settle: Duration::from_secs(1),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl CleanupConfig {
    pub fn with_zombies<I, S>(mut self, zombies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.zombies = zombies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_temp_globs<I, S>(mut self, globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.temp_globs = globs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_link_chunk(mut self, chunk: usize) -> Self {
        self.link_chunk = chunk.max(1);
        self
    }

    pub fn with_loopback_chunk(mut self, chunk: usize) -> Self {
        self.loopback_chunk = chunk.max(1);
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// `vnet:` becomes `[v]net:`, which matches the same text but not itself.
fn bracketed(pattern: &str) -> String {
    let mut chars = pattern.chars();
    match chars.next() {
        Some(first) => format!("[{first}]{}", chars.as_str()),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patterns_do_not_match_themselves() {
        let config = CleanupConfig::default();
        assert_eq!(config.shell_pattern, "[v]net:");
        assert_eq!(config.jail_tag, "vnet:");
        assert_eq!(bracketed(""), "");
    }

    #[test]
    fn chunks_are_never_empty() {
        let config = CleanupConfig::default().with_link_chunk(0).with_loopback_chunk(0);
        assert_eq!((config.link_chunk, config.loopback_chunk), (1, 1));
    }
}
