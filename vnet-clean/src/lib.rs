#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Removes what earlier vnet sessions left behind.
//!
//! A session that crashed or was killed leaves node shells, interfaces, switch bridges and
//! helper processes around. [`Cleanup::run`] removes them without needing anything from
//! the session that created them: everything is found by name, in process listings and
//! interface listings. It never fails, and running it on a clean system does nothing.
//!
//! Stages run in order, fast ones first:
//!
//! 1. Kill leftover controllers, software datapaths and helpers, politely then forcibly.
//! 2. Remove temporary files.
//! 3. Close terminal sessions attached to nodes.
//! 4. Delete kernel datapaths and switch bridges.
//! 5. Delete interfaces named `<node>-eth<port>`.
//! 6. Kill node shells until none are left, then remove node jails.
//! 7. Kill terminal tunnels and remove their control sockets.
//! 8. Run registered callbacks.

use std::sync::Arc;

use rustc_hash::FxHashSet;
use vnet_exec::{Cmd, Executor, HostExecutor};

mod callback;
mod config;
mod links;
mod report;
mod screen;

pub use callback::{register_cleanup_callback, Callback, CallbackRegistry};
pub use config::{CleanupConfig, CleanupFlavor};
pub use links::{ifconfig_names, vnet_intfs};
pub use report::CleanupReport;
pub use screen::{NoScreens, ScreenCleaner, ScreenSessions};

#[derive(Debug)]
pub struct Cleanup {
    exec: Arc<dyn Executor>,
    flavor: CleanupFlavor,
    config: CleanupConfig,
    screens: Box<dyn ScreenCleaner>,
    /// `None` uses [`CallbackRegistry::global`].
    callbacks: Option<Arc<CallbackRegistry>>,
}

impl Cleanup {
    pub fn new(exec: Arc<dyn Executor>, flavor: CleanupFlavor) -> Self {
        Self {
            exec,
            flavor,
            config: CleanupConfig::default(),
            screens: Box::new(ScreenSessions),
            callbacks: None,
        }
    }

    /// Cleans up this host.
    pub fn native() -> Self {
        Self::new(Arc::new(HostExecutor), CleanupFlavor::native())
    }

    pub fn with_config(mut self, config: CleanupConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_screens(mut self, screens: impl ScreenCleaner + 'static) -> Self {
        self.screens = Box::new(screens);
        self
    }

    pub fn with_callbacks(mut self, callbacks: Arc<CallbackRegistry>) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    pub fn config(&self) -> &CleanupConfig {
        &self.config
    }

    pub const fn flavor(&self) -> CleanupFlavor {
        self.flavor
    }

    pub fn run(&self) -> CleanupReport {
        let mut report = CleanupReport::default();

        self.kill_zombies();
        self.remove_temp_files();

        tracing::info!("closing terminal sessions");
        report.screens = self.screens.clean_up(self.exec.as_ref());

        report.datapaths = self.remove_datapaths();
        (report.bridges, report.bridges_second_pass) = self.remove_bridges();

        self.remove_links(&mut report);

        tracing::info!("killing stale node processes");
        report.kill_retries += self.kill_procs(&self.config.shell_pattern);
        if self.flavor == CleanupFlavor::Ifconfig {
            report.jails = self.remove_jails();
        }

        tracing::info!("shutting down stale tunnels");
        for pattern in &self.config.tunnel_patterns {
            report.kill_retries += self.kill_procs(pattern);
        }
        self.sh(format!("rm -f {}/*", self.config.tunnel_dir));

        let callbacks = self.callbacks.as_deref().unwrap_or_else(|| CallbackRegistry::global());
        report.callbacks = callbacks.run_all();

        tracing::info!(%report, "cleanup complete");
        report
    }

    fn run_lossy(&self, cmd: Cmd) -> String {
        self.exec.run_lossy(&cmd)
    }

    fn sh(&self, script: String) -> String {
        self.run_lossy(Cmd::sh(script))
    }

    fn kill_zombies(&self) {
        tracing::info!("removing excess controllers, datapaths and helpers");

        if !self.config.zombies.is_empty() {
            let zombies = self.config.zombies.join(" ");
            self.sh(format!("killall {zombies} 2> /dev/null"));
            self.exec.sleep(self.config.settle);
            self.sh(format!("killall -9 {zombies} 2> /dev/null"));
        }

        self.run_lossy(Cmd::new("pkill").args(["-9", "-f", &self.config.wrapper_pattern]));
    }

    fn remove_temp_files(&self) {
        if self.config.temp_globs.is_empty() {
            return;
        }

        tracing::info!("removing temporary files");
        self.sh(format!("rm -f {}", self.config.temp_globs.join(" ")));
    }

    fn remove_datapaths(&self) -> Vec<String> {
        tracing::info!("removing excess kernel datapaths");

        let datapaths = kernel_datapaths(&self.run_lossy(Cmd::new("ps").arg("ax")));
        for dp in &datapaths {
            self.run_lossy(Cmd::new("dpctl").args(["deldp", dp]));
        }
        datapaths
    }

    /// Deletes every bridge in one call, then lists again and deletes what is left one at
    /// a time: the batched delete does not always remove everything.
    fn remove_bridges(&self) -> (Vec<String>, Vec<String>) {
        tracing::info!("removing switch bridges");

        let list = || Cmd::new("ovs-vsctl").args(["--timeout=1", "list-br"]);
        let bridges = non_empty_lines(&self.run_lossy(list()));
        if !bridges.is_empty() {
            let mut del = Cmd::new("ovs-vsctl");
            for (i, bridge) in bridges.iter().enumerate() {
                if i > 0 {
                    del = del.arg("--");
                }
                del = del.args(["--if-exists", "del-br", bridge]);
            }
            self.run_lossy(del);
        }

        let remaining = non_empty_lines(&self.run_lossy(list()));
        for bridge in &remaining {
            self.run_lossy(Cmd::new("ovs-vsctl").args(["del-br", bridge]));
        }

        (bridges, remaining)
    }

    fn remove_links(&self, report: &mut CleanupReport) {
        tracing::info!("removing all links of the pattern <node>-eth<port>");

        let chunk = self.config.link_chunk;
        let destroy = |name: &str| format!("ifconfig {name} destroy");

        let tap9_listing = match self.flavor {
            CleanupFlavor::IpLink => {
                let names = vnet_intfs(&self.run_lossy(Cmd::new("ip").args(["link", "show"])));
                for cmd in links::batched(&names, chunk, |name| format!("ip link del {name}")) {
                    self.run_lossy(cmd);
                }
                report.links = names;
                Cmd::new("ip").args(["link", "show"])
            }
            CleanupFlavor::Ifconfig => {
                let names = vnet_intfs(&self.run_lossy(Cmd::new("ifconfig").arg("-l")));
                for cmd in links::batched(&names, chunk, destroy) {
                    self.run_lossy(cmd);
                }
                report.links = names;
                Cmd::new("ifconfig")
            }
            CleanupFlavor::IfconfigPairs => {
                let pairs = ifconfig_names(&self.run_lossy(Cmd::new("ifconfig").arg("pair")));
                for cmd in links::batched(&pairs, chunk, destroy) {
                    self.run_lossy(cmd);
                }
                report.links = pairs;

                let listing = self.run_lossy(Cmd::new("ifconfig").arg("lo"));
                let loopbacks: Vec<String> = ifconfig_names(&listing)
                    .into_iter()
                    .filter(|lo| lo != "lo0")
                    .collect();
                for cmd in links::batched(&loopbacks, self.config.loopback_chunk, destroy) {
                    self.run_lossy(cmd);
                }
                report.loopbacks = loopbacks;
                Cmd::new("ifconfig")
            }
        };

        if self.run_lossy(tap9_listing).contains("tap9") {
            tracing::info!("removing tap9, assuming it was left by a cluster session");
            let cmd = match self.flavor {
                CleanupFlavor::IpLink => Cmd::new("ip").args(["link", "del", "tap9"]),
                _ => Cmd::new("ifconfig").args(["tap9", "destroy"]),
            };
            self.run_lossy(cmd);
            report.tap9 = true;
        }
    }

    fn remove_jails(&self) -> Vec<String> {
        let jails: Vec<String> = self
            .run_lossy(Cmd::new("jls").arg("name"))
            .lines()
            .map(str::trim)
            .filter(|name| name.starts_with(&self.config.jail_tag))
            .map(String::from)
            .collect();

        for jail in &jails {
            self.run_lossy(Cmd::new("jail").args(["-r", jail]));
        }
        jails
    }

    fn pids(&self, pattern: &str) -> Vec<u32> {
        let cmd = match self.flavor {
            CleanupFlavor::Ifconfig => {
                let pattern = pattern.replace('/', "\\/");
                Cmd::sh(format!("ps ax | awk '/{pattern}/{{print $1}}'"))
            }
            CleanupFlavor::IpLink | CleanupFlavor::IfconfigPairs => {
                Cmd::new("pgrep").args(["-f", pattern])
            }
        };

        self.run_lossy(cmd).split_ascii_whitespace().filter_map(|pid| pid.parse().ok()).collect()
    }

    /// Kills processes matching `pattern` until none are left. Returns how many extra
    /// rounds that took.
    ///
    /// There is no upper bound: a process that cannot be killed keeps this looping.
    fn kill_procs(&self, pattern: &str) -> usize {
        let kill = || Cmd::new("pkill").args(["-9", "-f", pattern]);
        self.run_lossy(kill());

        let mut retries = 0;
        loop {
            let pids = self.pids(pattern);
            if pids.is_empty() {
                break;
            }

            tracing::debug!(pattern, ?pids, "processes still alive");
            self.run_lossy(kill());
            self.exec.sleep(self.config.poll_interval);
            retries += 1;
        }

        retries
    }
}

/// `nl:<id>` for every `dp<id>` in a process listing, each once.
fn kernel_datapaths(ps: &str) -> Vec<String> {
    let mut seen = FxHashSet::default();
    let mut datapaths = Vec::new();

    for (i, _) in ps.match_indices("dp") {
        let digits: String = ps[i + 2..].chars().take_while(char::is_ascii_digit).collect();
        if !digits.is_empty() && seen.insert(digits.clone()) {
            datapaths.push(format!("nl:{digits}"));
        }
    }

    datapaths
}

fn non_empty_lines(output: &str) -> Vec<String> {
    output.lines().map(str::trim).filter(|line| !line.is_empty()).map(String::from).collect()
}
