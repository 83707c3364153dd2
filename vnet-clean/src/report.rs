use std::fmt;

/// What a cleanup run found and removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Terminal sessions closed.
    pub screens: Vec<String>,
    /// Kernel datapaths deleted, as `nl:<id>`.
    pub datapaths: Vec<String>,
    /// Switch bridges found by the first pass.
    pub bridges: Vec<String>,
    /// Switch bridges still listed after the first pass, deleted one by one.
    pub bridges_second_pass: Vec<String>,
    /// Interfaces deleted: `<node>-eth<port>` names, or `pair(4)` units.
    pub links: Vec<String>,
    /// Per-domain loopbacks deleted.
    pub loopbacks: Vec<String>,
    /// Whether a `tap9` interface was deleted.
    pub tap9: bool,
    /// Node jails removed.
    pub jails: Vec<String>,
    /// Kill rounds repeated because matching processes were still alive.
    pub kill_retries: usize,
    /// Callbacks run.
    pub callbacks: usize,
}

impl CleanupReport {
    /// Whether the run found nothing to remove. Callbacks run regardless and are not
    /// counted.
    pub fn is_clean(&self) -> bool {
        self.screens.is_empty()
            && self.datapaths.is_empty()
            && self.bridges.is_empty()
            && self.bridges_second_pass.is_empty()
            && self.links.is_empty()
            && self.loopbacks.is_empty()
            && !self.tap9
            && self.jails.is_empty()
            && self.kill_retries == 0
    }
}

impl fmt::Display for CleanupReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} screens, {} datapaths, {} bridges, {} links, {} loopbacks, {} jails",
            self.screens.len(),
            self.datapaths.len(),
            self.bridges.len() + self.bridges_second_pass.len(),
            self.links.len() + usize::from(self.tap9),
            self.loopbacks.len(),
            self.jails.len(),
        )
    }
}
