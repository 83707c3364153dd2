use std::fmt;

use vnet_exec::{Cmd, Executor};

/// Closes terminal sessions left attached to nodes of earlier sessions.
pub trait ScreenCleaner: fmt::Debug + Send + Sync {
    /// Closes every stale session and returns their names.
    fn clean_up(&self, exec: &dyn Executor) -> Vec<String>;
}

/// `screen(1)` sessions named `<pid>.vnet.<node>`, e.g. `4242.vnet.h1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScreenSessions;

impl ScreenSessions {
    fn is_vnet_session(word: &str) -> bool {
        let mut parts = word.splitn(3, '.');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(pid), Some("vnet"), Some(node)) => {
                !pid.is_empty() && pid.bytes().all(|b| b.is_ascii_digit()) && !node.is_empty()
            }
            _ => false,
        }
    }
}

impl ScreenCleaner for ScreenSessions {
    fn clean_up(&self, exec: &dyn Executor) -> Vec<String> {
        // `screen -ls` exits non-zero whenever sessions exist, so the status is ignored.
        let listing = match exec.run(&Cmd::new("screen").arg("-ls")) {
            Ok(output) => output.stdout,
            Err(e) => {
                tracing::debug!(error = %e, "screen not available");
                return Vec::new();
            }
        };

        let sessions: Vec<String> = listing
            .split_ascii_whitespace()
            .filter(|word| Self::is_vnet_session(word))
            .map(String::from)
            .collect();

        for session in &sessions {
            let quit = Cmd::new("screen").args(["-S", session, "-X", "quit"]);
            if let Err(e) = exec.run(&quit) {
                tracing::debug!(%session, error = %e, "failed to quit screen session");
            }
        }

        sessions
    }
}

/// Leaves terminal sessions alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoScreens;

impl ScreenCleaner for NoScreens {
    fn clean_up(&self, _exec: &dyn Executor) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use vnet_exec::mock::{self, RecordingExecutor};

    use super::*;

    #[test]
    fn quits_vnet_sessions_only() {
        let exec = RecordingExecutor::new();
        let listing = "There are screens on:\n\t4242.vnet.h1\t(Detached)\n\t17.pts-0.host\t(Attached)\n\t99.vnet.s1\t(Detached)\n2 Sockets in /run/screen/S-root.\n";
        exec.respond("screen -ls", mock::output(1, listing, ""));

        let closed = ScreenSessions.clean_up(&exec);
        assert_eq!(closed, ["4242.vnet.h1", "99.vnet.s1"]);
        assert_eq!(
            exec.matching("-X quit"),
            ["screen -S 4242.vnet.h1 -X quit", "screen -S 99.vnet.s1 -X quit"]
        );
    }

    #[test]
    fn session_names() {
        assert!(ScreenSessions::is_vnet_session("1.vnet.h1"));
        assert!(!ScreenSessions::is_vnet_session("x1.vnet.h1"));
        assert!(!ScreenSessions::is_vnet_session("1.vnet."));
        assert!(!ScreenSessions::is_vnet_session("vnet.h1"));
    }
}
