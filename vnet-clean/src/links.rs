//! Finding vnet interfaces in listings and deleting them in batches.

use rustc_hash::FxHashSet;
use vnet_exec::Cmd;

const ETH: &str = "-eth";

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// Interface names of the form `<node>-eth<port>` anywhere in `listing`, each once, in
/// the order they first appear.
///
/// A name is the longest run of `[-_.[:alnum:]]` characters that ends in `-eth` followed
/// by digits, so `h1-eth0@if3:` yields `h1-eth0`.
pub fn vnet_intfs(listing: &str) -> Vec<String> {
    let mut seen = FxHashSet::default();
    listing
        .split(|c: char| !is_name_char(c))
        .filter_map(longest_match)
        .filter(|name| seen.insert(name.to_string()))
        .map(String::from)
        .collect()
}

fn longest_match(word: &str) -> Option<&str> {
    let mut end = None;
    for (i, _) in word.match_indices(ETH).filter(|(i, _)| *i > 0) {
        let digits = word[i + ETH.len()..].bytes().take_while(u8::is_ascii_digit).count();
        if digits > 0 {
            end = Some(i + ETH.len() + digits);
        }
    }
    end.map(|end| &word[..end])
}

/// Interface names at the start of `ifconfig` header lines, e.g. `pair3` from
/// `pair3: flags=8843<UP,BROADCAST,RUNNING,SIMPLEX,MULTICAST> rdomain 1 mtu 1500`.
pub fn ifconfig_names(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter_map(|line| line.split_once(':').map(|(name, _)| name))
        .filter(|name| is_unit_name(name))
        .map(String::from)
        .collect()
}

/// `[a-z]+[0-9]+`.
fn is_unit_name(name: &str) -> bool {
    let digits = name.bytes().rev().take_while(u8::is_ascii_digit).count();
    let letters = &name[..name.len() - digits];
    digits > 0 && !letters.is_empty() && letters.bytes().all(|b| b.is_ascii_lowercase())
}

/// One shell invocation per `chunk` names, each deleting its names with `delete` and
/// discarding errors: `( ip link del a;ip link del b ) 2> /dev/null`.
pub fn batched<F>(names: &[String], chunk: usize, delete: F) -> Vec<Cmd>
where
    F: Fn(&str) -> String,
{
    names
        .chunks(chunk.max(1))
        .map(|chunk| {
            let script = chunk.iter().map(|name| delete(name)).collect::<Vec<_>>().join(";");
            Cmd::sh(format!("( {script} ) 2> /dev/null"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_names_in_ip_link_output() {
        let listing = "\
1: lo: <LOOPBACK,UP,LOWER_UP> mtu 65536 qdisc noqueue state UNKNOWN
    link/loopback 00:00:00:00:00:00 brd 00:00:00:00:00:00
5: h1-eth0@if4: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc noqueue
6: s1-eth1@h1-eth0: <BROADCAST,MULTICAST> mtu 1500
7: my_sw.2-eth12: <BROADCAST> mtu 1500
8: eth0: <BROADCAST> mtu 1500
9: -eth3: <BROADCAST> mtu 1500
10: s1-ethx: <BROADCAST> mtu 1500
";
        assert_eq!(vnet_intfs(listing), ["h1-eth0", "s1-eth1", "my_sw.2-eth12"]);
    }

    #[test]
    fn longest_match_wins() {
        assert_eq!(longest_match("s1-eth1-eth2"), Some("s1-eth1-eth2"));
        assert_eq!(longest_match("s1-eth1-ethx"), Some("s1-eth1"));
        assert_eq!(longest_match("eth0"), None);
    }

    #[test]
    fn ifconfig_headers() {
        let listing = "\
pair0: flags=8843<UP,BROADCAST,RUNNING,SIMPLEX,MULTICAST> rdomain 1 mtu 1500
\tlladdr fe:e1:ba:d0:aa:01
\tpatch: pair1
pair1: flags=8843<UP,BROADCAST,RUNNING,SIMPLEX,MULTICAST> rdomain 2 mtu 1500
";
        assert_eq!(ifconfig_names(listing), ["pair0", "pair1"]);
    }

    #[test]
    fn batches_respect_the_chunk_size() {
        let names: Vec<String> = (0..5).map(|i| format!("h{i}-eth0")).collect();
        let cmds = batched(&names, 2, |name| format!("ip link del {name}"));

        assert_eq!(cmds.len(), 3);
        assert_eq!(
            cmds[0].to_string(),
            "sh -c ( ip link del h0-eth0;ip link del h1-eth0 ) 2> /dev/null"
        );
        assert_eq!(cmds[2].to_string(), "sh -c ( ip link del h4-eth0 ) 2> /dev/null");
        assert!(batched(&[], 2, |name| name.to_string()).is_empty());
    }
}
