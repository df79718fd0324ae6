use std::collections::HashSet;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The most recently fetched, validated IP list together with its fetch
/// metadata. Replaced wholesale on every successful fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpListSnapshot {
    /// Validated entries in source order; duplicates are kept as-is.
    pub ips: Vec<String>,
    pub fetched_at: DateTime<Utc>,
    pub source_url: String,
    pub total_count: usize,
}

impl IpListSnapshot {
    pub fn new(ips: Vec<String>, source_url: impl Into<String>) -> Self {
        let total_count = ips.len();
        Self {
            ips,
            fetched_at: Utc::now(),
            source_url: source_url.into(),
            total_count,
        }
    }

    /// Count and set-membership equality; ordering is irrelevant for change
    /// detection.
    pub fn same_ips(&self, other: &IpListSnapshot) -> bool {
        if self.ips.len() != other.ips.len() {
            return false;
        }
        let ours: HashSet<&str> = self.ips.iter().map(String::as_str).collect();
        other.ips.iter().all(|ip| ours.contains(ip.as_str()))
    }
}

/// `true` for plain dotted-quad IPv4 or IPv4 CIDR with prefix 0-32. The
/// stdlib/ipnet parsers enforce the octet and prefix ranges.
pub fn is_valid_entry(line: &str) -> bool {
    if line.contains('/') {
        line.parse::<Ipv4Net>().is_ok()
    } else {
        line.parse::<Ipv4Addr>().is_ok()
    }
}

/// Line-by-line parse of the published list: whitespace trimmed, blank lines
/// and `#` comments skipped, malformed entries dropped without failing the
/// fetch.
pub fn parse_ip_list(body: &str) -> Vec<String> {
    let mut ips = Vec::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if is_valid_entry(line) {
            ips.push(line.to_string());
        } else {
            debug!(line, "dropping malformed ip list entry");
        }
    }
    ips
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ListDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: usize,
}

/// Set difference by exact string equality. With no prior snapshot the whole
/// new list counts as added.
pub fn diff(old: Option<&IpListSnapshot>, new: &IpListSnapshot) -> ListDiff {
    let Some(old) = old else {
        return ListDiff {
            added: new.ips.clone(),
            removed: Vec::new(),
            unchanged: 0,
        };
    };

    let old_set: HashSet<&str> = old.ips.iter().map(String::as_str).collect();
    let new_set: HashSet<&str> = new.ips.iter().map(String::as_str).collect();

    ListDiff {
        added: new
            .ips
            .iter()
            .filter(|ip| !old_set.contains(ip.as_str()))
            .cloned()
            .collect(),
        removed: old
            .ips
            .iter()
            .filter(|ip| !new_set.contains(ip.as_str()))
            .cloned()
            .collect(),
        unchanged: new
            .ips
            .iter()
            .filter(|ip| old_set.contains(ip.as_str()))
            .count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_body() {
        let body = "# comment\n10.0.0.0/8\n1.2.3.4\nbad-line\n";
        assert_eq!(parse_ip_list(body), vec!["10.0.0.0/8", "1.2.3.4"]);
    }

    #[test]
    fn validates_octet_and_prefix_ranges() {
        assert!(is_valid_entry("0.0.0.0/0"));
        assert!(is_valid_entry("255.255.255.255/32"));
        assert!(is_valid_entry("192.168.1.1"));

        assert!(!is_valid_entry("256.0.0.1"));
        assert!(!is_valid_entry("10.0.0.0/33"));
        assert!(!is_valid_entry("1.2.3"));
        assert!(!is_valid_entry("1.2.3.4.5"));
        assert!(!is_valid_entry("10.0.0.0/"));
        assert!(!is_valid_entry("zoom.us"));
    }

    #[test]
    fn tolerates_whitespace_and_crlf() {
        let body = "  3.7.35.0/25 \r\n\r\n\t#trailing comment\n13.52.6.128/25\r\n";
        assert_eq!(parse_ip_list(body), vec!["3.7.35.0/25", "13.52.6.128/25"]);
    }

    #[test]
    fn diff_without_prior_snapshot_is_all_added() {
        let new = IpListSnapshot::new(vec!["1.1.1.1".into(), "2.2.2.2".into()], "url");
        let d = diff(None, &new);
        assert_eq!(d.added, vec!["1.1.1.1", "2.2.2.2"]);
        assert!(d.removed.is_empty());
        assert_eq!(d.unchanged, 0);
    }

    #[test]
    fn diff_identical_snapshots_is_all_unchanged() {
        let snap = IpListSnapshot::new(vec!["1.1.1.1".into(), "2.2.2.2".into()], "url");
        let d = diff(Some(&snap), &snap);
        assert!(d.added.is_empty());
        assert!(d.removed.is_empty());
        assert_eq!(d.unchanged, 2);
    }

    #[test]
    fn diff_reports_added_and_removed() {
        let old = IpListSnapshot::new(vec!["1.1.1.1".into(), "2.2.2.2".into()], "url");
        let new = IpListSnapshot::new(vec!["2.2.2.2".into(), "3.3.3.3".into()], "url");
        let d = diff(Some(&old), &new);
        assert_eq!(d.added, vec!["3.3.3.3"]);
        assert_eq!(d.removed, vec!["1.1.1.1"]);
        assert_eq!(d.unchanged, 1);
    }

    #[test]
    fn same_ips_ignores_order() {
        let a = IpListSnapshot::new(vec!["1.1.1.1".into(), "2.2.2.2".into()], "url");
        let b = IpListSnapshot::new(vec!["2.2.2.2".into(), "1.1.1.1".into()], "url");
        let c = IpListSnapshot::new(vec!["1.1.1.1".into()], "url");
        assert!(a.same_ips(&b));
        assert!(!a.same_ips(&c));
    }
}
