//! In-memory IP reputation store.
//!
//! Three independent checks are OR-combined by [`IpFilter::has_ip`]:
//!
//! 1. a manual list, replaced wholesale from a comma-separated string;
//! 2. an abuse list of CIDR ranges, embedded at build time;
//! 3. a Tor exit-node list of single addresses, embedded at build time.
//!
//! The preset lists are loaded once; the two toggles only flip a flag, so
//! turning a list on or off never touches the underlying data.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use parking_lot::RwLock;
use tracing::{debug, warn};

const ABUSIVE_IPS_PRESET: &str = include_str!("../presets/abusive_ips.txt");
const TOR_EXIT_NODES_PRESET: &str = include_str!("../presets/tor_exit_nodes.txt");

/// Sorted, non-overlapping CIDR ranges with binary-search containment.
#[derive(Debug, Default)]
pub struct PrefixSet {
    v4: Vec<Ipv4Net>,
    v6: Vec<Ipv6Net>,
}

impl PrefixSet {
    pub fn from_prefixes(prefixes: Vec<IpNet>) -> Self {
        let mut set = PrefixSet::default();
        for net in IpNet::aggregate(&prefixes) {
            match net {
                IpNet::V4(n) => set.v4.push(n),
                IpNet::V6(n) => set.v6.push(n),
            }
        }
        set.v4.sort_by_key(|n| n.network());
        set.v6.sort_by_key(|n| n.network());
        set
    }

    pub fn len(&self) -> usize {
        self.v4.len() + self.v6.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        match ip.to_canonical() {
            IpAddr::V4(addr) => contains_v4(&self.v4, addr),
            IpAddr::V6(addr) => contains_v6(&self.v6, addr),
        }
    }
}

// Aggregated ranges are disjoint, so only the last range starting at or
// before the address can contain it.
fn contains_v4(nets: &[Ipv4Net], addr: Ipv4Addr) -> bool {
    let idx = nets.partition_point(|n| n.network() <= addr);
    idx > 0 && nets[idx - 1].contains(&addr)
}

fn contains_v6(nets: &[Ipv6Net], addr: Ipv6Addr) -> bool {
    let idx = nets.partition_point(|n| n.network() <= addr);
    idx > 0 && nets[idx - 1].contains(&addr)
}

#[derive(Debug, Default)]
struct FilterState {
    manual: HashSet<IpAddr>,
    tor_exit_nodes: HashSet<IpAddr>,
    abusive: PrefixSet,
    block_abusive_ips: bool,
    block_tor_exit_nodes: bool,
}

/// Shared reputation filter. Reads take the read lock; reloads and toggles
/// take the write lock.
#[derive(Debug, Default)]
pub struct IpFilter {
    state: RwLock<FilterState>,
}

impl IpFilter {
    /// Build a filter with the embedded abuse and Tor presets loaded and both
    /// toggles off.
    pub fn with_presets() -> Self {
        Self::from_lists(ABUSIVE_IPS_PRESET, TOR_EXIT_NODES_PRESET)
    }

    /// Build a filter from newline-delimited lists. Blank lines and lines
    /// starting with `#` are skipped; malformed lines are logged and skipped.
    pub fn from_lists(abusive_cidrs: &str, tor_exit_nodes: &str) -> Self {
        let abusive: Vec<IpNet> = preset_lines(abusive_cidrs)
            .filter_map(|line| match line.parse::<IpNet>() {
                Ok(net) => Some(net.trunc()),
                Err(e) => {
                    warn!(line, error = %e, "Skipping malformed abusive ip prefix");
                    None
                }
            })
            .collect();
        let abusive = PrefixSet::from_prefixes(abusive);
        debug!(count = abusive.len(), "Loaded abusive ip prefixes from presets");

        let tor: HashSet<IpAddr> = preset_lines(tor_exit_nodes)
            .filter_map(|line| match line.parse::<IpAddr>() {
                Ok(addr) => Some(addr.to_canonical()),
                Err(e) => {
                    warn!(line, error = %e, "Skipping malformed tor exit node");
                    None
                }
            })
            .collect();
        debug!(count = tor.len(), "Loaded tor exit nodes from presets");

        Self {
            state: RwLock::new(FilterState {
                abusive,
                tor_exit_nodes: tor,
                ..FilterState::default()
            }),
        }
    }

    /// Replace the manual list. Invalid entries are skipped; an empty string
    /// clears the list. Returns the number of addresses now in the list.
    pub fn load_from_comma_separated(&self, ips: &str) -> usize {
        let manual: HashSet<IpAddr> = ips
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse::<IpAddr>().ok())
            .map(|addr| addr.to_canonical())
            .collect();
        let count = manual.len();
        self.state.write().manual = manual;
        count
    }

    pub fn set_block_abusive_ips(&self, block: bool) {
        self.state.write().block_abusive_ips = block;
    }

    pub fn set_block_tor_exit_nodes(&self, block: bool) {
        self.state.write().block_tor_exit_nodes = block;
    }

    pub fn has_ip(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        let state = self.state.read();

        if state.manual.contains(&ip) {
            return true;
        }
        if state.block_abusive_ips && state.abusive.contains(ip) {
            return true;
        }
        state.block_tor_exit_nodes && state.tor_exit_nodes.contains(&ip)
    }
}

fn preset_lines(data: &str) -> impl Iterator<Item = &str> {
    data.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}
