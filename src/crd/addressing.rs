//! Deterministic address and name allocation for pods and links

/// Linux interface names are capped at 15 bytes
const MAX_INTERFACE_NAME: usize = 15;

/// Largest node count the addressing scheme keeps collision-free. `link_uid` packs the
/// higher index into 12 bits; `vxlan_ip` and `global_ip` allow more.
pub const MAX_NODES: usize = 1 << 12;

/// Stable identifier of the undirected edge `(from, to)`, `from < to`, both below [`MAX_NODES`].
pub fn link_uid(from: usize, to: usize) -> i64 {
    ((from as i64) << 12) + to as i64
}

/// Address of `my` on its point-to-point link with `peer`.
///
/// Both ends of a link share one /30: the lower index takes host `.1`, the higher takes `.2`.
/// The top bit of the first octet is always set. Supports up to 2^14 nodes.
pub fn vxlan_ip(my: usize, peer: usize) -> String {
    let (uid, host) = if my < peer {
        ((((my as u64) << 15) + peer as u64) << 2, 0x01)
    } else {
        ((((peer as u64) << 15) + my as u64) << 2, 0x02)
    };
    format!(
        "{}.{}.{}.{}/30",
        (uid >> 24) & 0xff | 0x80,
        (uid >> 16) & 0xff,
        (uid >> 8) & 0xff,
        uid & 0xff | host
    )
}

/// Cluster-wide address of node `idx`.
pub fn global_ip(idx: usize) -> String {
    format!("10.233.{}.{}", (idx >> 8) & 0xff, idx & 0xff)
}

/// Interface name for the link towards `peer_uuid`.
pub fn link_name(peer_uuid: &str) -> String {
    if peer_uuid.len() <= MAX_INTERFACE_NAME {
        return peer_uuid.to_string();
    }
    let mut end = MAX_INTERFACE_NAME;
    while !peer_uuid.is_char_boundary(end) {
        end -= 1;
    }
    peer_uuid[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vxlan_pair_shares_prefix() {
        let a = vxlan_ip(3, 7);
        let b = vxlan_ip(7, 3);
        assert_ne!(a, b);
        assert_eq!(a, vxlan_ip(3, 7));

        let prefix = |ip: &str| ip.rsplit_once('.').map(|(p, _)| p.to_string());
        assert_eq!(prefix(&a), prefix(&b));
        assert_eq!(a, "128.6.0.29/30");
        assert_eq!(b, "128.6.0.30/30");
    }

    #[test]
    fn test_vxlan_known_value() {
        // uid = ((1 << 15) + 2) << 2 = 131080 = 0x00020008
        assert_eq!(vxlan_ip(1, 2), "128.2.0.9/30");
        assert_eq!(vxlan_ip(2, 1), "128.2.0.10/30");
    }

    #[test]
    fn test_global_ip() {
        assert_eq!(global_ip(0), "10.233.0.0");
        assert_eq!(global_ip(258), "10.233.1.2");
    }

    #[test]
    fn test_link_uids_unique_below_max_nodes() {
        let last = MAX_NODES - 1;
        let mut seen = std::collections::HashSet::new();
        for from in [0, 1, 2, last - 1] {
            let targets: std::collections::BTreeSet<usize> =
                (from + 1..MAX_NODES).step_by(97).chain([last]).collect();
            for to in targets {
                assert!(seen.insert(link_uid(from, to)), "uid collision at ({}, {})", from, to);
            }
        }
        // past the bound the packing aliases
        assert_eq!(link_uid(0, MAX_NODES + 5), link_uid(1, 5));
    }

    #[test]
    fn test_link_uid_and_name() {
        assert_eq!(link_uid(1, 2), 4098);
        assert_eq!(link_name("0123456789abcdefXYZ"), "0123456789abcde");
        assert_eq!(link_name("short"), "short");
    }
}
