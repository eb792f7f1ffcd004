//! Core-count probing and clamping.

use tracing::warn;

/// What the host offers versus what mining will actually use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceInventory {
    pub logical_cores: usize,
    pub usable_cores: usize,
}

/// Resolve a requested worker count against the host. Zero means all
/// logical cores; requests beyond the host are clamped down.
pub fn probe(requested: usize) -> ResourceInventory {
    let logical_cores = num_cpus::get();
    let usable_cores = match requested {
        0 => logical_cores,
        n if n > logical_cores => {
            warn!(
                requested = n,
                available = logical_cores,
                "requested more cores than the host offers; clamping"
            );
            logical_cores
        }
        n => n,
    };

    ResourceInventory {
        logical_cores,
        usable_cores: usable_cores.max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_means_all_cores() {
        let inv = probe(0);
        assert_eq!(inv.usable_cores, inv.logical_cores);
        assert!(inv.usable_cores >= 1);
    }

    #[test]
    fn test_explicit_request_within_bounds() {
        let inv = probe(1);
        assert_eq!(inv.usable_cores, 1);
    }

    #[test]
    fn test_oversized_request_is_clamped() {
        let inv = probe(usize::MAX);
        assert_eq!(inv.usable_cores, inv.logical_cores);
    }
}
