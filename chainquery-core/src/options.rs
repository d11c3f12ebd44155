use chainquery_types::Network;
use std::path::PathBuf;

const DEFAULT_WORKER_LANES: usize = 8;
const MIN_WORKER_LANES: usize = 1;
const MAX_WORKER_LANES: usize = 32;

/// Construction options for `ChainQuery::open`. An explicit struct rather
/// than a string-keyed builder, matching spec.md §6 "Construction options".
#[derive(Debug, Clone)]
pub struct Options {
    /// The node's data directory (the parent of `blocks/` and `indexes/`).
    pub path: PathBuf,
    /// Attempt to open `indexes/txindex/`. If the directory is missing or
    /// fails to open, a warning is logged and tx-index operations are
    /// disabled rather than failing construction.
    pub tx_index: bool,
    /// Overrides network inference from `path`'s directory suffix. `None`
    /// defers to `Network::infer_from_datadir`.
    pub network: Option<Network>,
    /// Width of the connected iterator's pre-decode worker pool (spec.md §9
    /// "Parallel pre-decode"). Clamped to `[1, 32]`.
    pub worker_lanes: usize,
}

impl Options {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tx_index: true,
            network: None,
            worker_lanes: DEFAULT_WORKER_LANES,
        }
    }

    pub fn with_tx_index(mut self, enabled: bool) -> Self {
        self.tx_index = enabled;
        self
    }

    pub fn with_network(mut self, network: Network) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_worker_lanes(mut self, lanes: usize) -> Self {
        self.worker_lanes = lanes;
        self
    }

    pub(crate) fn resolved_network(&self) -> Network {
        self.network
            .unwrap_or_else(|| Network::infer_from_datadir(&self.path))
    }

    pub(crate) fn resolved_worker_lanes(&self) -> usize {
        self.worker_lanes.clamp(MIN_WORKER_LANES, MAX_WORKER_LANES)
    }
}
