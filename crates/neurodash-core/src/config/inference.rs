use serde::{Deserialize, Serialize};

/// Batch settings forwarded to the model suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InferenceOptions {
    /// Documents per model call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Worker processes the model runtime may use
    #[serde(default = "default_n_processes")]
    pub n_processes: usize,
}

fn default_batch_size() -> usize {
    128
}

fn default_n_processes() -> usize {
    1
}

impl Default for InferenceOptions {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            n_processes: default_n_processes(),
        }
    }
}
