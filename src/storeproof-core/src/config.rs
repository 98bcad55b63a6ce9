//! Configuration for the verification core.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for storeproof's server-side components.
#[derive(Debug, Clone)]
pub struct StoreproofConfig {
    /// Bundle id a signed App Store payload must carry.
    pub bundle_id: String,
    /// Package name used in Play status queries.
    pub package_name: String,
    /// Base URL of the Play publisher API.
    pub play_endpoint: String,
    /// Accept sandbox-environment App Store payloads (test builds only).
    pub accept_sandbox: bool,
    /// Timeout for server-to-server verification calls.
    pub timeout: Duration,
    /// Directory of the file-backed entitlement store, if persistence is on.
    pub ledger_dir: Option<PathBuf>,
    /// Path of the JSONL transaction journal, if persistence is on.
    pub journal_path: Option<PathBuf>,
}

impl Default for StoreproofConfig {
    fn default() -> Self {
        Self {
            bundle_id: "com.storeproof.reader".into(),
            package_name: "com.storeproof.reader".into(),
            play_endpoint: "https://androidpublisher.googleapis.com".into(),
            accept_sandbox: false,
            timeout: Duration::from_secs(10),
            ledger_dir: None,
            journal_path: None,
        }
    }
}
