//
// config.rs
//
// Server configuration, parsed from the client's LSP settings.
//

/// Tunables for the scan pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Trailing-edge debounce for edit-triggered scans, per document.
    pub debounce_ms: u64,
    /// Upper bound on cascade revalidation rounds for one trigger. Guards
    /// against oscillating redefinitions (two documents swapping an id).
    pub max_cascade_iterations: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            max_cascade_iterations: 100,
        }
    }
}

/// Parse the top-level `bilink` section from LSP settings. Absent fields
/// keep their defaults; returns `None` if the section is missing.
pub fn parse_config(settings: &serde_json::Value) -> Option<Config> {
    let section = settings.get("bilink")?;

    let mut config = Config::default();
    if let Some(v) = section.get("debounceMs").and_then(|v| v.as_u64()) {
        config.debounce_ms = v;
    }
    if let Some(v) = section.get("maxCascadeIterations").and_then(|v| v.as_u64()) {
        config.max_cascade_iterations = v as usize;
    }

    log::info!("Configuration loaded from LSP settings:");
    log::info!("  debounce_ms: {}", config.debounce_ms);
    log::info!("  max_cascade_iterations: {}", config.max_cascade_iterations);

    Some(config)
}
