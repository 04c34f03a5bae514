use camino::Utf8PathBuf;

/// Command-line overrides applied on top of file and environment values.
///
/// Every field is optional; `None` leaves the lower-precedence value alone.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    /// Explicit config file (skips discovery)
    pub config_path: Option<Utf8PathBuf>,
    pub llm_provider: Option<String>,
    pub model: Option<String>,
    pub output_dir: Option<String>,
    pub platform: Option<String>,
    pub pipeline: Option<String>,
    pub stage_timeout_secs: Option<u64>,
    pub qa_max_iterations: Option<u32>,
    pub screenshot_enabled: Option<bool>,
    pub screenshot_timeout_secs: Option<u64>,
}
