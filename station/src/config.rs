use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use wriplecore::PipelineConfig;

/// Station-level settings: the full pipeline tree plus the HTTP bridge
/// bind parameters.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    pub pipeline: PipelineConfig,
    pub bridge: BridgeConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl StationConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading station config {}", path_ref.display()))?;
        let config: StationConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing station config {}", path_ref.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_carry_a_valid_pipeline() {
        let cfg = StationConfig::default();
        assert!(cfg.pipeline.validate().is_ok());
        assert_eq!(cfg.bridge.port, 8080);
    }

    #[test]
    fn config_load_reads_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"bridge:\n  port: 9100\npipeline:\n  network:\n    ap_ssid: TestRig\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = StationConfig::load(&path).unwrap();
        assert_eq!(cfg.bridge.port, 9100);
        assert_eq!(cfg.pipeline.network.ap_ssid, "TestRig");
        // Omitted fields keep their defaults.
        assert_eq!(cfg.pipeline.network.request_port, 5001);
    }

    #[test]
    fn missing_file_reports_the_path() {
        let err = StationConfig::load("does/not/exist.yaml").unwrap_err();
        assert!(err.to_string().contains("does/not/exist.yaml"));
    }
}
