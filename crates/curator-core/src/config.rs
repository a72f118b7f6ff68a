use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{CuratorError, Result};

/// Root configuration, loaded from `~/.config/curator/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CuratorConfig {
    pub container: ContainerConfig,
    pub backup: BackupConfig,
    pub audit: AuditConfig,
    pub policy: PolicyConfig,
}

/// Where the record array and the display count live inside the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Variable name of the array literal, e.g. `const initiatives = [`.
    pub array_name: String,
    /// Regex with a named `count` group. Empty disables count tracking.
    pub count_pattern: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub enabled: bool,
    pub extension: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    /// Appended to the catalog file name: `index.html.audit.jsonl`.
    pub extension: String,
}

/// Classification policy. Everything except the exact-signature tier is
/// tunable here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Skip the near-duplicate tier.
    pub exact_only: bool,
    pub near_duplicate: NearDuplicateConfig,
    pub normalization: NormalizationConfig,
    /// Extra theme vocabulary: theme name -> keywords.
    pub themes: BTreeMap<String, Vec<String>>,
    /// Theme name -> maximum surviving records. Empty means no caps.
    pub thematic_caps: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NearDuplicateConfig {
    /// Title similarity that alone makes two records duplicates.
    pub title_threshold: f64,
    /// Lower title similarity accepted when descriptions also agree.
    pub paired_title_threshold: f64,
    pub paired_description_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    pub leading_fillers: Vec<String>,
    pub trailing_suffixes: Vec<String>,
}

// ─── Defaults ──────────────────────────────────────────────

pub const DEFAULT_COUNT_PATTERN: &str = r#"id="totalCount"[^>]*>\s*(?P<count>\d+)"#;

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            array_name: "initiatives".to_string(),
            count_pattern: DEFAULT_COUNT_PATTERN.to_string(),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            extension: "bak".to_string(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            extension: "audit.jsonl".to_string(),
        }
    }
}

impl Default for NearDuplicateConfig {
    fn default() -> Self {
        Self {
            title_threshold: 0.90,
            paired_title_threshold: 0.70,
            paired_description_threshold: 0.80,
        }
    }
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        let to_strings =
            |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
        Self {
            leading_fillers: to_strings(&[
                "to",
                "platform to",
                "app to",
                "initiative to",
                "create",
                "provide",
                "support",
                "distribute",
                "sponsor",
                "fund",
                "organize",
                "build",
                "install",
                "set up",
                "establish",
            ]),
            trailing_suffixes: to_strings(&[
                "platform",
                "app",
                "initiative",
                "program",
                "system",
                "network",
                "bank",
                "support",
                "hub",
                "tracker",
                "fund",
                "leaderboard",
            ]),
        }
    }
}

// ─── Validation ────────────────────────────────────────────

impl PolicyConfig {
    pub fn validate(&self) -> Result<()> {
        let near = &self.near_duplicate;
        for (name, value) in [
            ("title_threshold", near.title_threshold),
            ("paired_title_threshold", near.paired_title_threshold),
            (
                "paired_description_threshold",
                near.paired_description_threshold,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(CuratorError::Config(format!(
                    "{name} must be within 0.0..=1.0, got {value}"
                )));
            }
        }

        for (theme, keywords) in &self.themes {
            if keywords.iter().all(|k| k.trim().is_empty()) {
                return Err(CuratorError::Config(format!(
                    "theme `{theme}` has no keywords"
                )));
            }
        }
        Ok(())
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl CuratorConfig {
    /// Standard config file path: `~/.config/curator/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("CURATOR_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("curator")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if file doesn't exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.policy.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }
}

// ─── Derived paths ─────────────────────────────────────────

impl BackupConfig {
    /// Sibling backup path, e.g. `index.html.20240131T120000.bak`.
    pub fn backup_path(&self, target: &Path, at: NaiveDateTime) -> PathBuf {
        let stamp = at.format("%Y%m%dT%H%M%S");
        sibling_with_suffix(target, &format!("{stamp}.{}", self.extension))
    }
}

impl AuditConfig {
    pub fn log_path(&self, target: &Path) -> PathBuf {
        sibling_with_suffix(target, &self.extension)
    }
}

fn sibling_with_suffix(target: &Path, suffix: &str) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "catalog".to_string());
    target.with_file_name(format!("{name}.{suffix}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    #[test]
    fn test_default_policy_is_conservative() {
        let cfg = CuratorConfig::default();
        assert!(!cfg.policy.exact_only);
        assert!(cfg.policy.thematic_caps.is_empty());
        assert_eq!(cfg.policy.near_duplicate.title_threshold, 0.90);
        assert_eq!(cfg.container.array_name, "initiatives");
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut cfg = CuratorConfig::default();
        cfg.policy.thematic_caps.insert("bicycle".into(), 2);
        cfg.save_to(&path).unwrap();

        let loaded = CuratorConfig::load_from(&path).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[policy]\nexact_only = true\n[policy.thematic_caps]\nwater = 3\n",
        )
        .unwrap();

        let loaded = CuratorConfig::load_from(&path).unwrap();
        assert!(loaded.policy.exact_only);
        assert_eq!(loaded.policy.thematic_caps.get("water"), Some(&3));
        assert_eq!(loaded.policy.near_duplicate.paired_title_threshold, 0.70);
        assert!(loaded.backup.enabled);
    }

    #[test]
    fn test_out_of_range_threshold_is_rejected() {
        let mut policy = PolicyConfig::default();
        policy.near_duplicate.title_threshold = 1.5;
        assert!(matches!(policy.validate(), Err(CuratorError::Config(_))));
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let cfg =
            CuratorConfig::load_from(Path::new("/tmp/nonexistent_curator_config.toml")).unwrap();
        assert_eq!(cfg, CuratorConfig::default());
    }

    #[test]
    fn test_derived_paths() {
        let cfg = CuratorConfig::default();
        let target = Path::new("/site/index.html");
        let at = NaiveDate::from_ymd_opt(2024, 1, 31)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();

        assert_eq!(
            cfg.backup.backup_path(target, at),
            PathBuf::from("/site/index.html.20240131T120000.bak")
        );
        assert_eq!(
            cfg.audit.log_path(target),
            PathBuf::from("/site/index.html.audit.jsonl")
        );
    }
}
