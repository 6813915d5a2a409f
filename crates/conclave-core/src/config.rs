//! Compiler configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Break topological-sort ties by relation name so generated code is
    /// reproducible.
    pub deterministic: bool,

    /// Run `OpDag::validate` after every specialization `rules::optimize`
    /// performs.
    pub verify_rewrites: bool,

    /// Allow the optimizer to substitute `HybridJoin` for eligible joins.
    pub hybrid_joins: bool,

    /// Allow the optimizer to substitute `RevealJoin` for eligible joins.
    pub reveal_joins: bool,

    /// Column name appended by `index` when the caller gives none.
    pub default_index_col: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            deterministic: true,
            verify_rewrites: true,
            hybrid_joins: true,
            reveal_joins: true,
            default_index_col: "index".to_string(),
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let s = std::env::var(name).ok()?;
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl CompilerConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `CONCLAVE_DETERMINISTIC`: deterministic topological order
    /// - `CONCLAVE_VERIFY_REWRITES`: validate the graph after each optimizer rewrite
    /// - `CONCLAVE_HYBRID_JOINS`: enable hybrid join specialization
    /// - `CONCLAVE_REVEAL_JOINS`: enable reveal join specialization
    /// - `CONCLAVE_DEFAULT_INDEX_COL`: default index column name
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_flag("CONCLAVE_DETERMINISTIC") {
            cfg.deterministic = v;
        }

        if let Some(v) = env_flag("CONCLAVE_VERIFY_REWRITES") {
            cfg.verify_rewrites = v;
        }

        if let Some(v) = env_flag("CONCLAVE_HYBRID_JOINS") {
            cfg.hybrid_joins = v;
        }

        if let Some(v) = env_flag("CONCLAVE_REVEAL_JOINS") {
            cfg.reveal_joins = v;
        }

        if let Ok(s) = std::env::var("CONCLAVE_DEFAULT_INDEX_COL") {
            if !s.trim().is_empty() {
                cfg.default_index_col = s;
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_index_col.trim().is_empty() {
            return Err(Error::Config("default_index_col must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_deterministic_and_verified() {
        let cfg = CompilerConfig::default();
        assert!(cfg.deterministic);
        assert!(cfg.verify_rewrites);
        assert_eq!(cfg.default_index_col, "index");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: CompilerConfig = serde_json::from_str(r#"{"hybrid_joins": false}"#).unwrap();
        assert!(!cfg.hybrid_joins);
        assert!(cfg.reveal_joins);
        assert!(cfg.deterministic);
    }

    // Only test touching CONCLAVE_* so parallel tests never race on them.
    #[test]
    fn env_overrides_and_unparsable_fallback() {
        let vars = [
            ("CONCLAVE_DETERMINISTIC", "off"),
            ("CONCLAVE_VERIFY_REWRITES", "maybe"),
            ("CONCLAVE_HYBRID_JOINS", " FALSE "),
            ("CONCLAVE_REVEAL_JOINS", "1"),
            ("CONCLAVE_DEFAULT_INDEX_COL", "row_id"),
        ];
        for (k, v) in vars {
            std::env::set_var(k, v);
        }
        let cfg = CompilerConfig::from_env();
        assert!(!cfg.deterministic);
        assert!(cfg.verify_rewrites);
        assert!(!cfg.hybrid_joins);
        assert!(cfg.reveal_joins);
        assert_eq!(cfg.default_index_col, "row_id");

        std::env::set_var("CONCLAVE_DEFAULT_INDEX_COL", "  ");
        assert_eq!(CompilerConfig::from_env().default_index_col, "index");

        for (k, _) in vars {
            std::env::remove_var(k);
        }
        assert_eq!(CompilerConfig::from_env(), CompilerConfig::default());
    }

    #[test]
    fn empty_index_column_is_rejected() {
        let cfg = CompilerConfig {
            default_index_col: " ".into(),
            ..CompilerConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }
}
