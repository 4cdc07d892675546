use serde::{Deserialize, Serialize};

/// JSON override for the identifier alias table. Omitted keys keep the built-in aliases.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct RulesConfig {
    pub field_aliases: Option<Vec<String>>,
    pub value_aliases: Option<Vec<String>>,
    pub identifier_targets: Option<Vec<String>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum HeaderRole {
    Field,
    Value,
}

#[derive(Clone, Debug, Serialize)]
pub struct AliasRule {
    pub role: HeaderRole,
    pub aliases: Vec<String>,
}

/// Header aliases mapped to their role, plus the normalised field values that name a sample.
#[derive(Clone, Debug, Serialize)]
pub struct MatchRules {
    pub headers: Vec<AliasRule>,
    pub targets: Vec<String>,
}

impl Default for MatchRules {
    fn default() -> Self {
        let own = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        MatchRules {
            headers: vec![
                AliasRule { role: HeaderRole::Field, aliases: own(&["field", "parameter", "name"]) },
                AliasRule { role: HeaderRole::Value, aliases: own(&["value", "result", "data"]) },
            ],
            targets: own(&["sample id", "sampleid"]),
        }
    }
}

impl MatchRules {
    pub fn from_config(cfg: &RulesConfig) -> Self {
        let mut rules = MatchRules::default();
        for rule in rules.headers.iter_mut() {
            let custom = match rule.role { HeaderRole::Field => &cfg.field_aliases, HeaderRole::Value => &cfg.value_aliases };
            if let Some(list) = custom && !list.is_empty() { rule.aliases = list.iter().map(|a| normalize_header(a)).collect(); }
        }
        if let Some(list) = &cfg.identifier_targets && !list.is_empty() {
            rules.targets = list.iter().map(|t| crate::identify::normalize_field(t)).collect();
        }
        rules
    }

    /// Role of a column header, compared case- and whitespace-insensitively.
    pub fn role_of(&self, header: &str) -> Option<HeaderRole> {
        let h = normalize_header(header);
        self.headers.iter().find(|r| r.aliases.iter().any(|a| *a == h)).map(|r| r.role)
    }

    /// `normalized` must already have gone through `identify::normalize_field`.
    pub fn is_target(&self, normalized: &str) -> bool { self.targets.iter().any(|t| t == normalized) }
}

pub fn normalize_header(s: &str) -> String { s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase() }

/// Reads the alias rule file. An explicit path that fails is a warning; a missing default file is silent.
pub fn load_rules(path_opt: Option<&str>) -> Option<RulesConfig> {
    let explicit = path_opt.map(|s| s.to_string()).or_else(|| std::env::var("CDRDASH_RULES_PATH").ok());
    let p = std::path::PathBuf::from(explicit.clone().unwrap_or_else(|| "rules.json".to_string()));
    let data = match std::fs::read(&p) {
        Ok(d) => d,
        Err(e) => {
            if explicit.is_some() { log::warn!("Failed to read rules file {}: {}", p.to_string_lossy(), e); }
            return None;
        }
    };
    let cfg: RulesConfig = match serde_json::from_slice(&data) { Ok(c) => c, Err(e) => { log::warn!("Failed to parse rules file {}: {}", p.to_string_lossy(), e); return None } };
    log::debug!("Loaded alias rules from {}", p.to_string_lossy());
    Some(cfg)
}

#[cfg(test)]
mod tests_rules {
    use super::*;

    #[test]
    fn default_roles() {
        let r = MatchRules::default();
        assert_eq!(r.role_of("Field"), Some(HeaderRole::Field));
        assert_eq!(r.role_of("  PARAMETER "), Some(HeaderRole::Field));
        assert_eq!(r.role_of("Result"), Some(HeaderRole::Value));
        assert_eq!(r.role_of("Analyte"), None);
        assert!(r.is_target("sampleid"));
    }

    #[test]
    fn json_override_replaces_only_given_keys() {
        let cfg: RulesConfig = serde_json::from_str(r#"{ "value_aliases": ["Reading"], "identifier_targets": ["Lab_Ref:"] }"#).unwrap();
        let r = MatchRules::from_config(&cfg);
        assert_eq!(r.role_of("reading"), Some(HeaderRole::Value));
        assert_eq!(r.role_of("value"), None);
        assert_eq!(r.role_of("name"), Some(HeaderRole::Field));
        assert!(r.is_target("lab ref"));
        assert!(!r.is_target("sample id"));
    }

    #[test]
    fn load_rules_reads_file_and_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("rules.json");
        std::fs::write(&good, r#"{ "field_aliases": ["Item"] }"#).unwrap();
        let cfg = load_rules(Some(good.to_str().unwrap())).unwrap();
        assert_eq!(cfg.field_aliases, Some(vec!["Item".to_string()]));
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        assert!(load_rules(Some(bad.to_str().unwrap())).is_none());
        assert!(load_rules(Some(dir.path().join("missing.json").to_str().unwrap())).is_none());
    }
}
