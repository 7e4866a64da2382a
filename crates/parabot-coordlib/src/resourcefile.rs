//! Resource file parsing (spec §4.4): a config-style file with sections
//! as value-set names and fields as `key=value`; the reserved `tags`
//! field becomes a list. Missing or unreadable file means zero value
//! sets — operations that require them then fail loudly rather than
//! silently degrading.

use configparser::ini::Ini;
use std::collections::HashMap;
use std::path::Path;

const TAGS_KEY: &str = "tags";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueSet {
    pub tags: Vec<String>,
    pub fields: HashMap<String, String>,
}

/// Parses `path` into named value sets. Any read/parse failure yields an
/// empty map and is logged, per spec §4.4.
pub fn load_value_sets(path: &Path) -> HashMap<String, ValueSet> {
    let mut ini = Ini::new_cs();
    let parsed = match ini.load(path) {
        Ok(map) => map,
        Err(e) => {
            tracing::warn!("could not read resource file {}: {}", path.display(), e);
            return HashMap::new();
        }
    };

    let mut sets = HashMap::new();
    for (section, fields) in parsed {
        let mut value_set = ValueSet::default();
        for (key, value) in fields {
            let Some(value) = value else { continue };
            if key == TAGS_KEY {
                value_set.tags = value.split(',').map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect();
            } else {
                value_set.fields.insert(key, value);
            }
        }
        sets.insert(section, value_set);
    }
    sets
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_sections_and_tags() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[staging]\nhost=stg.example.com\nuser=bot\ntags=env,ci\n").unwrap();
        writeln!(f, "[prod]\nhost=prod.example.com\n").unwrap();
        let sets = load_value_sets(f.path());
        assert_eq!(sets.len(), 2);
        let staging = &sets["staging"];
        assert_eq!(staging.tags, vec!["env", "ci"]);
        assert_eq!(staging.fields.get("host"), Some(&"stg.example.com".to_string()));
        assert!(sets["prod"].tags.is_empty());
    }

    #[test]
    fn missing_file_yields_no_value_sets() {
        let sets = load_value_sets(Path::new("/nonexistent/resource.cfg"));
        assert!(sets.is_empty());
    }
}
