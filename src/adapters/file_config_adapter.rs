//! INI file configuration adapter.
//!
//! Keys are case-sensitive and only `=` separates a key from its value, so
//! instrument keys such as `BTC/USDT:USDT` survive intact.

use crate::domain::error::SigtraderError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::{Ini, IniDefault};
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    fn ini() -> Ini {
        let mut defaults = IniDefault::default();
        defaults.case_sensitive = true;
        defaults.delimiters = vec!['='];
        Ini::new_from_defaults(defaults)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SigtraderError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, &path.display().to_string())
    }

    pub fn from_string(content: &str) -> Result<Self, SigtraderError> {
        Self::parse(content, "<string>")
    }

    fn parse(content: &str, file: &str) -> Result<Self, SigtraderError> {
        let mut config = Self::ini();
        config
            .read(content.to_string())
            .map_err(|reason| SigtraderError::ConfigParse {
                file: file.to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }

    fn has_section(&self, section: &str) -> bool {
        self.config.get_map_ref().contains_key(section)
    }

    fn keys(&self, section: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .config
            .get_map_ref()
            .get(section)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn from_string_parses_config() {
        let content = r#"
[strategy]
name = EMA Cross
entry = CROSS_ABOVE(fast, slow)

[features]
fast = EMA(close, 12)
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("strategy", "name"),
            Some("EMA Cross".to_string())
        );
        assert_eq!(
            adapter.get_string("strategy", "entry"),
            Some("CROSS_ABOVE(fast, slow)".to_string())
        );
        assert_eq!(
            adapter.get_string("features", "fast"),
            Some("EMA(close, 12)".to_string())
        );
    }

    #[test]
    fn instrument_keys_keep_case_and_colons() {
        let adapter = FileConfigAdapter::from_string(
            "[leverage]\ndefault = 3\nBTC/USDT:USDT = 5\nETH/USDT:USDT = 4\n",
        )
        .unwrap();
        assert_eq!(adapter.get_double("leverage", "BTC/USDT:USDT", 0.0), 5.0);
        assert_eq!(
            adapter.keys("leverage"),
            vec!["BTC/USDT:USDT", "ETH/USDT:USDT", "default"]
        );
        assert!(adapter.has_section("leverage"));
        assert!(!adapter.has_section("roi"));
        assert!(adapter.keys("roi").is_empty());
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[strategy]\nname = x\n").unwrap();
        assert_eq!(adapter.get_string("strategy", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn get_int_returns_value_or_default() {
        let adapter =
            FileConfigAdapter::from_string("[strategy]\nmax_open_trades = 5\nbad = abc\n")
                .unwrap();
        assert_eq!(adapter.get_int("strategy", "max_open_trades", 0), 5);
        assert_eq!(adapter.get_int("strategy", "missing", 42), 42);
        assert_eq!(adapter.get_int("strategy", "bad", 42), 42);
    }

    #[test]
    fn get_double_returns_value_or_default() {
        let adapter =
            FileConfigAdapter::from_string("[exit]\ntake_profit = 0.12\nstop_loss = nope\n")
                .unwrap();
        assert_eq!(adapter.get_double("exit", "take_profit", 0.0), 0.12);
        assert_eq!(adapter.get_double("exit", "stop_loss", -0.5), -0.5);
        assert_eq!(adapter.get_double("exit", "missing", 99.9), 99.9);
    }

    #[test]
    fn get_bool_values() {
        let adapter = FileConfigAdapter::from_string(
            "[trailing]\na = true\nb = yes\nc = 1\nd = false\ne = no\nf = 0\n",
        )
        .unwrap();
        assert!(adapter.get_bool("trailing", "a", false));
        assert!(adapter.get_bool("trailing", "b", false));
        assert!(adapter.get_bool("trailing", "c", false));
        assert!(!adapter.get_bool("trailing", "d", true));
        assert!(!adapter.get_bool("trailing", "e", true));
        assert!(!adapter.get_bool("trailing", "f", true));
        assert!(adapter.get_bool("trailing", "missing", true));
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[buffer]\nsize = 9\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(adapter.get_int("buffer", "size", 0), 9);
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(matches!(result, Err(SigtraderError::Io(_))));
    }
}
