use std::path::Path;

use ini::Ini;
use log::debug;

use crate::errs::DebarcerError;

/// The parsed contents of an INI config file, section by section. Every
/// field is optional: a config file may set only the handful of keys that
/// differ from the CLI defaults, and `resolve_threshold`/`resolve_path`
/// fill in the rest from whatever the subcommand was invoked with.
#[derive(Debug, Default, Clone)]
pub struct Config {
    ini: Ini,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, DebarcerError> {
        let ini = Ini::load_from_file(path).map_err(|e| {
            DebarcerError::input(format!("failed to parse config file {}: {e}", path.display()))
        })?;
        Ok(Self { ini })
    }

    fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.ini.get_from(Some(section), key)
    }

    pub fn bam_file(&self) -> Option<&str> {
        self.get("PATHS", "bam_file")
    }

    pub fn reference_file(&self) -> Option<&str> {
        self.get("PATHS", "reference_file")
    }

    pub fn prep_file(&self) -> Option<&str> {
        self.get("PATHS", "prep_file")
    }

    pub fn umi_family_pos_threshold(&self) -> Option<u32> {
        self.parse("SETTINGS", "umi_family_pos_threshold")
    }

    pub fn umi_edit_distance_threshold(&self) -> Option<u32> {
        self.parse("SETTINGS", "umi_edit_distance_threshold")
    }

    pub fn percent_consensus_threshold(&self) -> Option<f64> {
        self.parse("SETTINGS", "percent_consensus_threshold")
    }

    pub fn count_consensus_threshold(&self) -> Option<u32> {
        self.parse("SETTINGS", "count_consensus_threshold")
    }

    pub fn min_family_sizes(&self) -> Option<Vec<u32>> {
        self.get("SETTINGS", "min_family_sizes").map(|raw| {
            raw.split(',')
                .filter_map(|x| x.trim().parse::<u32>().ok())
                .collect()
        })
    }

    pub fn percent_ref_threshold(&self) -> Option<f64> {
        self.parse("REPORT", "percent_ref_threshold")
    }

    pub fn percent_alt_threshold(&self) -> Option<f64> {
        self.parse("REPORT", "percent_alt_threshold")
    }

    pub fn filter_threshold(&self) -> Option<u32> {
        self.parse("REPORT", "filter_threshold")
    }

    fn parse<T: std::str::FromStr>(&self, section: &str, key: &str) -> Option<T> {
        self.get(section, key).and_then(|raw| match raw.parse::<T>() {
            Ok(v) => Some(v),
            Err(_) => {
                debug!("config key [{section}] {key} = {raw:?} could not be parsed, ignoring");
                None
            }
        })
    }
}

/// Resolves a threshold value that can come from either the config file or
/// a CLI flag. The config file wins when both are present: this matches the
/// observed behavior of the original implementation, where a value present
/// in the config file always overrides whatever was passed on the command
/// line, rather than the more common "CLI overrides file" convention.
pub fn resolve_threshold<T: Clone>(from_config: Option<T>, from_cli: Option<T>) -> Option<T> {
    from_config.or(from_cli)
}

/// Like `resolve_threshold` but for required values: fails with an
/// `InputValidation` error naming the option if neither source supplies it.
pub fn require_threshold<T: Clone>(
    from_config: Option<T>,
    from_cli: Option<T>,
    option_name: &str,
) -> Result<T, DebarcerError> {
    resolve_threshold(from_config, from_cli)
        .ok_or_else(|| DebarcerError::input(format!("missing required option {option_name} (set via config file or CLI flag)")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn config_file_value_wins_over_cli() {
        let file = write_config(
            "[SETTINGS]\numi_family_pos_threshold = 10\n",
        );
        let config = Config::from_file(file.path()).unwrap();
        let resolved = resolve_threshold(config.umi_family_pos_threshold(), Some(99));
        assert_eq!(resolved, Some(10));
    }

    #[test]
    fn cli_value_used_when_config_silent() {
        let file = write_config("[SETTINGS]\n");
        let config = Config::from_file(file.path()).unwrap();
        let resolved = resolve_threshold(config.umi_family_pos_threshold(), Some(99));
        assert_eq!(resolved, Some(99));
    }

    #[test]
    fn min_family_sizes_parses_comma_list() {
        let file = write_config("[SETTINGS]\nmin_family_sizes = 0, 1, 2, 5, 10, 20\n");
        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(
            config.min_family_sizes(),
            Some(vec![0, 1, 2, 5, 10, 20])
        );
    }

    #[test]
    fn require_threshold_errors_when_unset() {
        let result: Result<u32, _> = require_threshold(None, None, "--famsize");
        assert!(result.is_err());
    }
}
