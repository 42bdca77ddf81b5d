use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::constants::constants;

/// Environment override for the upstream base URL.
pub const API_BASE_ENV: &str = "DRAMABOX_API_BASE";

pub fn project_dirs() -> Option<ProjectDirs> {
  ProjectDirs::from("", "", "drama")
}

#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct Config {
  pub api_base: Option<String>,
  pub lang: Option<String>,
  pub fit_mode: Option<String>,
  pub last_location: Option<String>,
}

/// First non-blank candidate wins.
fn first_set<'a>(candidates: impl IntoIterator<Item = Option<&'a str>>) -> Option<&'a str> {
  candidates.into_iter().flatten().map(str::trim).find(|s| !s.is_empty())
}

impl Config {
  pub fn load() -> Self {
    if let Some(proj_dirs) = project_dirs() {
      let config_file = proj_dirs.config_dir().join("prefs.toml");
      if let Ok(content) = std::fs::read_to_string(config_file)
        && let Ok(config) = toml::from_str(&content)
      {
        return config;
      }
    }
    Self::default()
  }

  pub fn save(&self) {
    if let Some(proj_dirs) = project_dirs() {
      let config_dir = proj_dirs.config_dir();
      if std::fs::create_dir_all(config_dir).is_ok() {
        let config_file = config_dir.join("prefs.toml");
        if let Ok(content) = toml::to_string(self) {
          let _ = std::fs::write(config_file, content);
        }
      }
    }
  }

  /// Base URL: command line, then `DRAMABOX_API_BASE`, then the config file,
  /// then the compiled default.
  pub fn api_base(&self, cli: Option<&str>) -> String {
    let env = std::env::var(API_BASE_ENV).ok();
    self.resolve_api_base(cli, env.as_deref())
  }

  fn resolve_api_base(&self, cli: Option<&str>, env: Option<&str>) -> String {
    first_set([cli, env, self.api_base.as_deref()]).unwrap_or(&constants().default_api_base).to_string()
  }

  pub fn lang(&self, cli: Option<&str>) -> String {
    first_set([cli, self.lang.as_deref()]).unwrap_or(&constants().default_lang).to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn with_base(base: &str) -> Config {
    Config { api_base: Some(base.to_string()), ..Config::default() }
  }

  #[test]
  fn api_base_precedence() {
    let cfg = with_base("https://from-config");
    assert_eq!(cfg.resolve_api_base(Some("https://from-cli"), Some("https://from-env")), "https://from-cli");
    assert_eq!(cfg.resolve_api_base(None, Some("https://from-env")), "https://from-env");
    assert_eq!(cfg.resolve_api_base(None, None), "https://from-config");
    assert_eq!(Config::default().resolve_api_base(None, None), "https://sapi.dramabox.be");
  }

  #[test]
  fn blank_overrides_are_ignored() {
    let cfg = with_base("https://from-config");
    assert_eq!(cfg.resolve_api_base(Some("  "), Some("")), "https://from-config");
  }

  #[test]
  fn lang_defaults() {
    assert_eq!(Config::default().lang(None), "in");
    let cfg = Config { lang: Some("en".into()), ..Config::default() };
    assert_eq!(cfg.lang(None), "en");
    assert_eq!(cfg.lang(Some("zh")), "zh");
  }

  #[test]
  fn toml_round_trip_tolerates_missing_fields() {
    let cfg: Config = toml::from_str("fit_mode = \"contain\"").unwrap();
    assert_eq!(cfg.fit_mode.as_deref(), Some("contain"));
    assert_eq!(cfg.api_base, None);

    let cfg = Config { last_location: Some("/watch?bookId=1&index=2&source=search_result".into()), ..cfg };
    let parsed: Config = toml::from_str(&toml::to_string(&cfg).unwrap()).unwrap();
    assert_eq!(parsed, cfg);
  }
}
