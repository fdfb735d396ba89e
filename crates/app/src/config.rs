//! Settings file location and command-line overrides.

use anyhow::{Context, Result};
use shared::settings::AppSettings;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub fn config_path() -> Option<PathBuf> {
    if let Some(proj) = directories::ProjectDirs::from("com", "EcoIuris", "EcoIurisCli") {
        let p = proj.config_dir().join("settings.json");
        let _ = fs::create_dir_all(proj.config_dir());
        Some(p)
    } else {
        None
    }
}

/// Load settings from `path`, or the default config location. A missing
/// file yields defaults; an explicit path that can't be parsed is an error.
pub fn load_settings(path: Option<&Path>) -> Result<AppSettings> {
    if let Some(path) = path {
        let bytes =
            fs::read(path).with_context(|| format!("reading settings {}", path.display()))?;
        return serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing settings {}", path.display()));
    }
    Ok(load_settings_or_default())
}

fn load_settings_or_default() -> AppSettings {
    if let Some(path) = config_path() {
        if path.exists() {
            match fs::read(&path).map(|bytes| serde_json::from_slice::<AppSettings>(&bytes)) {
                Ok(Ok(settings)) => {
                    debug!(path = %path.display(), "loaded settings");
                    return settings;
                }
                Ok(Err(e)) => warn!(path = %path.display(), error = %e, "invalid settings, using defaults"),
                Err(e) => warn!(path = %path.display(), error = %e, "unreadable settings, using defaults"),
            }
        }
    }
    AppSettings::default()
}

/// Values given on the command line win over the settings file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub persona: Option<String>,
    pub model: Option<String>,
    pub export_dir: Option<PathBuf>,
}

impl Overrides {
    pub fn apply(self, settings: &mut AppSettings) {
        if let Some(persona) = self.persona {
            settings.default_persona = persona;
        }
        if let Some(model) = self.model {
            settings.gemini_model = model;
        }
        if let Some(dir) = self.export_dir {
            settings.export_dir = Some(dir.display().to_string());
        }
    }
}

/// Directory transcripts are written to.
pub fn export_dir(settings: &AppSettings) -> PathBuf {
    settings
        .export_dir
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"default_persona":"eco_law","gemini_auth":{"api_key":"k"}}"#,
        )
        .unwrap();

        let s = load_settings(Some(&path)).unwrap();
        assert_eq!(s.default_persona, "eco_law");
        assert_eq!(s.gemini_auth.api_key.as_deref(), Some("k"));
        assert_eq!(s.gemini_model, "gemini-2.5-flash");
    }

    #[test]
    fn test_explicit_path_errors_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(load_settings(Some(&missing)).is_err());

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{not json").unwrap();
        let err = load_settings(Some(&broken)).unwrap_err();
        assert!(format!("{:#}", err).contains("parsing settings"));
    }

    #[test]
    fn test_overrides_win() {
        let mut s = AppSettings::default();
        Overrides {
            persona: Some("contracts".into()),
            model: Some("gemini-2.5-pro".into()),
            export_dir: Some(PathBuf::from("/tmp/out")),
        }
        .apply(&mut s);
        assert_eq!(s.default_persona, "contracts");
        assert_eq!(s.gemini_model, "gemini-2.5-pro");
        assert_eq!(export_dir(&s), PathBuf::from("/tmp/out"));

        let mut untouched = AppSettings::default();
        Overrides::default().apply(&mut untouched);
        assert_eq!(untouched.default_persona, "legal_pro");
        assert_eq!(export_dir(&untouched), PathBuf::from("."));
    }
}
