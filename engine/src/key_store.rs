use std::{
    collections::BTreeMap,
    fmt,
    fs,
    path::PathBuf,
};

use color_eyre::{
    Result,
    eyre::{WrapErr as _, eyre},
};
use log::{debug, info};

use crate::error::GenerationError;

const GEMINI_KEY_SLOT: &str = "gemini_api_key";

/// A provider credential. Never printed in full.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl AsRef<str>) -> Result<Self, GenerationError> {
        let key = key.as_ref().trim();
        if key.is_empty() {
            return Err(GenerationError::Credential("The API key must not be empty.".into()));
        }
        Ok(Self(key.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// `••••••••` followed by the last four characters
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
        format!("••••••••{tail}")
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ApiKey").field(&self.masked()).finish()
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

/// Local key-value file holding the user's credential
#[derive(Debug, Clone)]
pub struct KeyStore {
    path: PathBuf,
}

impl KeyStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(dirs::config_local_dir()
            .ok_or(eyre!("Couldn't get config dir"))?
            .join("mesinpintar")
            .join("keys.ron"))
    }

    pub fn load(&self) -> Result<Option<ApiKey>> {
        let slots = self.read_slots()?;
        match slots.get(GEMINI_KEY_SLOT) {
            Some(key) => Ok(Some(ApiKey::new(key)?)),
            None => Ok(None),
        }
    }

    pub fn save(&self, key: &ApiKey) -> Result<()> {
        let mut slots = self.read_slots()?;
        slots.insert(GEMINI_KEY_SLOT.into(), key.expose().into());
        self.write_slots(&slots)?;
        info!("stored API key {key}");
        Ok(())
    }

    /// Removes the stored key. Missing files are fine.
    pub fn clear(&self) -> Result<()> {
        let mut slots = self.read_slots()?;
        if slots.remove(GEMINI_KEY_SLOT).is_some() {
            self.write_slots(&slots)?;
            info!("removed stored API key");
        }
        Ok(())
    }

    fn read_slots(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            debug!("no key store at {}", self.path.display());
            return Ok(BTreeMap::new());
        }
        let src = fs::read_to_string(&self.path)
            .wrap_err_with(|| format!("reading {}", self.path.display()))?;
        ron::from_str(&src).wrap_err("parsing key store")
    }

    fn write_slots(&self, slots: &BTreeMap<String, String>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.path, ron::to_string(slots)?)
            .wrap_err_with(|| format!("writing {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_trimmed_and_masked() {
        let key = ApiKey::new("  AIzaSyExample1234 \n").unwrap();
        assert_eq!(key.expose(), "AIzaSyExample1234");
        assert_eq!(key.to_string(), "••••••••1234");
        assert_eq!(format!("{key:?}"), r#"ApiKey("••••••••1234")"#);
        assert_eq!(ApiKey::new("ab").unwrap().masked(), "••••••••ab");
    }

    #[test]
    fn empty_key_is_a_credential_error() {
        assert!(matches!(
            ApiKey::new("   "),
            Err(GenerationError::Credential(_))
        ));
    }

    #[test]
    fn save_load_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::at(dir.path().join("nested").join("keys.ron"));

        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();

        let key = ApiKey::new("secret-key-9876").unwrap();
        store.save(&key).unwrap();
        assert_eq!(store.load().unwrap(), Some(key));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }
}
