//! Regional crisis resource lookup.
//!
//! A static, config-backed table mapping locales to hotlines. Not part
//! of the hard core: the engine only needs `resources_for` to attach
//! suggestions to escalations and scripted safety replies.

use sherpa_config::ResourcesConfig;
use sherpa_core::escalation::Hotline;
use std::collections::HashMap;

/// Locale → hotline lookup with a default-locale fallback.
pub struct RegionalResources {
    default_locale: String,
    regions: HashMap<String, Vec<Hotline>>,
}

impl RegionalResources {
    /// Build the lookup table from configuration.
    pub fn from_config(config: &ResourcesConfig) -> Self {
        let regions = config
            .regions
            .iter()
            .map(|(locale, entries)| {
                (
                    locale.clone(),
                    entries
                        .iter()
                        .map(|e| Hotline {
                            name: e.name.clone(),
                            contact: e.contact.clone(),
                        })
                        .collect(),
                )
            })
            .collect();

        Self {
            default_locale: config.default_locale.clone(),
            regions,
        }
    }

    /// Hotlines for a locale: exact match, then the default locale,
    /// then empty.
    pub fn resources_for(&self, locale: &str) -> &[Hotline] {
        self.regions
            .get(locale)
            .or_else(|| self.regions.get(&self.default_locale))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resources() -> RegionalResources {
        RegionalResources::from_config(&ResourcesConfig::default())
    }

    #[test]
    fn exact_locale_match() {
        let r = resources();
        let hotlines = r.resources_for("en-GB");
        assert!(hotlines.iter().any(|h| h.name.contains("Samaritans")));
    }

    #[test]
    fn unknown_locale_falls_back_to_default() {
        let r = resources();
        let hotlines = r.resources_for("fr-FR");
        assert!(!hotlines.is_empty());
        assert!(hotlines.iter().any(|h| h.contact.contains("988")));
    }

    #[test]
    fn default_locale_has_resources() {
        let r = resources();
        assert!(!r.resources_for("en-US").is_empty());
    }
}
