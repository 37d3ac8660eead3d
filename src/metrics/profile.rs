//! Which properties to collect for which device model.

use crate::error::{ExporterError, Result};
use crate::miot::resolver::NamedPath;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The description paths collected for one device model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelProfile {
    pub model: String,
    /// Description paths, each labeled by its segments joined with `/`
    pub paths: Vec<Vec<String>>,
}

impl ModelProfile {
    pub fn new<M, P, S>(model: M, paths: impl IntoIterator<Item = P>) -> Self
    where
        M: Into<String>,
        P: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            model: model.into(),
            paths: paths
                .into_iter()
                .map(|path| path.into_iter().map(Into::into).collect())
                .collect(),
        }
    }

    /// The configured paths as labeled paths, in configured order.
    pub fn named_paths(&self) -> Vec<NamedPath> {
        self.paths
            .iter()
            .map(|segments| NamedPath::from_segments(segments.iter().cloned()))
            .collect()
    }
}

/// An ordered set of model profiles. Collection follows this order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSet {
    #[serde(rename = "model", default)]
    pub models: Vec<ModelProfile>,
}

impl ProfileSet {
    /// Profiles for the devices supported out of the box.
    pub fn builtin() -> Self {
        Self {
            models: vec![
                ModelProfile::new(
                    "zhimi.airpurifier.ma4",
                    [
                        vec!["Air Purifier", "Switch Status"],
                        vec!["Air Purifier", "Mode"],
                        vec!["Environment", "Temperature"],
                        vec!["Environment", "Relative Humidity"],
                        vec!["Environment", "PM2.5 Density"],
                        vec!["Environment", "Relative Humidity"],
                        vec!["Filter", "Filter Life Level"],
                        vec!["Filter", "Filter Used Time"],
                        vec!["aqi", "average-aqi"],
                    ],
                ),
                ModelProfile::new(
                    "zhimi.airpurifier.m1",
                    [
                        vec!["Air Purifier", "Switch Status"],
                        vec!["Air Purifier", "Mode"],
                        vec!["Environment", "Indoor Temperature"],
                        vec!["Environment", "Relative Humidity"],
                        vec!["Environment", "PM2.5 Density"],
                        vec!["Filter", "Filter Life Level"],
                        vec!["Filter", "Filter Used Time"],
                    ],
                ),
                ModelProfile::new(
                    "isa.magnet.dw2hl",
                    [
                        vec!["Magnet Sensor", "Illumination"],
                        vec!["Magnet Sensor", "Contact State"],
                        vec!["Battery", "Battery Level"],
                    ],
                ),
                ModelProfile::new(
                    "chuangmi.camera.v2",
                    [vec!["Camera Control", "Switch Status"]],
                ),
                ModelProfile::new(
                    "chuangmi.plug.m1",
                    [
                        vec!["Switch", "Switch Status"],
                        vec!["Switch", "Temperature"],
                    ],
                ),
                ModelProfile::new(
                    "cgllc.motion.cgpr1",
                    [
                        vec!["Motion Sensor", "Illumination"],
                        vec!["Motion Sensor", "No Motion Duration"],
                        vec!["Battery", "Battery Level"],
                    ],
                ),
                ModelProfile::new(
                    "lumi.sensor_ht.v1",
                    [
                        vec!["Temperature Humidity Sensor", "Temperature"],
                        vec!["Temperature Humidity Sensor", "Relative Humidity"],
                    ],
                ),
            ],
        }
    }

    /// Parse profiles from TOML `[[model]]` tables.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let set: Self = toml::from_str(text)
            .map_err(|err| ExporterError::config_error(format!("Invalid profiles: {}", err)))?;
        set.validate()?;
        Ok(set)
    }

    /// Load profiles from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            ExporterError::config_error(format!("Cannot read {}: {}", path.display(), err))
        })?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<()> {
        for profile in &self.models {
            if profile.model.trim().is_empty() {
                return Err(ExporterError::config_error("Profile with empty model name"));
            }
            if let Some(empty) = profile.paths.iter().position(|path| path.is_empty()) {
                return Err(ExporterError::config_error(format!(
                    "Profile `{}` has an empty path at position {}",
                    profile.model, empty
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, model: &str) -> Option<&ModelProfile> {
        self.models.iter().find(|profile| profile.model == model)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl Default for ProfileSet {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles_order() {
        let set = ProfileSet::builtin();
        let models: Vec<&str> = set.models.iter().map(|p| p.model.as_str()).collect();
        assert_eq!(
            models,
            [
                "zhimi.airpurifier.ma4",
                "zhimi.airpurifier.m1",
                "isa.magnet.dw2hl",
                "chuangmi.camera.v2",
                "chuangmi.plug.m1",
                "cgllc.motion.cgpr1",
                "lumi.sensor_ht.v1",
            ]
        );
    }

    #[test]
    fn test_named_paths_labels() {
        let set = ProfileSet::builtin();
        let plug = set.get("chuangmi.plug.m1").unwrap();
        let labels: Vec<String> = plug.named_paths().into_iter().map(|p| p.label).collect();
        assert_eq!(labels, ["Switch/Switch Status", "Switch/Temperature"]);
    }

    #[test]
    fn test_parse_toml_profiles() {
        let set = ProfileSet::from_toml_str(
            r#"
            [[model]]
            model = "zhimi.airpurifier.ma4"
            paths = [["Air Purifier", "Switch Status"], ["Environment", "Temperature"]]

            [[model]]
            model = "lumi.sensor_ht.v1"
            paths = [["Temperature Humidity Sensor", "Temperature"]]
            "#,
        )
        .unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.models[0].paths[1], ["Environment", "Temperature"]);
        assert!(set.get("lumi.sensor_ht.v1").is_some());
    }

    #[test]
    fn test_reject_empty_path() {
        let err = ProfileSet::from_toml_str(
            r#"
            [[model]]
            model = "m"
            paths = [[]]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("empty path"));
    }

    #[test]
    fn test_reject_invalid_toml() {
        assert!(ProfileSet::from_toml_str("model = 3").is_err());
    }
}
