use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ViewerConfig {
    pub version: u32,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub panels: PanelDefaults,
    #[serde(default)]
    pub fps: FpsConfig,
    #[serde(default)]
    pub picker: PickerConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            version: 1,
            window: WindowConfig::default(),
            panels: PanelDefaults::default(),
            fps: FpsConfig::default(),
            picker: PickerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
    /// sRGB in `0.0..=1.0`; converted to linear before clearing.
    pub clear_color: [f64; 3],
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "voxview".into(),
            clear_color: [0.50, 0.75, 0.86],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PanelDefaults {
    pub default_position: [i32; 2],
}

impl Default for PanelDefaults {
    fn default() -> Self {
        Self {
            default_position: [10, 10],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FpsConfig {
    pub enabled: bool,
    pub position: Option<[i32; 2]>,
    /// Height of one digit in pixels; widths follow from it.
    pub digit_height: u32,
    #[serde(deserialize_with = "deserialize_duration")]
    pub refresh: Duration,
    pub color: HexColor,
}

impl Default for FpsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            position: None,
            digit_height: 14,
            refresh: default_refresh(),
            color: HexColor([0xff, 0xff, 0xff]),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PickerConfig {
    pub enabled: bool,
    pub position: Option<[i32; 2]>,
    pub swatch_size: u32,
    pub columns: u32,
    pub blocks: Vec<BlockEntry>,
}

impl Default for PickerConfig {
    fn default() -> Self {
        let block = |name: &str, rgb: [u8; 3]| BlockEntry {
            name: name.into(),
            color: HexColor(rgb),
        };
        Self {
            enabled: true,
            position: Some([10, 40]),
            swatch_size: 24,
            columns: 4,
            blocks: vec![
                block("grass", [0x5f, 0x9f, 0x35]),
                block("dirt", [0x86, 0x60, 0x43]),
                block("stone", [0x80, 0x80, 0x80]),
                block("sand", [0xdb, 0xd3, 0xa0]),
                block("water", [0x3f, 0x76, 0xe4]),
                block("wood", [0x9c, 0x7f, 0x4e]),
                block("leaves", [0x3a, 0x7d, 0x22]),
                block("snow", [0xf0, 0xfb, 0xfb]),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BlockEntry {
    pub name: String,
    pub color: HexColor,
}

/// sRGB colour written as `#rrggbb` (or `rrggbb`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HexColor(pub [u8; 3]);

impl HexColor {
    pub fn rgba(self, alpha: u8) -> [u8; 4] {
        let [r, g, b] = self.0;
        [r, g, b, alpha]
    }
}

impl FromStr for HexColor {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if digits.len() != 6 || !digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(format!("invalid colour '{raw}'; expected '#rrggbb'"));
        }
        let channel = |at: usize| {
            u8::from_str_radix(&digits[at..at + 2], 16)
                .map_err(|err| format!("invalid colour '{raw}': {err}"))
        };
        Ok(Self([channel(0)?, channel(2)?, channel(4)?]))
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.0;
        write!(f, "#{r:02x}{g:02x}{b:02x}")
    }
}

impl<'de> Deserialize<'de> for HexColor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

impl Serialize for HexColor {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

fn default_refresh() -> Duration {
    Duration::from_millis(500)
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Duration::try_from_secs_f64(v).map_err(E::custom)
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl ViewerConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: ViewerConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    pub fn default_position(&self) -> (i32, i32) {
        let [x, y] = self.panels.default_position;
        (x, y)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size {}x{} must be non-zero",
                self.window.width, self.window.height
            )));
        }

        if self
            .window
            .clear_color
            .iter()
            .any(|channel| !(0.0..=1.0).contains(channel))
        {
            return Err(ConfigError::Invalid(
                "window.clear_color channels must be within 0.0..=1.0".into(),
            ));
        }

        if self.fps.digit_height < 5 {
            return Err(ConfigError::Invalid(
                "fps.digit_height must be at least 5 pixels".into(),
            ));
        }

        if self.fps.refresh.is_zero() {
            return Err(ConfigError::Invalid(
                "fps.refresh must be greater than zero".into(),
            ));
        }

        if self.picker.swatch_size == 0 {
            return Err(ConfigError::Invalid(
                "picker.swatch_size must be greater than zero".into(),
            ));
        }

        if self.picker.columns == 0 {
            return Err(ConfigError::Invalid(
                "picker.columns must be greater than zero".into(),
            ));
        }

        if self.picker.enabled && self.picker.blocks.is_empty() {
            return Err(ConfigError::Invalid(
                "picker must list at least one block when enabled".into(),
            ));
        }

        for block in &self.picker.blocks {
            if block.name.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "picker contains a block with an empty name".into(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
version = 1

[window]
width = 800
height = 600
title = "demo"
clear_color = [0.1, 0.2, 0.3]

[panels]
default_position = [4, 8]

[fps]
position = [700, 10]
digit_height = 20
refresh = "250ms"

[picker]
swatch_size = 16
columns = 2

[[picker.blocks]]
name = "stone"
color = "#808080"

[[picker.blocks]]
name = "lava"
color = "ff4500"
"##;

    #[test]
    fn parses_sample_config() {
        let config = ViewerConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.title, "demo");
        assert_eq!(config.default_position(), (4, 8));
        assert_eq!(config.fps.refresh, Duration::from_millis(250));
        assert_eq!(config.fps.position, Some([700, 10]));
        assert!(config.fps.enabled);
        assert_eq!(config.picker.blocks.len(), 2);
        assert_eq!(config.picker.blocks[1].color, HexColor([0xff, 0x45, 0x00]));
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = ViewerConfig::from_toml_str("version = 1").unwrap();
        assert_eq!(config.window.clear_color, [0.50, 0.75, 0.86]);
        assert_eq!(config.default_position(), (10, 10));
        assert_eq!(config.fps.refresh, Duration::from_millis(500));
        assert_eq!(config.picker.blocks.len(), 8);
    }

    #[test]
    fn numeric_refresh_is_seconds() {
        let config = ViewerConfig::from_toml_str("version = 1\n[fps]\nrefresh = 2\n").unwrap();
        assert_eq!(config.fps.refresh, Duration::from_secs(2));
    }

    #[test]
    fn unrepresentable_refresh_is_a_parse_error() {
        for value in ["inf", "1e300", "nan", "-1.5"] {
            let input = format!("version = 1\n[fps]\nrefresh = {value}\n");
            let err = ViewerConfig::from_toml_str(&input).unwrap_err();
            assert!(matches!(err, ConfigError::Parse(_)), "{value}: {err}");
        }
    }

    #[test]
    fn rejects_unknown_version() {
        let err = ViewerConfig::from_toml_str("version = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_bad_colour() {
        let err = ViewerConfig::from_toml_str(
            "version = 1\n[[picker.blocks]]\nname = \"x\"\ncolor = \"#12345\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_zero_refresh_and_empty_picker() {
        let err = ViewerConfig::from_toml_str("version = 1\n[fps]\nrefresh = \"0s\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = ViewerConfig::from_toml_str("version = 1\n[picker]\nblocks = []\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn hex_colour_round_trips_through_display() {
        let colour: HexColor = "#0A0b0C".parse().unwrap();
        assert_eq!(colour.to_string(), "#0a0b0c");
        assert_eq!(colour.rgba(7), [10, 11, 12, 7]);
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voxview.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = ViewerConfig::load(&path).unwrap();
        assert_eq!(config.window.height, 600);

        let missing = ViewerConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
