use crate::config::ViewerConfigOverrides;
use anyhow::{anyhow, bail, Context, Result};
use std::env;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOverrides {
    width: Option<u32>,
    height: Option<u32>,
    vsync: Option<bool>,
    model: Option<String>,
    environment: Option<String>,
}

impl CliOverrides {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args())
    }

    pub fn parse<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = CliOverrides::default();
        let mut iter = args.into_iter();
        let _ = iter.next(); // skip program name if present
        while let Some(raw_flag) = iter.next() {
            let flag = raw_flag.as_ref();
            if !flag.starts_with("--") {
                bail!("Unexpected argument '{flag}'. Use --width/--height/--vsync/--model/--environment with values.");
            }
            let key = &flag[2..];
            let value =
                iter.next().ok_or_else(|| anyhow!("Expected a value after '{flag}'"))?.as_ref().to_string();
            match key {
                "width" => {
                    overrides.width =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid width '{value}'"))?);
                }
                "height" => {
                    overrides.height =
                        Some(value.parse::<u32>().with_context(|| format!("Invalid height '{value}'"))?);
                }
                "vsync" => {
                    overrides.vsync = Some(parse_bool_flag("vsync", &value)?);
                }
                "model" => {
                    overrides.model = Some(value);
                }
                "environment" => {
                    overrides.environment = Some(value);
                }
                _ => bail!(
                    "Unknown flag '{flag}'. Supported flags: --width, --height, --vsync, --model, --environment."
                ),
            }
        }
        Ok(overrides)
    }

    pub fn into_config_overrides(self) -> ViewerConfigOverrides {
        ViewerConfigOverrides {
            width: self.width,
            height: self.height,
            vsync: self.vsync,
            model: self.model,
            environment: self.environment,
        }
    }
}

fn parse_bool_flag(flag: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => bail!("Invalid {flag} value '{other}'. Use on/off or true/false."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_window_flags_and_asset_paths() {
        let args =
            ["vitrine", "--width", "1600", "--height", "900", "--vsync", "off", "--model", "lamp.glb"];
        let overrides = CliOverrides::parse(args).expect("parse overrides");
        assert_eq!(overrides.width, Some(1600));
        assert_eq!(overrides.height, Some(900));
        assert_eq!(overrides.vsync, Some(false));
        assert_eq!(overrides.model.as_deref(), Some("lamp.glb"));
        assert_eq!(overrides.environment, None);
    }

    #[test]
    fn latest_flag_wins() {
        let args = ["vitrine", "--environment", "a.hdr", "--environment", "b.hdr"];
        let overrides = CliOverrides::parse(args).expect("parse overrides");
        assert_eq!(overrides.environment.as_deref(), Some("b.hdr"));
    }

    #[test]
    fn missing_value_errors() {
        let err = CliOverrides::parse(["vitrine", "--model"]).unwrap_err();
        assert!(err.to_string().contains("Expected a value"), "error should mention missing value");
    }

    #[test]
    fn rejects_unknown_flags() {
        let err = CliOverrides::parse(["vitrine", "--fov", "90"]).unwrap_err();
        assert!(err.to_string().contains("Unknown flag"), "unknown flags should error");
    }
}
