use std::{collections::HashMap, str::FromStr};

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{Error, Flag, Result};

/// Format of the flag file returned by the retriever.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// YAML (default).
    #[default]
    #[display(fmt = "yaml")]
    Yaml,
    /// TOML.
    #[display(fmt = "toml")]
    Toml,
    /// JSON.
    #[display(fmt = "json")]
    Json,
}

impl FileFormat {
    /// Parse raw flag file content into a mapping from flag name to [`Flag`].
    pub fn parse_flags(self, raw: &[u8]) -> Result<HashMap<String, Flag>> {
        let flags = match self {
            FileFormat::Yaml => serde_yaml::from_slice(raw)?,
            FileFormat::Json => serde_json::from_slice(raw)?,
            FileFormat::Toml => {
                let content = std::str::from_utf8(raw).map_err(|err| {
                    Error::from(std::io::Error::new(std::io::ErrorKind::InvalidData, err))
                })?;
                toml::from_str(content)?
            }
        };
        Ok(flags)
    }
}

impl FromStr for FileFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<FileFormat> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(FileFormat::Yaml),
            "toml" => Ok(FileFormat::Toml),
            "json" => Ok(FileFormat::Json),
            _ => Err(Error::UnknownFileFormat(s.to_owned())),
        }
    }
}
