//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of Mimetree.
//
// Mimetree is free software: you can  redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Mimetree is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Mimetree. If not, see <http://www.gnu.org/licenses/>.


use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::Error;
use crate::mime::parse::ParseConfig;
use crate::mime::part::OutputConfig;

/// The configuration for parsing and serialising messages.
///
/// This is typically read from a TOML file such as
///
/// ```toml
/// [parse]
/// depth = { limited = 4 }
///
/// [parse.fold]
/// indent = "\t"
/// preferred = 72
///
/// [output]
/// strict_boundaries = true
/// ```
///
/// Every section and every key is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How messages are broken down into trees.
    pub parse: ParseConfig,
    /// How trees are written back out.
    pub output: OutputConfig,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, Error> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config = Config::from_toml_str(&text)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mime::field::FoldEncoding;
    use crate::mime::parse::Depth;

    #[test]
    fn empty_config_is_default() {
        assert_eq!(Config::default(), Config::from_toml_str("").unwrap());
        assert_eq!(Depth::Limited(10), Config::default().parse.depth);
        assert!(!Config::default().output.strict_boundaries);
    }

    #[test]
    fn parse_full_config() {
        let config = Config::from_toml_str(
            r#"
[parse]
depth = { limited = 4 }

[parse.fold]
indent = "\t"
preferred = 72
forced = 500

[output]
strict_boundaries = true
"#,
        )
        .unwrap();

        assert_eq!(Depth::Limited(4), config.parse.depth);
        assert_eq!(
            FoldEncoding::new("\t", Some(72), Some(500)).unwrap(),
            config.parse.fold
        );
        assert!(config.output.strict_boundaries);

        let config =
            Config::from_toml_str("[parse]\ndepth = \"unlimited\"\n").unwrap();
        assert_eq!(Depth::Unlimited, config.parse.depth);
    }

    #[test]
    fn invalid_fold_is_rejected() {
        assert_matches!(
            Err(Error::Toml(_)),
            Config::from_toml_str("[parse.fold]\nindent = \"x\"\n")
        );
        assert_matches!(
            Err(Error::Toml(_)),
            Config::from_toml_str(
                "[parse.fold]\npreferred = 100\nforced = 90\n"
            )
        );
    }

    #[test]
    fn serialised_config_reloads() {
        let mut config = Config::default();
        config.parse.depth = Depth::Unlimited;
        config.parse.fold = FoldEncoding::never();
        config.output.strict_boundaries = true;

        let text = toml::to_string(&config).unwrap();
        assert_eq!(config, Config::from_toml_str(&text).unwrap());
    }

    #[test]
    fn load_missing_file() {
        assert_matches!(
            Err(Error::Io(_)),
            Config::load("/nonexistent/mimetree.toml")
        );
    }
}
