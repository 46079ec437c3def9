use std::env;
use std::fmt::Debug;
use std::path::PathBuf;
use std::str::FromStr;

use crate::photo::DEFAULT_MAX_PHOTO_BYTES;
use crate::trip::{default_report_directory, DEFAULT_DIRECTIONS_LANGUAGE};

/// Returns the value of the named environment variable if it exists or panics.
pub fn get_variable(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| panic!("must define {} environment variable", name))
}

/// Returns the value of the named environment variable, if it is set and
/// not empty.
pub fn get_optional_variable(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parses the named environment variable or panics.
pub fn parse_variable<T>(name: &str) -> T
where
    T: FromStr,
    T::Err: Debug,
{
    parse(name, get_variable(name))
}

fn parse<T>(name: &str, value: String) -> T
where
    T: FromStr,
    T::Err: Debug,
{
    value
        .parse()
        .unwrap_or_else(|e| panic!("parse {} ({:?}): {:?}", name, value, e))
}

/// Settings the library components take at construction.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub max_photo_bytes: u64,
    pub directions_language: String,
    pub report_directory: PathBuf,
}

impl Config {
    pub fn new(max_photo_bytes: u64, directions_language: String, report_directory: PathBuf) -> Self {
        Self {
            max_photo_bytes,
            directions_language,
            report_directory,
        }
    }

    /// Reads `TOURIS_MAX_PHOTO_BYTES`, `TOURIS_DIRECTIONS_LANGUAGE` and
    /// `TOURIS_REPORT_DIR`, falling back to the defaults for any that are
    /// unset.
    pub fn from_env() -> Self {
        let max_photo_bytes = get_optional_variable("TOURIS_MAX_PHOTO_BYTES")
            .map(|v| parse("TOURIS_MAX_PHOTO_BYTES", v))
            .unwrap_or(DEFAULT_MAX_PHOTO_BYTES);

        let directions_language = get_optional_variable("TOURIS_DIRECTIONS_LANGUAGE")
            .unwrap_or_else(|| DEFAULT_DIRECTIONS_LANGUAGE.to_owned());

        let report_directory = get_optional_variable("TOURIS_REPORT_DIR")
            .map(PathBuf::from)
            .or_else(default_report_directory)
            .unwrap_or_else(env::temp_dir);

        Self::new(max_photo_bytes, directions_language, report_directory)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_PHOTO_BYTES,
            DEFAULT_DIRECTIONS_LANGUAGE.to_owned(),
            env::temp_dir(),
        )
    }
}
