use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::{Error, Result};

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-+]?(?:\d*\.\d+|\d+)").unwrap());

/// `memories_history.json` as exported
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    #[serde(rename = "Saved Media")]
    pub saved_media: Vec<ManifestEntry>,
}

/// One memory: where to get it, when it was taken, where.
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    #[serde(rename = "Media Download Url")]
    pub url: String,
    /// `YYYY-MM-DD HH:MM:SS TZ`
    #[serde(rename = "Date")]
    pub date: String,
    /// Free text with a latitude and a longitude somewhere in it
    #[serde(rename = "Location", default)]
    pub location: String,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl ManifestEntry {
    /// (latitude, longitude) from the first two numbers in `location`.
    pub fn coordinates(&self) -> Result<(f64, f64)> {
        parse_coordinates(&self.location)
    }
}

/// First two numbers anywhere in the string, in order. Extra numbers are
/// ignored; fewer than two is an error.
pub fn parse_coordinates(location: &str) -> Result<(f64, f64)> {
    let mut numbers = NUMBER_RE
        .find_iter(location)
        .filter_map(|m| m.as_str().parse::<f64>().ok());

    match (numbers.next(), numbers.next()) {
        (Some(lat), Some(lon)) => Ok((lat, lon)),
        _ => Err(Error::InvalidLocation(location.to_string())),
    }
}
