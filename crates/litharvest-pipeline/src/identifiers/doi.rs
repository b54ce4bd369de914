use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

const URL_PREFIXES: [&str; 4] = [
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Doi {
    pub raw: String,
    /// Lowercased DOI with any URL or `doi:` prefix removed. This is the
    /// form identity keys and cache keys are built from.
    pub normalized: String,
    pub url: String,
}

impl Doi {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        let mut stripped = input;
        for prefix in URL_PREFIXES {
            if let Some(rest) = input.strip_prefix(prefix) {
                stripped = rest;
                break;
            }
        }
        if stripped.len() == input.len() {
            for prefix in ["doi:", "DOI:", "Doi:"] {
                if let Some(rest) = input.strip_prefix(prefix) {
                    stripped = rest.trim_start();
                    break;
                }
            }
        }

        // A DOI is a "10." prefix, a registrant code, a slash and a suffix.
        if !stripped.starts_with("10.") {
            return Err(PipelineError::InvalidDoi(input.to_string()));
        }
        let slash = stripped
            .find('/')
            .ok_or_else(|| PipelineError::InvalidDoi(input.to_string()))?;
        if stripped[slash + 1..].is_empty() {
            return Err(PipelineError::InvalidDoi(input.to_string()));
        }

        let normalized = stripped.to_lowercase();
        let url = format!("https://doi.org/{normalized}");

        Ok(Self {
            raw: input.to_string(),
            normalized,
            url,
        })
    }
}
