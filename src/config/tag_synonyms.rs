//! `tag_synonyms.json`: canonical tag -> synonym list, used by the Query
//! Generator to expand keywords and by category detection to normalise
//! incoming tags for scoring (§4.5).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagSynonymsConfig {
    /// canonical tag -> list of synonyms (case-insensitive on lookup).
    pub tags: HashMap<String, Vec<String>>,

    #[serde(skip)]
    reverse: HashMap<String, String>,
}

impl TagSynonymsConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading tag synonyms config from {}", path.display()))?;
        Self::load_from_str(&content)
    }

    pub fn load_from_str(content: &str) -> Result<Self> {
        let mut cfg: Self =
            serde_json::from_str(content).context("parsing tag synonyms config JSON")?;
        cfg.build_reverse_index();
        Ok(cfg)
    }

    fn build_reverse_index(&mut self) {
        self.reverse.clear();
        for (canonical, synonyms) in &self.tags {
            self.reverse
                .insert(canonical.to_lowercase(), canonical.clone());
            for syn in synonyms {
                self.reverse.insert(syn.to_lowercase(), canonical.clone());
            }
        }
    }

    /// Resolve any tag or synonym (case-insensitive) to its canonical form.
    /// Unknown tags pass through unchanged.
    pub fn canonicalize(&self, tag: &str) -> String {
        self.reverse
            .get(&tag.to_lowercase())
            .cloned()
            .unwrap_or_else(|| tag.to_string())
    }

    pub fn canonical_tags(&self) -> impl Iterator<Item = &String> {
        self.tags.keys()
    }

    /// Expand a keyword into itself plus every synonym sharing its canonical
    /// tag, so the Query Generator's corpus matching (§4.5) counts a title
    /// mentioning "large language model" as a hit for the keyword "llm".
    pub fn expand(&self, keyword: &str) -> Vec<String> {
        let mut out = vec![keyword.to_string()];
        if let Some(canonical) = self.reverse.get(&keyword.to_lowercase()) {
            if let Some(synonyms) = self.tags.get(canonical) {
                out.push(canonical.clone());
                out.extend(synonyms.iter().cloned());
            }
        }
        out
    }
}
