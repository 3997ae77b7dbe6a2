//! Population catalogue offered by the backend for one dataset panel.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Populations available for a dataset, with grouping and presets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationCatalog {
    pub populations: Vec<String>,
    /// Category label -> member populations.
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<String>>,
    /// Preset name -> outgroup populations.
    #[serde(default, deserialize_with = "named_sets")]
    pub common_right_sets: BTreeMap<String, Vec<String>>,
    /// Preset name -> source populations.
    #[serde(default, deserialize_with = "named_sets")]
    pub common_source_sets: BTreeMap<String, Vec<String>>,
}

/// Preset sets arrive either as a `name -> populations` map or as a list
/// of `{"name", "populations"}` objects.
#[derive(Deserialize)]
#[serde(untagged)]
enum NamedSets {
    Map(BTreeMap<String, Vec<String>>),
    List(Vec<NamedSet>),
}

#[derive(Deserialize)]
struct NamedSet {
    name: String,
    populations: Vec<String>,
}

fn named_sets<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match NamedSets::deserialize(deserializer)? {
        NamedSets::Map(sets) => sets,
        NamedSets::List(sets) => sets
            .into_iter()
            .map(|set| (set.name, set.populations))
            .collect(),
    })
}

impl PopulationCatalog {
    pub fn contains(&self, name: &str) -> bool {
        self.populations.iter().any(|p| p == name)
    }

    /// Names from `requested` that the catalogue does not offer.
    pub fn unknown<'a>(&self, requested: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
        requested.into_iter().filter(|p| !self.contains(p)).collect()
    }
}
