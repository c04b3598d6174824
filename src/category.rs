use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::error::Error;

/// Top-level buckets every lot is routed into, whatever the source site calls it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalCategory {
    Imoveis,
    Veiculos,
    MaquinasEquipamentos,
    Tecnologia,
    CasaConsumo,
    IndustrialEmpresarial,
    MateriaisSucatas,
    Animais,
    ArteColecionaveis,
    Outros,
}

impl CanonicalCategory {
    pub const ALL: [CanonicalCategory; 10] = [
        CanonicalCategory::Imoveis,
        CanonicalCategory::Veiculos,
        CanonicalCategory::MaquinasEquipamentos,
        CanonicalCategory::Tecnologia,
        CanonicalCategory::CasaConsumo,
        CanonicalCategory::IndustrialEmpresarial,
        CanonicalCategory::MateriaisSucatas,
        CanonicalCategory::Animais,
        CanonicalCategory::ArteColecionaveis,
        CanonicalCategory::Outros,
    ];

    /// Label as stored and displayed.
    pub fn label(self) -> &'static str {
        match self {
            CanonicalCategory::Imoveis => "Imóveis",
            CanonicalCategory::Veiculos => "Veículos",
            CanonicalCategory::MaquinasEquipamentos => "Máquinas & Equipamentos",
            CanonicalCategory::Tecnologia => "Tecnologia",
            CanonicalCategory::CasaConsumo => "Casa & Consumo",
            CanonicalCategory::IndustrialEmpresarial => "Industrial & Empresarial",
            CanonicalCategory::MateriaisSucatas => "Materiais & Sucatas",
            CanonicalCategory::Animais => "Animais",
            CanonicalCategory::ArteColecionaveis => "Arte & Colecionáveis",
            CanonicalCategory::Outros => "Outros",
        }
    }

    /// ASCII key, accepted in profile files alongside the label.
    pub fn key(self) -> &'static str {
        match self {
            CanonicalCategory::Imoveis => "imoveis",
            CanonicalCategory::Veiculos => "veiculos",
            CanonicalCategory::MaquinasEquipamentos => "maquinas_equipamentos",
            CanonicalCategory::Tecnologia => "tecnologia",
            CanonicalCategory::CasaConsumo => "casa_consumo",
            CanonicalCategory::IndustrialEmpresarial => "industrial_empresarial",
            CanonicalCategory::MateriaisSucatas => "materiais_sucatas",
            CanonicalCategory::Animais => "animais",
            CanonicalCategory::ArteColecionaveis => "arte_colecionaveis",
            CanonicalCategory::Outros => "outros",
        }
    }
}

impl Default for CanonicalCategory {
    fn default() -> Self {
        CanonicalCategory::Outros
    }
}

impl fmt::Display for CanonicalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

impl FromStr for CanonicalCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        CanonicalCategory::ALL
            .into_iter()
            .find(|c| c.key() == wanted || c.label().to_lowercase() == wanted)
            .ok_or_else(|| Error::UnknownCategory(s.to_string()))
    }
}

impl Serialize for CanonicalCategory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for CanonicalCategory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Substring rule: matches when any needle occurs in the cleaned label.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackRule {
    pub needles: Vec<String>,
    pub category: CanonicalCategory,
}

impl FallbackRule {
    pub fn new<I, S>(category: CanonicalCategory, needles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FallbackRule {
            needles: needles.into_iter().map(|n| n.into().to_lowercase()).collect(),
            category,
        }
    }

    fn matches(&self, label: &str) -> bool {
        self.needles.iter().any(|n| !n.is_empty() && label.contains(n.as_str()))
    }
}

/// Subcategory label → canonical category.
///
/// Resolution order: exact lookup on the trimmed, lowercased label, then the
/// fallback rules in declaration order (first hit wins), then the default.
#[derive(Debug, Clone)]
pub struct Classifier {
    exact: HashMap<String, CanonicalCategory>,
    fallbacks: Vec<FallbackRule>,
    default: CanonicalCategory,
}

impl Default for Classifier {
    fn default() -> Self {
        Classifier::new(CanonicalCategory::Outros)
    }
}

impl Classifier {
    pub fn new(default: CanonicalCategory) -> Self {
        Classifier {
            exact: HashMap::new(),
            fallbacks: Vec::new(),
            default,
        }
    }

    pub fn insert(&mut self, label: &str, category: CanonicalCategory) {
        self.exact.insert(clean_label(label), category);
    }

    pub fn with_entries<'a, I>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, CanonicalCategory)>,
    {
        for (label, category) in entries {
            self.insert(label, category);
        }
        self
    }

    pub fn push_rule(&mut self, rule: FallbackRule) {
        self.fallbacks.push(rule);
    }

    /// Rules tried ahead of the existing ones.
    pub fn prepend_rules(&mut self, rules: Vec<FallbackRule>) {
        self.fallbacks.splice(0..0, rules);
    }

    pub fn set_default(&mut self, default: CanonicalCategory) {
        self.default = default;
    }

    pub fn default_category(&self) -> CanonicalCategory {
        self.default
    }

    pub fn table_len(&self) -> usize {
        self.exact.len()
    }

    pub fn rules(&self) -> &[FallbackRule] {
        &self.fallbacks
    }

    pub fn classify(&self, subcategory: Option<&str>) -> CanonicalCategory {
        let label = match subcategory.map(clean_label) {
            Some(l) if !l.is_empty() => l,
            _ => return self.default,
        };

        if let Some(category) = self.exact.get(&label) {
            return *category;
        }

        match self.fallbacks.iter().find(|r| r.matches(&label)) {
            Some(rule) => {
                debug!(label = %label, category = %rule.category, "subcategory matched by fallback rule");
                rule.category
            }
            None => self.default,
        }
    }
}

fn clean_label(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Classify against the cross-site table of the generic profile.
pub fn classify(subcategory: Option<&str>) -> CanonicalCategory {
    crate::profiles::registry().generic().classifier.classify(subcategory)
}
