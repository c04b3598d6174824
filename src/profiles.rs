//! Per-site configuration: category tables, field aliases and link templates.
//!
//! Every supported auction site is one [`SourceProfile`] in a [`Registry`].
//! Adding a site means adding a profile (built in or from a JSON file),
//! never another copy of the pipeline.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{LazyLock, OnceLock};

use serde::Deserialize;
use tracing::{info, warn};

use crate::category::{CanonicalCategory, Classifier, FallbackRule};
use crate::error::Error;
use crate::raw::RawRecord;

pub const GENERIC: &str = "generic";
pub const SODRE: &str = "sodre";
pub const MEGALEILOES: &str = "megaleiloes";

static BUILTIN: LazyLock<Registry> = LazyLock::new(Registry::builtin);
static ACTIVE: OnceLock<Registry> = OnceLock::new();

/// Built-in profiles, constructed on first use and read-only afterwards.
pub fn builtin() -> &'static Registry {
    &BUILTIN
}

/// Registry used by [`crate::normalize::normalize`] and [`crate::category::classify`]:
/// whatever was installed at startup, else the built-in one.
pub fn registry() -> &'static Registry {
    ACTIVE.get_or_init(|| builtin().clone())
}

/// Make `registry` the process-wide one. Fails once any lookup has already happened.
pub fn install(registry: Registry) -> Result<&'static Registry, Registry> {
    ACTIVE.set(registry)?;
    Ok(self::registry())
}

#[derive(Debug, Clone)]
pub struct SourceProfile {
    pub id: String,
    pub name: String,
    /// (canonical key, raw keys tried in order)
    pub aliases: Vec<(String, Vec<String>)>,
    pub classifier: Classifier,
    /// Expanded with `{external_id}` when a lot carries no link of its own.
    pub link_template: Option<String>,
    /// Titles are rebuilt from slug ids (`<id>_apartamento-em-santos-j123`).
    pub title_from_external_id: bool,
}

impl SourceProfile {
    pub fn new(id: &str, name: &str, classifier: Classifier) -> Self {
        SourceProfile {
            id: id.to_string(),
            name: name.to_string(),
            aliases: Vec::new(),
            classifier,
            link_template: None,
            title_from_external_id: false,
        }
    }

    /// Map site-specific keys onto canonical ones. The input is left untouched.
    pub fn resolve(&self, raw: &RawRecord) -> RawRecord {
        if self.aliases.is_empty() {
            raw.clone()
        } else {
            raw.with_aliases(&self.aliases)
        }
    }

    /// Id prefix stripped before a slug id is read as a title.
    pub fn id_prefix(&self) -> String {
        format!("{}_", self.id)
    }

    pub fn link_for(&self, external_id: &str) -> Option<String> {
        let template = self.link_template.as_ref()?;
        let id = external_id.trim();
        if id.is_empty() {
            return None;
        }
        Some(template.replace("{external_id}", id))
    }

    fn set_alias(&mut self, canonical: &str, sources: Vec<String>) {
        match self.aliases.iter_mut().find(|(k, _)| k == canonical) {
            Some((_, existing)) => *existing = sources,
            None => self.aliases.push((canonical.to_string(), sources)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Registry {
    generic: SourceProfile,
    profiles: BTreeMap<String, SourceProfile>,
}

impl Registry {
    pub fn builtin() -> Self {
        let mut profiles = BTreeMap::new();
        for profile in [sodre_profile(), megaleiloes_profile()] {
            profiles.insert(profile.id.clone(), profile);
        }
        Registry {
            generic: generic_profile(),
            profiles,
        }
    }

    pub fn generic(&self) -> &SourceProfile {
        &self.generic
    }

    pub fn get(&self, id: &str) -> Option<&SourceProfile> {
        let id = id.trim().to_lowercase();
        if id == self.generic.id {
            Some(&self.generic)
        } else {
            self.profiles.get(&id)
        }
    }

    /// Profile for `id`, or the generic one when the site is unknown.
    pub fn resolve(&self, id: &str) -> &SourceProfile {
        match self.get(id) {
            Some(p) => p,
            None => {
                warn!(source = id, "unknown source profile, using generic");
                &self.generic
            }
        }
    }

    /// Profile named by the record's own `source`, quietly falling back to generic.
    pub fn for_record(&self, raw: &RawRecord) -> &SourceProfile {
        raw.text("source")
            .and_then(|s| self.get(&s))
            .unwrap_or_else(|| self.generic())
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceProfile> {
        std::iter::once(&self.generic).chain(self.profiles.values())
    }

    pub fn insert(&mut self, profile: SourceProfile) {
        if profile.id == self.generic.id {
            self.generic = profile;
        } else {
            self.profiles.insert(profile.id.clone(), profile);
        }
    }

    /// Add or replace profiles described in a JSON file. Returns how many were loaded.
    pub fn load_file(&mut self, path: &Path) -> Result<usize, Error> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ProfilesFile = serde_json::from_str(&text).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })?;
        let n = self.apply(file)?;
        info!(path = %path.display(), profiles = n, "loaded source profiles");
        Ok(n)
    }

    pub fn apply(&mut self, file: ProfilesFile) -> Result<usize, Error> {
        let n = file.profiles.len();
        for spec in file.profiles {
            let profile = self.build(spec)?;
            self.insert(profile);
        }
        Ok(n)
    }

    fn build(&self, spec: ProfileSpec) -> Result<SourceProfile, Error> {
        let id = spec.id.trim().to_lowercase();
        let mut profile = match &spec.extends {
            Some(base) => {
                let mut p = self.get(base).cloned().ok_or_else(|| Error::UnknownProfileBase {
                    id: id.clone(),
                    base: base.clone(),
                })?;
                p.id = id.clone();
                p
            }
            None => SourceProfile::new(&id, &id, Classifier::default()),
        };

        if let Some(name) = spec.name {
            profile.name = name;
        }
        if let Some(default) = spec.default_category {
            profile.classifier.set_default(default);
        }
        for (label, category) in &spec.categories {
            profile.classifier.insert(label, *category);
        }
        let rules = spec
            .fallbacks
            .into_iter()
            .map(|r| FallbackRule::new(r.category, r.contains))
            .collect();
        profile.classifier.prepend_rules(rules);
        for (canonical, sources) in spec.aliases {
            profile.set_alias(&canonical, sources);
        }
        if spec.link_template.is_some() {
            profile.link_template = spec.link_template;
        }
        if let Some(from_id) = spec.title_from_external_id {
            profile.title_from_external_id = from_id;
        }
        Ok(profile)
    }
}

/// Built-in registry extended with an optional profiles file.
pub fn load_registry(path: Option<&Path>) -> Result<Registry, Error> {
    let mut registry = builtin().clone();
    if let Some(path) = path {
        registry.load_file(path)?;
    }
    Ok(registry)
}

// ── Profile files ──

#[derive(Debug, Default, Deserialize)]
pub struct ProfilesFile {
    #[serde(default)]
    pub profiles: Vec<ProfileSpec>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileSpec {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub default_category: Option<CanonicalCategory>,
    #[serde(default)]
    pub categories: BTreeMap<String, CanonicalCategory>,
    /// Tried before any inherited rules.
    #[serde(default)]
    pub fallbacks: Vec<RuleSpec>,
    #[serde(default)]
    pub aliases: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub link_template: Option<String>,
    #[serde(default)]
    pub title_from_external_id: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct RuleSpec {
    pub category: CanonicalCategory,
    pub contains: Vec<String>,
}

// ── Built-in tables ──

fn generic_profile() -> SourceProfile {
    SourceProfile::new(GENERIC, "Generic", sodre_classifier())
}

fn megaleiloes_profile() -> SourceProfile {
    let mut profile = SourceProfile::new(MEGALEILOES, "MegaLeilões", sodre_classifier());
    profile.title_from_external_id = true;
    profile
}

fn sodre_profile() -> SourceProfile {
    let mut profile = SourceProfile::new(SODRE, "Sodré Santoro", sodre_classifier());
    profile.link_template = Some("https://www.sodresantoro.com.br/lote/{external_id}".to_string());

    let aliases: &[(&str, &[&str])] = &[
        ("external_id", &["id", "lot_id"]),
        ("title", &["lot_name", "name"]),
        ("description", &["lot_description"]),
        ("subcategory", &["lot_subcategory", "category"]),
        ("raw_category", &["lot_subcategory", "category"]),
        ("auction_date", &["lot_auction_date_init"]),
        ("auction_type", &["lot_auction_type"]),
        ("value", &["lot_current_value", "lot_minimum_bid", "lot_initial_value"]),
        ("first_round_value", &["tj_praca_value"]),
        ("discount_percentage", &["tj_praca_discount"]),
        ("city", &["lot_city"]),
        ("state", &["lot_state"]),
        ("address", &["lot_street"]),
        ("brand", &["lot_brand"]),
        ("model", &["lot_model"]),
        ("year", &["lot_year"]),
    ];
    profile.aliases = aliases
        .iter()
        .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
        .collect();
    profile
}

fn sodre_classifier() -> Classifier {
    use CanonicalCategory::*;

    let mut classifier = Classifier::new(Outros).with_entries([
        ("apartamento", Imoveis),
        ("casa", Imoveis),
        ("casa / construção", Imoveis),
        ("complexo industrial", Imoveis),
        ("complexo residencial e de lazer", Imoveis),
        ("direitos sobre apartamento", Imoveis),
        ("direitos sobre imóvel residencial", Imoveis),
        ("direitos sobre terreno", Imoveis),
        ("galpão industrial", Imoveis),
        ("galpões comerciais e residência", Imoveis),
        ("gleba de terra", Imoveis),
        ("imóvel comercial e residencial", Imoveis),
        ("imóvel residencial", Imoveis),
        ("imóvel residencial com 3 edificações", Imoveis),
        ("imóvel residencial tipo sobrado", Imoveis),
        ("lote de terreno", Imoveis),
        ("parte ideal de 1/6 sobre imóvel residencial", Imoveis),
        ("parte ideal de 50% sobre lote de terreno", Imoveis),
        ("parte ideal de 50% sobre nua-propriedade", Imoveis),
        ("terreno", Imoveis),
        ("terreno urbano", Imoveis),
        ("área de terras", Imoveis),
        ("caminhões", Veiculos),
        ("carros", Veiculos),
        ("embarcações", Veiculos),
        ("motos", Veiculos),
        ("onibus", Veiculos),
        ("peruas", Veiculos),
        ("utilit. pesados", Veiculos),
        ("utilitarios leves", Veiculos),
        ("van leve", Veiculos),
        ("veículos", Veiculos),
        ("bicicleta", Veiculos),
        ("compressores de ar", MaquinasEquipamentos),
        ("empilhadeiras", MaquinasEquipamentos),
        ("equip. e mat. industriais", MaquinasEquipamentos),
        ("geradores", MaquinasEquipamentos),
        ("implementos agrícolas", MaquinasEquipamentos),
        ("implementos rod.", MaquinasEquipamentos),
        ("terraplenagem", MaquinasEquipamentos),
        ("tratores", MaquinasEquipamentos),
        ("eletricos", Tecnologia),
        ("informatica", Tecnologia),
        ("áudio, vídeo e iluminação", Tecnologia),
        ("eletrodomesticos", Tecnologia),
        ("moveis para escritório", CasaConsumo),
        ("móveis p/ casa", CasaConsumo),
        ("lazer/esportes", CasaConsumo),
        ("uso pessoal", CasaConsumo),
        ("materiais escolares", CasaConsumo),
        ("academia", IndustrialEmpresarial),
        ("esquadrias e estruturas metálicas", IndustrialEmpresarial),
        ("ferramentas", IndustrialEmpresarial),
        ("hospitalar", IndustrialEmpresarial),
        ("diversos", MateriaisSucatas),
        ("instrumentos musicais", ArteColecionaveis),
        ("unknown", Outros),
    ]);

    let rules: [(CanonicalCategory, &[&str]); 8] = [
        (Imoveis, &["imovel", "imóvel", "apartamento", "casa", "terreno", "galpão"]),
        (Veiculos, &["carro", "moto", "caminhão", "veículo", "veiculo", "ônibus"]),
        (MaquinasEquipamentos, &["trator", "empilhadeira", "gerador", "compressor", "implemento"]),
        (Tecnologia, &["informática", "informatica", "eletron", "eletr", "áudio", "audio"]),
        (CasaConsumo, &["móvel", "movel", "lazer", "esporte"]),
        (IndustrialEmpresarial, &["ferramenta", "industrial", "academia", "hospitalar"]),
        (MateriaisSucatas, &["sucata", "material", "diversos"]),
        (ArteColecionaveis, &["instrumento", "musical", "arte", "colecionável"]),
    ];
    for (category, needles) in rules {
        classifier.push_rule(FallbackRule::new(category, needles.iter().copied()));
    }
    classifier
}
