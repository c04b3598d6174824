use std::sync::LazyLock;

use regex::Regex;

pub const TITLE_PLACEHOLDER: &str = "No Title";
pub const DESCRIPTION_PLACEHOLDER: &str = "No Description";

const TITLE_MAX: usize = 200;
const DESCRIPTION_MAX: usize = 5000;
const DESCRIPTION_MIN: usize = 5;
const PREVIEW_MAX: usize = 150;
const ADDRESS_MAX: usize = 255;
const ADDRESS_MIN: usize = 3;
const TEXT_MAX: usize = 200;
const ACRONYM_MAX: usize = 5;

/// Connectors kept lowercase by [`smart_title_case`] (except as the first word).
const LOWERCASE_WORDS: &[&str] = &[
    "de", "da", "do", "das", "dos", "e", "em", "com", "para", "por", "a", "o", "à", "ao", "no",
    "na", "um", "uma",
];

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&#?[A-Za-z0-9]+;").unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static LOT_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:LOTE?\s+\d+\s*[-:—–]?\s*)+").unwrap());
static ROUND_DISCOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\d+\s*%\s*(?:abaixo|desconto|off)?\s*(?:na|at|in)\s*\d+\s*(?:[ªº°]|st|nd|rd|th)\s*(?:pra[çc]a|round)",
    )
    .unwrap()
});
static ROUND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\d+\s*(?:[ªº°]|st|nd|rd|th)\s*(?:pra[çc]a|round)").unwrap()
});
static PLATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*,?\s*Placa\s+FINAL\s+\d+\s*\([A-Z]{2}\)\s*,?").unwrap()
});
static MONEY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"R\$\s*[\d.,]+").unwrap());

static BR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static P_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<p(?:\s[^>]*)?>").unwrap());
static P_CLOSE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</p>").unwrap());
static BLANK_LINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n\s*\n+").unwrap());
static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\S+@\S+").unwrap());
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\d{2}\)\s*\d{4,5}-?\d{4}").unwrap());

static SLUG_JOB_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)-j\d+$").unwrap());
static SLUG_NUM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-\d{5,}$").unwrap());
static SLUG_PUNCT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());

static NON_ALNUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}\s]").unwrap());

/// Keep at most `max` chars; longer text is cut to `max - 3` and gets "...".
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

pub fn collapse_whitespace(s: &str) -> String {
    WS_RE.replace_all(s, " ").trim().to_string()
}

/// `&nbsp;` and `&amp;` are decoded, every other entity is dropped.
fn strip_entities(s: &str) -> String {
    let decoded = s.replace("&nbsp;", " ").replace("&amp;", "&");
    ENTITY_RE.replace_all(&decoded, "").into_owned()
}

fn is_acronym(word: &str) -> bool {
    word.chars().count() <= ACRONYM_MAX
        && word.chars().any(char::is_uppercase)
        && !word.chars().any(char::is_lowercase)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Title-case each word. Connectors stay lowercase unless they open the text;
/// short all-caps tokens (UF codes, brands, "4X4") are left verbatim.
pub fn smart_title_case(text: &str) -> String {
    text.split_whitespace()
        .enumerate()
        .map(|(i, word)| {
            if is_acronym(word) {
                return word.to_string();
            }
            let lower = word.to_lowercase();
            if i > 0 && LOWERCASE_WORDS.contains(&lower.as_str()) {
                lower
            } else {
                capitalize(word)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn trim_separators(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':' | '-' | '–' | '—'))
}

pub fn clean_title(raw: Option<&str>) -> String {
    let raw = match raw.map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => return TITLE_PLACEHOLDER.to_string(),
    };

    let no_tags = TAG_RE.replace_all(raw, " ");
    let text = strip_entities(&no_tags);
    let text = LOT_PREFIX_RE.replace(text.trim(), "");
    let text = ROUND_DISCOUNT_RE.replace_all(&text, " ");
    let text = ROUND_RE.replace_all(&text, " ");
    let text = PLATE_RE.replace_all(&text, " ");
    let text = MONEY_RE.replace_all(&text, " ");
    let text = collapse_whitespace(&text.replace('_', " "));

    let text = trim_separators(&text);
    if text.is_empty() {
        return TITLE_PLACEHOLDER.to_string();
    }
    truncate_chars(&smart_title_case(text), TITLE_MAX)
}

/// Title recovered from a slug id such as `megaleiloes_apartamento-em-santos-j123`.
/// `None` when nothing readable is left.
pub fn title_from_external_id(external_id: &str, prefix: &str) -> Option<String> {
    let slug = external_id.trim();
    let slug = slug.strip_prefix(prefix).unwrap_or(slug);
    let slug = SLUG_JOB_RE.replace(slug, "");
    let slug = SLUG_NUM_RE.replace(&slug, "");
    let words = collapse_whitespace(&slug.replace(['-', '_'], " "));
    let words = collapse_whitespace(&SLUG_PUNCT_RE.replace_all(&words, ""));
    if words.is_empty() {
        return None;
    }
    Some(truncate_chars(&smart_title_case(&words), TITLE_MAX))
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}

/// Lowercase, accent-free, punctuation-free form used for search.
pub fn normalize_for_search(title: &str) -> String {
    let folded: String = title.to_lowercase().chars().map(fold_accent).collect();
    collapse_whitespace(&NON_ALNUM_RE.replace_all(&folded, " "))
}

pub fn clean_description(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    if raw.chars().count() < DESCRIPTION_MIN {
        return None;
    }

    let text = BR_RE.replace_all(raw, "\n");
    let text = P_OPEN_RE.replace_all(&text, "\n\n");
    let text = P_CLOSE_RE.replace_all(&text, "\n");
    let text = TAG_RE.replace_all(&text, " ");
    let text = strip_entities(&text);
    let text = BLANK_LINES_RE.replace_all(&text, "\n\n");

    let text = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let text = URL_RE.replace_all(&text, "");
    let text = EMAIL_RE.replace_all(&text, "");
    let text = PHONE_RE.replace_all(&text, "");
    let text = truncate_chars(&collapse_whitespace(&text), DESCRIPTION_MAX);

    if text.chars().count() < DESCRIPTION_MIN {
        None
    } else {
        Some(text)
    }
}

/// Short teaser: the description when it says something, else the title.
pub fn create_preview(description: Option<&str>, title: Option<&str>) -> String {
    if let Some(desc) = description.filter(|d| d.chars().count() > 10) {
        let head: String = desc.chars().take(PREVIEW_MAX).collect();
        let head = head.trim_end();
        return if desc.chars().count() > PREVIEW_MAX {
            format!("{}...", head)
        } else {
            head.to_string()
        };
    }

    match title.map(str::trim) {
        Some(t) if !t.is_empty() => t.chars().take(PREVIEW_MAX).collect(),
        _ => DESCRIPTION_PLACEHOLDER.to_string(),
    }
}

/// Short free-text field (auction type, store name, lot number...).
/// Purely numeric values are kept as-is, everything else is title-cased.
pub fn clean_text(raw: Option<&str>, default: Option<&str>) -> Option<String> {
    let text = match raw.map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => return default.map(str::to_string),
    };

    let text = if text.chars().all(|c| c.is_ascii_digit()) {
        text.to_string()
    } else {
        smart_title_case(text)
    };
    Some(truncate_chars(&text, TEXT_MAX))
}

/// "Campinas/SP" and "Santos - Gonzaga" both become the bare city.
pub fn clean_city(raw: Option<&str>) -> Option<String> {
    let city = raw?.trim();
    let city = city.split('/').next().unwrap_or(city).trim();
    let city = city.split('-').next().unwrap_or(city).trim();
    if city.is_empty() {
        None
    } else {
        Some(smart_title_case(city))
    }
}

pub fn clean_address(raw: Option<&str>) -> Option<String> {
    let address = raw?.trim();
    if address.chars().count() < ADDRESS_MIN {
        return None;
    }
    Some(truncate_chars(&smart_title_case(address), ADDRESS_MAX))
}

/// Trimmed text or nothing.
pub fn plain_text(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_strips_lot_prefix_and_round() {
        assert_eq!(
            clean_title(Some("LOTE 5 - Casa na Praia, 20% abaixo na 2ª praça")),
            "Casa na Praia"
        );
        assert_eq!(clean_title(Some("Lot 12: Trator Valtra")), "Trator Valtra");
        assert_eq!(clean_title(Some("Galpão 30% off at 2nd round")), "Galpão");
        assert_eq!(clean_title(Some("Apartamento 1ª Praça")), "Apartamento");
    }

    #[test]
    fn title_from_slug_id() {
        let prefix = "megaleiloes_";
        assert_eq!(
            title_from_external_id("megaleiloes_apartamento-em-santos-j123", prefix).as_deref(),
            Some("Apartamento em Santos")
        );
        assert_eq!(
            title_from_external_id("megaleiloes_trator-valtra-bm-110-4x4-123456", prefix).as_deref(),
            Some("Trator Valtra Bm 110 4x4")
        );
        assert_eq!(
            title_from_external_id("casa_terrea-(sobrado)!", prefix).as_deref(),
            Some("Casa Terrea Sobrado")
        );
        assert_eq!(title_from_external_id("megaleiloes_-J42", prefix), None);
        assert_eq!(title_from_external_id("  ", prefix), None);
    }

    #[test]
    fn title_strips_stacked_lot_prefixes() {
        let once = clean_title(Some("LOTE 1 - LOTE 2 - Casa"));
        assert_eq!(once, "Casa");
        assert_eq!(clean_title(Some(&once)), once);
        assert_eq!(clean_title(Some("Lote 7: lote 8 Sala Comercial")), "Sala Comercial");
    }

    #[test]
    fn title_strips_html_money_and_plate() {
        assert_eq!(
            clean_title(Some("<b>Fiat Uno</b>&nbsp;Mille, Placa FINAL 3 (SP), 2010 R$ 12.500,00")),
            "Fiat Uno Mille 2010"
        );
        assert_eq!(clean_title(Some("Peças &amp; Acessórios")), "Peças & Acessórios");
        assert_eq!(clean_title(Some("caixa_de_ferramentas")), "Caixa de Ferramentas");
    }

    #[test]
    fn title_placeholder() {
        assert_eq!(clean_title(None), TITLE_PLACEHOLDER);
        assert_eq!(clean_title(Some("   ")), TITLE_PLACEHOLDER);
        assert_eq!(clean_title(Some("<br>")), TITLE_PLACEHOLDER);
        assert_eq!(clean_title(Some("LOTE 7 - ")), TITLE_PLACEHOLDER);
    }

    #[test]
    fn title_truncates_to_200() {
        let long = "palavra ".repeat(60);
        let t = clean_title(Some(&long));
        assert_eq!(t.chars().count(), 200);
        assert!(t.ends_with("..."));
        assert_eq!(clean_title(Some(&t)), t);
    }

    #[test]
    fn title_case_rules() {
        assert_eq!(smart_title_case("casa NA praia"), "Casa NA Praia");
        assert_eq!(smart_title_case("APARTAMENTO EM SP"), "Apartamento EM SP");
        assert_eq!(smart_title_case("caminhão VW de carga"), "Caminhão VW de Carga");
        assert_eq!(smart_title_case("de volta"), "De Volta");
        assert_eq!(smart_title_case("BMW X5 4X4 automática"), "BMW X5 4X4 Automática");
        assert_eq!(smart_title_case("MERCEDES-BENZ"), "Mercedes-benz");
        assert_eq!(smart_title_case(""), "");
    }

    #[test]
    fn title_case_is_idempotent() {
        for s in ["casa na praia", "TRATOR MASSEY FERGUSON 275", "imóvel à venda em SP", "ônibus"] {
            let once = smart_title_case(s);
            assert_eq!(smart_title_case(&once), once);
        }
    }

    #[test]
    fn search_form() {
        assert_eq!(normalize_for_search("Caminhão Mercedes-Benz Atego 2425"), "caminhao mercedes benz atego 2425");
        assert_eq!(normalize_for_search("Imóvel à Venda, São João!"), "imovel a venda sao joao");
        assert_eq!(normalize_for_search(""), "");
        let once = normalize_for_search("Ação Ñandu");
        assert_eq!(normalize_for_search(&once), once);
    }

    #[test]
    fn description_cleanup() {
        let raw = "<p>Veículo em bom estado.</p><br/>Contato: (11) 98765-4321 ou vendas@leilao.com.br<br>\
                   Fotos em https://example.com/lote/1 &nbsp; &#8211; ver edital";
        let d = clean_description(Some(raw)).unwrap();
        assert_eq!(d, "Veículo em bom estado. Contato: ou Fotos em ver edital");
    }

    #[test]
    fn description_too_short_is_dropped() {
        assert!(clean_description(None).is_none());
        assert!(clean_description(Some("abc")).is_none());
        assert!(clean_description(Some("<b></b><i>  </i>")).is_none());
        assert!(clean_description(Some("https://example.com/only-a-link")).is_none());
    }

    #[test]
    fn description_truncates() {
        let long = "a".repeat(6000);
        let d = clean_description(Some(&long)).unwrap();
        assert_eq!(d.chars().count(), 5000);
        assert!(d.ends_with("..."));
    }

    #[test]
    fn preview_sources() {
        let desc = "x".repeat(200);
        let p = create_preview(Some(&desc), Some("Titulo"));
        assert_eq!(p.chars().count(), 153);
        assert!(p.ends_with("..."));

        assert_eq!(create_preview(Some("Descrição curta ok"), None), "Descrição curta ok");
        assert_eq!(create_preview(Some("curta"), Some("Casa na Praia")), "Casa na Praia");
        assert_eq!(create_preview(None, Some("Casa na Praia")), "Casa na Praia");
        assert_eq!(create_preview(None, None), DESCRIPTION_PLACEHOLDER);
        assert_eq!(create_preview(None, Some("  ")), DESCRIPTION_PLACEHOLDER);
    }

    #[test]
    fn short_text() {
        assert_eq!(clean_text(Some(" leilão judicial "), None).as_deref(), Some("Leilão Judicial"));
        assert_eq!(clean_text(Some("001"), None).as_deref(), Some("001"));
        assert_eq!(clean_text(Some(""), Some("Leilão")).as_deref(), Some("Leilão"));
        assert_eq!(clean_text(None, None), None);
        let long = "a".repeat(250);
        assert_eq!(clean_text(Some(&long), None).unwrap().chars().count(), 200);
    }

    #[test]
    fn city_cleanup() {
        assert_eq!(clean_city(Some("campinas/SP")).as_deref(), Some("Campinas"));
        assert_eq!(clean_city(Some("SANTOS - GONZAGA")).as_deref(), Some("Santos"));
        assert_eq!(clean_city(Some("são josé dos campos")).as_deref(), Some("São José dos Campos"));
        assert_eq!(clean_city(Some("/SP")), None);
        assert_eq!(clean_city(Some("  ")), None);
        assert_eq!(clean_city(None), None);
    }

    #[test]
    fn address_cleanup() {
        assert_eq!(
            clean_address(Some("rua das flores, 123 - centro")).as_deref(),
            Some("Rua das Flores, 123 - Centro")
        );
        assert_eq!(clean_address(Some("ab")), None);
        let long = "avenida ".repeat(40);
        assert_eq!(clean_address(Some(&long)).unwrap().chars().count(), 255);
    }
}
