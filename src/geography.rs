//! Geographic Relevance Filter.
//!
//! Flags content as plausibly out-of-scope for a tenant by scanning its text
//! for other states' names/postal abbreviations or named "distant" cities,
//! with a category-aware strictness: government/schools/public_safety/
//! development content is filtered strictly to the tenant's own locality,
//! while community/events/dining/news/business/sports content is allowed a
//! broader metro-area scope (the tenant's neighboring localities).
//!
//! Grounded on `regex` usage in `harborgrid-justin-caddy` and several
//! `lexlapax-rs-llmspell` tool crates, which use `regex::Regex` for this kind
//! of bounded text-pattern scan rather than a full NLP pipeline.

use regex::Regex;
use std::sync::OnceLock;

use crate::config::TenantConfig;

const STRICT_CATEGORIES: &[&str] = &["government", "schools", "public_safety", "development"];

const US_STATES: &[(&str, &str)] = &[
    ("alabama", "AL"), ("alaska", "AK"), ("arizona", "AZ"), ("arkansas", "AR"),
    ("california", "CA"), ("colorado", "CO"), ("connecticut", "CT"), ("delaware", "DE"),
    ("florida", "FL"), ("georgia", "GA"), ("hawaii", "HI"), ("idaho", "ID"),
    ("illinois", "IL"), ("indiana", "IN"), ("iowa", "IA"), ("kansas", "KS"),
    ("kentucky", "KY"), ("louisiana", "LA"), ("maine", "ME"), ("maryland", "MD"),
    ("massachusetts", "MA"), ("michigan", "MI"), ("minnesota", "MN"), ("mississippi", "MS"),
    ("missouri", "MO"), ("montana", "MT"), ("nebraska", "NE"), ("nevada", "NV"),
    ("new hampshire", "NH"), ("new jersey", "NJ"), ("new mexico", "NM"), ("new york", "NY"),
    ("north carolina", "NC"), ("north dakota", "ND"), ("ohio", "OH"), ("oklahoma", "OK"),
    ("oregon", "OR"), ("pennsylvania", "PA"), ("rhode island", "RI"), ("south carolina", "SC"),
    ("south dakota", "SD"), ("tennessee", "TN"), ("texas", "TX"), ("utah", "UT"),
    ("vermont", "VT"), ("virginia", "VA"), ("washington", "WA"), ("west virginia", "WV"),
    ("wisconsin", "WI"), ("wyoming", "WY"),
];

fn word_boundary_regex(term: &str) -> Regex {
    static CACHE: OnceLock<std::sync::Mutex<std::collections::HashMap<String, Regex>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| std::sync::Mutex::new(std::collections::HashMap::new()));
    let mut guard = cache.lock().unwrap();
    guard
        .entry(term.to_string())
        .or_insert_with(|| {
            Regex::new(&format!(r"(?i)\b{}\b", regex::escape(term))).expect("valid regex")
        })
        .clone()
}

/// Matches a postal abbreviation used the way addresses and datelines use
/// it — `City, XX`, `(XX)`, or `XX 02101` — rather than any bare two-letter
/// word, so common words like "or"/"in" don't false-positive.
fn abbreviation_regex(abbr: &str) -> Regex {
    static CACHE: OnceLock<std::sync::Mutex<std::collections::HashMap<String, Regex>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| std::sync::Mutex::new(std::collections::HashMap::new()));
    let mut guard = cache.lock().unwrap();
    guard
        .entry(abbr.to_string())
        .or_insert_with(|| {
            let escaped = regex::escape(abbr);
            Regex::new(&format!(r",\s{escaped}\b|\({escaped}\)|\b{escaped}\s\d{{5}}")).expect("valid regex")
        })
        .clone()
}

/// Returns `true` if `text` appears to concern a different state than the
/// tenant's own (as configured by `state_abbreviation`), matching either the
/// full state name or a postal abbreviation used in address/dateline form.
fn mentions_other_state(text: &str, tenant: &TenantConfig) -> bool {
    let own_abbr = tenant.state_abbreviation.as_deref().map(str::to_uppercase);

    for (name, abbr) in US_STATES {
        if own_abbr.as_deref() == Some(abbr) {
            continue;
        }
        if word_boundary_regex(name).is_match(text) {
            return true;
        }
        if abbreviation_regex(abbr).is_match(text) {
            return true;
        }
    }
    false
}

/// Returns `true` if `text` mentions the tenant's own locality by name.
fn mentions_own_locality(text: &str, tenant: &TenantConfig) -> bool {
    match tenant.locality_name.as_deref() {
        Some(locality) => word_boundary_regex(locality).is_match(text),
        None => false,
    }
}

/// Returns `true` if `text` mentions a locality that is neither the tenant's
/// own locality nor one of its configured neighbors.
fn mentions_distant_locality(text: &str, tenant: &TenantConfig) -> bool {
    // Heuristic: look for "<Capitalized Word(s)>, <ST>" city/state patterns
    // and flag any hit whose city isn't the tenant's own or a neighbor.
    static CITY_STATE: OnceLock<Regex> = OnceLock::new();
    let re = CITY_STATE.get_or_init(|| {
        Regex::new(r"\b([A-Z][a-zA-Z]+(?: [A-Z][a-zA-Z]+)*),\s*([A-Z]{2})\b").expect("valid regex")
    });

    let own = tenant.locality_name.as_deref().map(str::to_lowercase);
    let neighbors: Vec<String> = tenant
        .neighboring_localities
        .iter()
        .map(|n| n.to_lowercase())
        .collect();

    for capture in re.captures_iter(text) {
        let city = capture.get(1).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
        if own.as_deref() == Some(city.as_str()) || neighbors.contains(&city) {
            continue;
        }
        return true;
    }
    false
}

/// Returns `true` if content in `category` with body `text` is in scope for
/// `tenant`. Strict categories require the tenant's own locality/state;
/// broader categories tolerate the tenant's configured metro neighbors.
pub fn is_in_scope(category: &str, text: &str, tenant: &TenantConfig) -> bool {
    if mentions_own_locality(text, tenant) {
        return true;
    }

    let strict = STRICT_CATEGORIES.contains(&category);

    if mentions_other_state(text, tenant) {
        return false;
    }

    if strict && mentions_distant_locality(text, tenant) {
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantConfig {
        TenantConfig {
            tenant_id: "t1".to_string(),
            name: "Springfield".to_string(),
            phone: None,
            fallback_url: None,
            locality_name: Some("Springfield".to_string()),
            neighboring_localities: vec!["Shelbyville".to_string()],
            state_abbreviation: Some("IL".to_string()),
        }
    }

    #[test]
    fn strict_category_rejects_distant_locality() {
        let t = tenant();
        let text = "A new ordinance passed in Capital City, NY this week.";
        assert!(!is_in_scope("government", text, &t));
    }

    #[test]
    fn strict_category_accepts_neighboring_locality() {
        let t = tenant();
        let text = "Shelbyville, IL council approved the budget.";
        assert!(is_in_scope("government", text, &t));
    }

    #[test]
    fn broad_category_ignores_distant_locality_but_not_other_state() {
        let t = tenant();
        let text = "A great new restaurant opened in Portland, OR.";
        assert!(!is_in_scope("dining", text, &t));
    }

    #[test]
    fn other_state_name_mention_is_rejected() {
        let t = tenant();
        let text = "Residents of California are facing similar issues.";
        assert!(!is_in_scope("news", text, &t));
    }

    #[test]
    fn other_state_postal_abbreviation_is_rejected() {
        let t = tenant();
        let text = "The delegation traveled to Austin, TX for the conference.";
        assert!(!is_in_scope("news", text, &t));
    }

    #[test]
    fn own_locality_mention_rescues_item_despite_other_state() {
        let t = tenant();
        let text = "Springfield sent a delegation to Austin, TX for the conference.";
        assert!(is_in_scope("news", text, &t));
    }
}
