//! Regional attribution from author email domains
//!
//! A fixed lookup table maps exact domains and country-code suffixes to
//! region names; configuration can layer overrides on top. Anything
//! unmapped folds into `Unknown`.

use std::collections::BTreeMap;

pub const UNKNOWN_REGION: &str = "Unknown";

/// Exact-domain entries checked before the suffix table. Generic mail
/// providers intentionally resolve to Unknown.
const EXACT_DOMAINS: &[(&str, &str)] = &[
    ("gmail.com", UNKNOWN_REGION),
    ("googlemail.com", UNKNOWN_REGION),
    ("outlook.com", UNKNOWN_REGION),
    ("hotmail.com", UNKNOWN_REGION),
    ("yahoo.com", UNKNOWN_REGION),
    ("protonmail.com", UNKNOWN_REGION),
    ("users.noreply.github.com", UNKNOWN_REGION),
];

/// Country-code TLD → region.
const SUFFIX_TABLE: &[(&str, &str)] = &[
    ("au", "Australia"),
    ("br", "Brazil"),
    ("ca", "Canada"),
    ("ch", "Switzerland"),
    ("cn", "China"),
    ("cz", "Czech Republic"),
    ("de", "Germany"),
    ("dk", "Denmark"),
    ("es", "Spain"),
    ("fi", "Finland"),
    ("fr", "France"),
    ("ie", "Ireland"),
    ("il", "Israel"),
    ("in", "India"),
    ("it", "Italy"),
    ("jp", "Japan"),
    ("kr", "South Korea"),
    ("mx", "Mexico"),
    ("nl", "Netherlands"),
    ("no", "Norway"),
    ("nz", "New Zealand"),
    ("pl", "Poland"),
    ("pt", "Portugal"),
    ("ru", "Russia"),
    ("se", "Sweden"),
    ("sg", "Singapore"),
    ("ua", "Ukraine"),
    ("uk", "United Kingdom"),
    ("us", "United States"),
];

/// Resolver carrying the fixed table plus configured overrides.
#[derive(Debug, Clone, Default)]
pub struct RegionResolver {
    overrides: BTreeMap<String, String>,
}

impl RegionResolver {
    pub fn new(overrides: BTreeMap<String, String>) -> Self {
        Self {
            overrides: overrides
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect(),
        }
    }

    /// Region for an author email. Overrides win over the exact table,
    /// which wins over the country-code suffix.
    pub fn region_for_email(&self, email: &str) -> String {
        let Some(domain) = gitscope_utils::text::email_domain(email) else {
            return UNKNOWN_REGION.to_string();
        };

        if let Some(region) = self.overrides.get(&domain) {
            return region.clone();
        }
        if let Some((_, region)) = EXACT_DOMAINS.iter().find(|(d, _)| *d == domain) {
            return region.to_string();
        }
        if let Some(tld) = domain.rsplit('.').next() {
            if let Some((_, region)) = SUFFIX_TABLE.iter().find(|(s, _)| *s == tld) {
                return region.to_string();
            }
        }
        UNKNOWN_REGION.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_country_suffix_resolution() {
        let resolver = RegionResolver::default();
        assert_eq!(resolver.region_for_email("dev@company.co.in"), "India");
        assert_eq!(resolver.region_for_email("dev@institut.fr"), "France");
        assert_eq!(resolver.region_for_email("dev@lab.ac.uk"), "United Kingdom");
    }

    #[test]
    fn test_generic_providers_fold_to_unknown() {
        let resolver = RegionResolver::default();
        assert_eq!(resolver.region_for_email("someone@gmail.com"), UNKNOWN_REGION);
        assert_eq!(resolver.region_for_email("x@users.noreply.github.com"), UNKNOWN_REGION);
    }

    #[test]
    fn test_unmapped_domain_is_unknown() {
        let resolver = RegionResolver::default();
        assert_eq!(resolver.region_for_email("dev@example.com"), UNKNOWN_REGION);
        assert_eq!(resolver.region_for_email("not-an-email"), UNKNOWN_REGION);
    }

    #[test]
    fn test_overrides_win() {
        let mut overrides = BTreeMap::new();
        overrides.insert("Example.COM".to_string(), "Acme HQ".to_string());
        let resolver = RegionResolver::new(overrides);
        assert_eq!(resolver.region_for_email("dev@example.com"), "Acme HQ");
    }
}
