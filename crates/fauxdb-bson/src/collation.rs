//! Minimal collation support: enough to distinguish "simple" (binary)
//! comparison from a locale-flavored comparison that is at least
//! case-insensitive, matching the bar the spec sets ("missing or `simple`
//! yields binary comparison").

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collation {
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub strength: Option<i32>,
    #[serde(rename = "caseLevel", default)]
    pub case_level: Option<bool>,
}

impl Collation {
    pub fn simple() -> Self {
        Self {
            locale: None,
            strength: None,
            case_level: None,
        }
    }

    pub fn is_simple(&self) -> bool {
        self.locale.as_deref().is_none_or(|l| l == "simple")
    }

    /// Strength 1 (primary) and 2 (secondary) ignore case; 3 (tertiary,
    /// the default once a non-simple locale is set) and above are
    /// case-sensitive. Real ICU collation also orders diacritics and
    /// punctuation differently per locale; that tier is out of scope here.
    fn case_insensitive(&self) -> bool {
        !self.is_simple() && self.strength.unwrap_or(3) < 3
    }

    pub fn compare_strings(&self, a: &str, b: &str) -> Ordering {
        if self.is_simple() {
            return a.cmp(b);
        }
        if self.case_insensitive() {
            a.to_lowercase().cmp(&b.to_lowercase())
        } else {
            a.cmp(b)
        }
    }

    pub fn strings_equal(&self, a: &str, b: &str) -> bool {
        self.compare_strings(a, b) == Ordering::Equal
    }
}

impl Default for Collation {
    fn default() -> Self {
        Self::simple()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_collation_is_binary() {
        let c = Collation::simple();
        assert_ne!(c.compare_strings("a", "A"), Ordering::Equal);
    }

    #[test]
    fn case_insensitive_locale_folds_case() {
        let c = Collation {
            locale: Some("en".into()),
            strength: Some(2),
            case_level: None,
        };
        assert!(c.strings_equal("Hello", "hello"));
    }
}
