use std::fmt;

/// Label language of a string tile.
///
/// Data tiles carry no language of their own; they are always pinned to
/// [`Language::CANONICAL`], and string tiles generated in that language are
/// guaranteed to match the geometry of the data tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Language {
    English,
    Swedish,
    German,
    Danish,
    Finnish,
    Norwegian,
    Italian,
    Dutch,
    Spanish,
    French,
    Portuguese,
    Polish,
}

impl Language {
    /// The language every data tile is generated in.
    pub const CANONICAL: Language = Language::Swedish;

    /// Every supported language, in code order.
    pub const ALL: [Language; 12] = [
        Language::English,
        Language::Swedish,
        Language::German,
        Language::Danish,
        Language::Finnish,
        Language::Norwegian,
        Language::Italian,
        Language::Dutch,
        Language::Spanish,
        Language::French,
        Language::Portuguese,
        Language::Polish,
    ];

    /// Two-letter code used in descriptor strings.
    pub fn code(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Swedish => "sv",
            Language::German => "de",
            Language::Danish => "da",
            Language::Finnish => "fi",
            Language::Norwegian => "no",
            Language::Italian => "it",
            Language::Dutch => "nl",
            Language::Spanish => "es",
            Language::French => "fr",
            Language::Portuguese => "pt",
            Language::Polish => "pl",
        }
    }

    /// Look up a language by its two-letter code.
    pub fn from_code(code: &str) -> Option<Language> {
        Language::ALL.iter().copied().find(|lang| lang.code() == code)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique() {
        for (i, a) in Language::ALL.iter().enumerate() {
            for b in &Language::ALL[i + 1..] {
                assert_ne!(a.code(), b.code());
            }
        }
    }

    #[test]
    fn test_from_code() {
        assert_eq!(Language::from_code("sv"), Some(Language::Swedish));
        assert_eq!(Language::from_code("en"), Some(Language::English));
        assert_eq!(Language::from_code("xx"), None);
        assert_eq!(Language::from_code(""), None);
    }

    #[test]
    fn test_canonical_is_swedish() {
        assert_eq!(Language::CANONICAL, Language::Swedish);
        assert_eq!(Language::CANONICAL.to_string(), "sv");
    }
}
