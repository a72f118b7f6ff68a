use curator_core::NormalizationConfig;

/// Lowercase and collapse whitespace. Punctuation is kept, so `C++` and
/// `C` stay different words.
pub fn fold(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Like [`fold`], but punctuation becomes a word break. Used for keyword
/// matching, never for signatures.
pub fn clean(text: &str) -> String {
    let lowercase = text.to_lowercase();
    let cleaned: String = lowercase
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text normalizer used for both titles and descriptions.
#[derive(Debug, Clone)]
pub struct Normalizer {
    /// Word sequences, longest first.
    leading_fillers: Vec<Vec<String>>,
    trailing_suffixes: Vec<String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(&NormalizationConfig::default())
    }
}

impl Normalizer {
    pub fn new(config: &NormalizationConfig) -> Self {
        let mut leading_fillers: Vec<Vec<String>> = config
            .leading_fillers
            .iter()
            .map(|filler| fold(filler).split(' ').map(str::to_string).collect::<Vec<_>>())
            .filter(|words: &Vec<String>| words.iter().any(|w| !w.is_empty()))
            .collect();
        leading_fillers.sort_by(|a, b| b.len().cmp(&a.len()));
        leading_fillers.dedup();

        let trailing_suffixes = config
            .trailing_suffixes
            .iter()
            .map(|suffix| fold(suffix))
            .filter(|suffix| !suffix.is_empty())
            .collect();

        Self {
            leading_fillers,
            trailing_suffixes,
        }
    }

    pub fn normalize(&self, text: &str) -> String {
        let folded = fold(text);
        let mut words: Vec<&str> = folded.split(' ').filter(|w| !w.is_empty()).collect();

        if let Some(filler) = self
            .leading_fillers
            .iter()
            .find(|filler| starts_with_words(&words, filler))
            && words.len() > filler.len()
        {
            words.drain(..filler.len());
        }

        if words.len() > 1
            && let Some(last) = words.last()
            && self.trailing_suffixes.iter().any(|suffix| suffix == last)
        {
            words.pop();
        }

        words.join(" ")
    }
}

fn starts_with_words(words: &[&str], filler: &[String]) -> bool {
    filler.len() <= words.len() && filler.iter().zip(words).all(|(f, w)| f == w)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_lowercases_and_drops_punctuation() {
        assert_eq!(clean("  Water-Tank   Support!! "), "water tank support");
        assert_eq!(clean("Farmers' Seed Bank"), "farmers seed bank");
    }

    #[test]
    fn strips_one_filler_and_one_suffix() {
        let n = Normalizer::default();
        assert_eq!(n.normalize("Platform to Connect Farmers"), "connect farmers");
        assert_eq!(n.normalize("Bicycle Bank"), "bicycle");
        assert_eq!(n.normalize("Provide Support Hub"), "support");
        assert_eq!(n.normalize("Set up Village Library Network"), "village library");
    }

    #[test]
    fn longest_filler_wins() {
        let n = Normalizer::default();
        assert_eq!(n.normalize("App to Track Buses"), "track buses");
        assert_eq!(n.normalize("To Track Buses"), "track buses");
    }

    #[test]
    fn never_strips_to_empty() {
        let n = Normalizer::default();
        assert_eq!(n.normalize("Support"), "support");
        assert_eq!(n.normalize("Fund"), "fund");
        assert_eq!(n.normalize("Create Platform"), "platform");
        assert_eq!(n.normalize("   "), "");
    }

    #[test]
    fn punctuation_is_part_of_the_signature() {
        let n = Normalizer::default();
        assert_eq!(fold("  Water   TANK\tSupport "), "water tank support");
        assert_eq!(n.normalize("  water   tank SUPPORT"), "water tank");
        assert_eq!(n.normalize("C++ Coding Club"), "c++ coding club");
        assert_ne!(n.normalize("C++ Coding Club"), n.normalize("C Coding Club"));
        assert_eq!(n.normalize("Water Tank Support!"), "water tank support!");
    }

    #[test]
    fn custom_lists_are_honoured() {
        let n = Normalizer::new(&NormalizationConfig {
            leading_fillers: vec!["Launch".into()],
            trailing_suffixes: vec!["Drive".into()],
        });
        assert_eq!(n.normalize("Launch Book Donation Drive"), "book donation");
        assert_eq!(n.normalize("Create Book Platform"), "create book platform");
    }
}
