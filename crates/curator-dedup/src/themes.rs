use std::collections::BTreeMap;

use serde::Serialize;

use crate::normalize::clean;

const BUILTIN_THEMES: &[(&str, &[&str])] = &[
    ("bicycle", &["bicycle", "bike", "cycle"]),
    ("water", &["water tank", "water supply", "water filter"]),
    (
        "emergency-fund",
        &["emergency fund", "emergency relief", "disaster fund", "crisis fund"],
    ),
    ("health-camp", &["health camp", "medical camp"]),
    ("farmer-support", &["farmer", "agriculture"]),
    ("free-education", &["free education", "free coaching"]),
    (
        "village",
        &[
            "village paradise",
            "village transformation",
            "rural paradise",
            "village sovereignty",
        ],
    ),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Theme {
    pub name: String,
    pub keywords: Vec<String>,
    pub builtin: bool,
}

/// Named keyword sets used by thematic caps and the census.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeVocabulary {
    themes: BTreeMap<String, Theme>,
}

impl Default for ThemeVocabulary {
    fn default() -> Self {
        let themes = BUILTIN_THEMES
            .iter()
            .map(|(name, keywords)| {
                let theme = Theme {
                    name: name.to_string(),
                    keywords: keywords.iter().map(|k| k.to_string()).collect(),
                    builtin: true,
                };
                (name.to_string(), theme)
            })
            .collect();
        Self { themes }
    }
}

impl ThemeVocabulary {
    /// Built-in themes plus user themes. A user theme with a built-in name
    /// adds its keywords to the built-in list.
    pub fn with_custom(custom: &BTreeMap<String, Vec<String>>) -> Self {
        let mut vocabulary = Self::default();
        for (name, keywords) in custom {
            let theme = vocabulary
                .themes
                .entry(name.clone())
                .or_insert_with(|| Theme {
                    name: name.clone(),
                    keywords: Vec::new(),
                    builtin: false,
                });
            for keyword in keywords {
                let keyword = keyword.trim();
                if !keyword.is_empty() && !theme.keywords.iter().any(|k| k == keyword) {
                    theme.keywords.push(keyword.to_string());
                }
            }
        }
        vocabulary
    }

    pub fn contains(&self, name: &str) -> bool {
        self.themes.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Theme> {
        self.themes.get(name)
    }

    /// Themes in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Theme> {
        self.themes.values()
    }

    /// Whether `title` contains a keyword of `theme` at a word start.
    pub fn matches(&self, theme: &str, title: &str) -> bool {
        self.themes
            .get(theme)
            .is_some_and(|theme| theme.matches(title))
    }

    /// Names of every theme `title` belongs to.
    pub fn themes_of(&self, title: &str) -> Vec<&str> {
        self.themes
            .values()
            .filter(|theme| theme.matches(title))
            .map(|theme| theme.name.as_str())
            .collect()
    }
}

impl Theme {
    pub fn matches(&self, title: &str) -> bool {
        let haystack = format!(" {}", clean(title));
        self.keywords.iter().any(|keyword| {
            let keyword = clean(keyword);
            !keyword.is_empty() && haystack.contains(&format!(" {keyword}"))
        })
    }
}
