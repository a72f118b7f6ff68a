pub mod audit;
pub mod dedup;
pub mod normalize;
pub mod pipeline;
pub mod similarity;
pub mod themes;

pub use audit::{AuditEntry, AuditLog, MatchRule, Tier};
pub use dedup::{Classification, Classifier, DuplicateGroup};
pub use normalize::Normalizer;
pub use pipeline::{
    RestoreReport, RunOptions, RunReport, ThemeCount, ValidationReport, restore, run, scan,
    theme_census, validate,
};
pub use similarity::{NearRule, PairMatch, Signature};
pub use themes::{Theme, ThemeVocabulary};
