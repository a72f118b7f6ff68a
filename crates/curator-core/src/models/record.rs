use serde::{Deserialize, Serialize};

use crate::error::ClassificationError;

// ─── RecordField ────────────────────────────────────────────

/// The six required keys of a catalog record, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordField {
    Title,
    Description,
    Category,
    Impact,
    Beneficiaries,
    Icon,
}

impl RecordField {
    pub const ALL: [RecordField; 6] = [
        RecordField::Title,
        RecordField::Description,
        RecordField::Category,
        RecordField::Impact,
        RecordField::Beneficiaries,
        RecordField::Icon,
    ];

    pub fn key(self) -> &'static str {
        match self {
            RecordField::Title => "title",
            RecordField::Description => "description",
            RecordField::Category => "category",
            RecordField::Impact => "impact",
            RecordField::Beneficiaries => "beneficiaries",
            RecordField::Icon => "icon",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.key() == key)
    }

    fn index(self) -> usize {
        self as usize
    }
}

// ─── Record ─────────────────────────────────────────────────

/// One initiative entry. All six fields are required and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    pub title: String,
    pub description: String,
    pub category: String,
    pub impact: String,
    pub beneficiaries: String,
    pub icon: String,
}

impl Record {
    pub fn get(&self, field: RecordField) -> &str {
        match field {
            RecordField::Title => &self.title,
            RecordField::Description => &self.description,
            RecordField::Category => &self.category,
            RecordField::Impact => &self.impact,
            RecordField::Beneficiaries => &self.beneficiaries,
            RecordField::Icon => &self.icon,
        }
    }

    /// Reject records with blank fields. `position` and `line` are only used
    /// to make the error point at the offending entry.
    pub fn validate(&self, position: usize, line: usize) -> Result<(), ClassificationError> {
        for field in RecordField::ALL {
            if self.get(field).trim().is_empty() {
                return Err(ClassificationError::EmptyField {
                    position,
                    line,
                    title: non_empty(&self.title),
                    field: field.key(),
                });
            }
        }
        Ok(())
    }
}

/// Field values collected while a record literal is being scanned.
#[derive(Debug, Clone, Default)]
pub struct RecordFields {
    values: [Option<String>; 6],
    repeated: Option<RecordField>,
}

impl RecordFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value. A repeated key is remembered and reported by
    /// [`RecordFields::into_record`] rather than overwriting silently.
    pub fn set(&mut self, field: RecordField, value: String) {
        let slot = &mut self.values[field.index()];
        if slot.is_some() {
            self.repeated.get_or_insert(field);
        } else {
            *slot = Some(value);
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.values[RecordField::Title.index()].as_deref()
    }

    pub fn into_record(self, position: usize, line: usize) -> Result<Record, ClassificationError> {
        let title = self.title().and_then(non_empty);

        if let Some(field) = self.repeated {
            return Err(ClassificationError::DuplicateField {
                position,
                line,
                title,
                field: field.key(),
            });
        }

        if let Some(field) = RecordField::ALL
            .into_iter()
            .find(|field| self.values[field.index()].is_none())
        {
            return Err(ClassificationError::MissingField {
                position,
                line,
                title,
                field: field.key(),
            });
        }

        let [title_v, description, category, impact, beneficiaries, icon] =
            self.values.map(Option::unwrap_or_default);
        let record = Record {
            title: title_v,
            description,
            category,
            impact,
            beneficiaries,
            icon,
        };
        record.validate(position, line)?;
        Ok(record)
    }
}

// ─── RecordRef ──────────────────────────────────────────────

/// How a record is identified in reports and the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRef {
    /// 0-based index in the parsed sequence.
    pub position: usize,
    /// 1-based source line of the record's opening brace.
    pub line: usize,
    pub title: String,
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_fields() -> RecordFields {
        let mut fields = RecordFields::new();
        fields.set(RecordField::Title, "Water Tank Support".into());
        fields.set(RecordField::Description, "Tanks for villages.".into());
        fields.set(RecordField::Category, "water".into());
        fields.set(RecordField::Impact, "Clean water".into());
        fields.set(RecordField::Beneficiaries, "1M+ villagers".into());
        fields.set(RecordField::Icon, "tint".into());
        fields
    }

    #[test]
    fn complete_fields_build_a_record() {
        let record = full_fields().into_record(0, 1).unwrap();
        assert_eq!(record.title, "Water Tank Support");
        assert_eq!(record.get(RecordField::Icon), "tint");
    }

    #[test]
    fn missing_icon_is_reported_with_title() {
        let mut fields = RecordFields::new();
        fields.set(RecordField::Title, "Bicycle Bank".into());
        fields.set(RecordField::Description, "Bikes".into());
        fields.set(RecordField::Category, "mobility".into());
        fields.set(RecordField::Impact, "Mobility".into());
        fields.set(RecordField::Beneficiaries, "Students".into());

        let err = fields.into_record(4, 40).unwrap_err();
        assert_eq!(
            err,
            ClassificationError::MissingField {
                position: 4,
                line: 40,
                title: Some("Bicycle Bank".to_string()),
                field: "icon",
            }
        );
    }

    #[test]
    fn repeated_key_is_rejected() {
        let mut fields = full_fields();
        fields.set(RecordField::Category, "health".into());
        let err = fields.into_record(1, 9).unwrap_err();
        assert!(matches!(
            err,
            ClassificationError::DuplicateField { field: "category", .. }
        ));
    }

    #[test]
    fn whitespace_only_field_is_empty() {
        let mut record = full_fields().into_record(0, 1).unwrap();
        record.impact = "   ".into();
        let err = record.validate(2, 12).unwrap_err();
        assert!(matches!(err, ClassificationError::EmptyField { field: "impact", .. }));
    }

    #[test]
    fn field_keys_round_trip() {
        for field in RecordField::ALL {
            assert_eq!(RecordField::from_key(field.key()), Some(field));
        }
        assert_eq!(RecordField::from_key("color"), None);
    }
}
