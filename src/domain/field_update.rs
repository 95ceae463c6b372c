use serde::{Deserialize, Deserializer};

use super::FieldErrors;

/// Presence-tracking value for PATCH bodies.
///
/// Fields must carry `#[serde(default)]` so an absent key decodes to
/// `Unchanged`; an explicit `null` decodes to `Clear`.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate<T> {
    Unchanged,
    Clear,
    Set(T),
}

impl<T> Default for FieldUpdate<T> {
    fn default() -> Self {
        FieldUpdate::Unchanged
    }
}

impl<'de, T> Deserialize<'de> for FieldUpdate<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => FieldUpdate::Set(value),
            None => FieldUpdate::Clear,
        })
    }
}

impl<T> FieldUpdate<T> {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, FieldUpdate::Unchanged)
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            FieldUpdate::Set(value) => Some(value),
            _ => None,
        }
    }

    /// For nullable columns: `Some(None)` clears, `Some(Some(v))` sets.
    pub fn into_nullable(self) -> Option<Option<T>> {
        match self {
            FieldUpdate::Unchanged => None,
            FieldUpdate::Clear => Some(None),
            FieldUpdate::Set(value) => Some(Some(value)),
        }
    }

    /// For NOT NULL columns. Recording `Clear` as a field error.
    pub fn into_required(self, field: &str, errors: &mut FieldErrors) -> Option<T> {
        match self {
            FieldUpdate::Unchanged => None,
            FieldUpdate::Clear => {
                errors.add(field, "cannot be cleared");
                None
            }
            FieldUpdate::Set(value) => Some(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Patch {
        #[serde(default)]
        narration: FieldUpdate<String>,
        #[serde(default)]
        amount: FieldUpdate<f64>,
    }

    #[test]
    fn distinguishes_absent_null_and_value() {
        let patch: Patch = serde_json::from_str(r#"{"narration": null}"#).unwrap();
        assert_eq!(patch.narration, FieldUpdate::Clear);
        assert!(patch.amount.is_unchanged());

        let patch: Patch = serde_json::from_str(r#"{"amount": 12.5}"#).unwrap();
        assert_eq!(patch.amount.as_set(), Some(&12.5));
        assert!(patch.narration.is_unchanged());
    }

    #[test]
    fn clearing_a_required_field_is_an_error() {
        let mut errors = FieldErrors::default();
        assert_eq!(FieldUpdate::<f64>::Clear.into_required("amount", &mut errors), None);
        assert!(errors.contains("amount"));

        assert_eq!(FieldUpdate::Set(3.0).into_required("amount", &mut errors), Some(3.0));
        assert_eq!(FieldUpdate::<String>::Clear.into_nullable(), Some(None));
    }
}
