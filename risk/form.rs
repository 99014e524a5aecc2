// ========================================================================================
//                                Clinical Input Form
// ========================================================================================

use crate::align::FeatureRecord;
use itertools::Itertools;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormError {
    #[error("'{field}' must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("'{field}' must be a finite number, got {value}")]
    NotFinite { field: &'static str, value: f64 },
    #[error("'{field}' must be a whole number, got {value}")]
    NotIntegral { field: &'static str, value: f64 },
    #[error("'{value}' is not an option for '{field}'; expected one of: {options}")]
    UnknownOption {
        field: &'static str,
        value: String,
        options: String,
    },
    #[error("'{0}' is not a form field")]
    UnknownField(String),
    #[error("'{field}' expects {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },
    #[error("Failed to read patient file '{path}': {reason}")]
    PatientFile { path: PathBuf, reason: String },
}

/// A numeric input with its seeded default and accepted range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContinuousField {
    pub name: &'static str,
    pub label: &'static str,
    pub default: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub integral: bool,
}

impl ContinuousField {
    /// Accepts `value` only if it lies inside the field's range. Values are never clamped.
    pub fn check(&self, value: f64) -> Result<f64, FormError> {
        if !value.is_finite() {
            return Err(FormError::NotFinite {
                field: self.name,
                value,
            });
        }
        let min = self.min.unwrap_or(f64::NEG_INFINITY);
        let max = self.max.unwrap_or(f64::INFINITY);
        if value < min || value > max {
            return Err(FormError::OutOfRange {
                field: self.name,
                value,
                min,
                max,
            });
        }
        if self.integral && value.fract() != 0.0 {
            return Err(FormError::NotIntegral {
                field: self.name,
                value,
            });
        }
        Ok(value)
    }
}

/// A single-choice input. The first option is the reference category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoricalField {
    pub name: &'static str,
    pub options: &'static [&'static str],
}

impl CategoricalField {
    pub fn label(&self) -> String {
        self.name.replace('_', " ")
    }

    pub fn baseline(&self) -> &'static str {
        self.options[0]
    }

    /// Name of the indicator column for `option`.
    pub fn indicator(&self, option: &str) -> String {
        format!("{}_{}", self.name, option)
    }

    /// Indicator columns for every non-baseline option, in option order.
    pub fn indicators(&self) -> impl Iterator<Item = String> + '_ {
        self.options[1..].iter().map(|opt| self.indicator(opt))
    }

    /// Resolves user text to an option index. Matching ignores case and
    /// surrounding whitespace.
    pub fn position(&self, text: &str) -> Result<usize, FormError> {
        let wanted = text.trim();
        self.options
            .iter()
            .position(|opt| opt.to_lowercase() == wanted.to_lowercase())
            .ok_or_else(|| FormError::UnknownOption {
                field: self.name,
                value: wanted.to_string(),
                options: self.options.iter().join(", "),
            })
    }
}

const CONTINUOUS_COUNT: usize = 9;
const CATEGORICAL_COUNT: usize = 12;

pub static CONTINUOUS_FIELDS: [ContinuousField; CONTINUOUS_COUNT] = [
    ContinuousField {
        name: "Age",
        label: "Age",
        default: 45.0,
        min: Some(0.0),
        max: Some(100.0),
        integral: true,
    },
    ContinuousField {
        name: "CD4_Nadir",
        label: "CD4 nadir",
        default: 350.0,
        min: Some(0.0),
        max: None,
        integral: true,
    },
    ContinuousField {
        name: "CD8_Nadir",
        label: "CD8 nadir",
        default: 1000.0,
        min: Some(0.0),
        max: None,
        integral: true,
    },
    ContinuousField {
        name: "CD4_CD8_Ratio",
        label: "CD4/CD8 ratio",
        default: 0.5,
        min: Some(0.0),
        max: None,
        integral: false,
    },
    ContinuousField {
        name: "Cholesterol",
        label: "Total cholesterol (mg/dL)",
        default: 180.0,
        min: None,
        max: None,
        integral: false,
    },
    ContinuousField {
        name: "HDL",
        label: "HDL (mg/dL)",
        default: 50.0,
        min: None,
        max: None,
        integral: false,
    },
    ContinuousField {
        name: "Triglycerides",
        label: "Triglycerides (mg/dL)",
        default: 150.0,
        min: None,
        max: None,
        integral: false,
    },
    ContinuousField {
        name: "Non_HDL_Cholesterol",
        label: "Non-HDL cholesterol (mg/dL)",
        default: 130.0,
        min: None,
        max: None,
        integral: false,
    },
    ContinuousField {
        name: "Triglyceride_HDL_Ratio",
        label: "Triglyceride/HDL ratio",
        default: 3.0,
        min: None,
        max: None,
        integral: false,
    },
];

pub static CATEGORICAL_FIELDS: [CategoricalField; CATEGORICAL_COUNT] = [
    CategoricalField {
        name: "Sex",
        options: &["Man", "Woman"],
    },
    CategoricalField {
        name: "Transmission_mode",
        options: &[
            "Homo/Bisexual",
            "Injecting Drug User",
            "Heterosexual",
            "Other or Unknown",
        ],
    },
    CategoricalField {
        name: "Origin",
        options: &["Spain", "Not Spain"],
    },
    CategoricalField {
        name: "Education_Level",
        options: &[
            "No studies",
            "Primary",
            "Secondary/High School",
            "University",
            "Other/Unknown",
        ],
    },
    CategoricalField {
        name: "AIDS",
        options: &["No", "Yes"],
    },
    CategoricalField {
        name: "Viral_Load",
        options: &["< 100.000 copies/ml", "≥ 100.000 copies/ml"],
    },
    CategoricalField {
        name: "ART",
        options: &["2NRTI+1NNRTI", "2NRTI+1IP", "2NRTI+1II", "Other"],
    },
    CategoricalField {
        name: "Hepatitis_C",
        options: &["Negative", "Positive"],
    },
    CategoricalField {
        name: "Anticore_HBV",
        options: &["Negative", "Positive"],
    },
    CategoricalField {
        name: "HBP",
        options: &["No", "Yes"],
    },
    CategoricalField {
        name: "Smoking",
        options: &["No Smoking", "Current Smoking", "Past Smoking"],
    },
    CategoricalField {
        name: "Diabetes",
        options: &["No", "Yes"],
    },
];

pub fn continuous_field(name: &str) -> Option<&'static ContinuousField> {
    CONTINUOUS_FIELDS.iter().find(|f| f.name == name)
}

pub fn categorical_field(name: &str) -> Option<&'static CategoricalField> {
    CATEGORICAL_FIELDS.iter().find(|f| f.name == name)
}

/// Current contents of the form: one value per continuous field and one
/// selected option per categorical field, indexed like the field tables.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientForm {
    values: [f64; CONTINUOUS_COUNT],
    selections: [usize; CATEGORICAL_COUNT],
}

impl Default for PatientForm {
    /// Every numeric field at its default, every selector on its baseline.
    fn default() -> Self {
        Self {
            values: CONTINUOUS_FIELDS.map(|f| f.default),
            selections: [0; CATEGORICAL_COUNT],
        }
    }
}

impl PatientForm {
    /// Reads a patient file of `Field = value` pairs, e.g. `Age = 52` or
    /// `AIDS = "Yes"`. Fields that are not mentioned keep their defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self, FormError> {
        let text = fs::read_to_string(path).map_err(|e| FormError::PatientFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text).map_err(|e| match e {
            FormError::PatientFile { reason, .. } => FormError::PatientFile {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    pub fn from_toml_str(text: &str) -> Result<Self, FormError> {
        let table: toml::Table = toml::from_str(text).map_err(|e| FormError::PatientFile {
            path: PathBuf::new(),
            reason: e.to_string(),
        })?;
        let mut form = Self::default();
        for (key, value) in &table {
            if continuous_field(key).is_some() {
                let number = match value {
                    toml::Value::Integer(i) => *i as f64,
                    toml::Value::Float(x) => *x,
                    _ => {
                        return Err(FormError::WrongType {
                            field: key.clone(),
                            expected: "a number",
                        });
                    }
                };
                form.set_value(key, number)?;
            } else if categorical_field(key).is_some() {
                let text = value.as_str().ok_or_else(|| FormError::WrongType {
                    field: key.clone(),
                    expected: "one of its options as a string",
                })?;
                form.select(key, text)?;
            } else {
                return Err(FormError::UnknownField(key.clone()));
            }
        }
        Ok(form)
    }

    /// Sets a continuous field after range validation.
    pub fn set_value(&mut self, name: &str, value: f64) -> Result<(), FormError> {
        let idx = CONTINUOUS_FIELDS
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| FormError::UnknownField(name.to_string()))?;
        self.values[idx] = CONTINUOUS_FIELDS[idx].check(value)?;
        Ok(())
    }

    /// Selects an option of a categorical field.
    pub fn select(&mut self, name: &str, option: &str) -> Result<(), FormError> {
        let idx = CATEGORICAL_FIELDS
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| FormError::UnknownField(name.to_string()))?;
        self.selections[idx] = CATEGORICAL_FIELDS[idx].position(option)?;
        Ok(())
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        CONTINUOUS_FIELDS
            .iter()
            .position(|f| f.name == name)
            .map(|idx| self.values[idx])
    }

    pub fn selection(&self, name: &str) -> Option<&'static str> {
        CATEGORICAL_FIELDS
            .iter()
            .position(|f| f.name == name)
            .map(|idx| CATEGORICAL_FIELDS[idx].options[self.selections[idx]])
    }

    /// Produces the raw record: all continuous values, then every indicator
    /// column of every categorical field.
    pub fn to_record(&self) -> FeatureRecord {
        let mut record = FeatureRecord::new();
        for (field, value) in CONTINUOUS_FIELDS.iter().zip(self.values) {
            record.insert(field.name, value);
        }
        for (field, &selected) in CATEGORICAL_FIELDS.iter().zip(&self.selections) {
            for (idx, option) in field.options.iter().enumerate().skip(1) {
                let indicator = if idx == selected { 1.0 } else { 0.0 };
                record.insert(field.indicator(option), indicator);
            }
        }
        record
    }
}

impl fmt::Display for PatientForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (field, value) in CONTINUOUS_FIELDS.iter().zip(self.values) {
            writeln!(f, "  {:<28} {}", field.label, value)?;
        }
        for (field, &selected) in CATEGORICAL_FIELDS.iter().zip(&self.selections) {
            writeln!(f, "  {:<28} {}", field.label(), field.options[selected])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_produce_baseline_record() {
        let record = PatientForm::default().to_record();
        assert_eq!(record.get("Age"), Some(45.0));
        assert_eq!(record.get("CD8_Nadir"), Some(1000.0));
        assert_eq!(record.get("Triglyceride_HDL_Ratio"), Some(3.0));
        assert_eq!(record.get("AIDS_Yes"), Some(0.0));
        assert_eq!(record.get("Sex_Man"), None);
        let indicator_count: usize = CATEGORICAL_FIELDS.iter().map(|f| f.options.len() - 1).sum();
        assert_eq!(record.len(), CONTINUOUS_FIELDS.len() + indicator_count);
        assert!(record.iter().skip(CONTINUOUS_FIELDS.len()).all(|(_, v)| v == 0.0));
    }

    #[test]
    fn indicators_are_exclusive_per_variable() {
        for field in &CATEGORICAL_FIELDS {
            for option in field.options {
                let mut form = PatientForm::default();
                form.select(field.name, option).unwrap();
                let record = form.to_record();
                let hot: Vec<String> = field
                    .indicators()
                    .filter(|col| record.get(col) == Some(1.0))
                    .collect();
                if *option == field.baseline() {
                    assert!(hot.is_empty(), "{}: baseline must set no indicator", field.name);
                } else {
                    assert_eq!(hot, vec![field.indicator(option)]);
                }
            }
        }
    }

    #[test]
    fn indicator_names_concatenate_variable_and_option() {
        let viral = categorical_field("Viral_Load").unwrap();
        assert_eq!(
            viral.indicators().collect::<Vec<_>>(),
            vec!["Viral_Load_≥ 100.000 copies/ml".to_string()]
        );
        assert_eq!(viral.label(), "Viral Load");
    }

    #[test]
    fn age_outside_range_is_rejected() {
        let mut form = PatientForm::default();
        assert!(matches!(
            form.set_value("Age", -1.0),
            Err(FormError::OutOfRange { field: "Age", .. })
        ));
        assert!(form.set_value("Age", 101.0).is_err());
        assert!(matches!(
            form.set_value("Age", 45.5),
            Err(FormError::NotIntegral { .. })
        ));
        assert_eq!(form.value("Age"), Some(45.0));
        form.set_value("Age", 100.0).unwrap();
        assert_eq!(form.value("Age"), Some(100.0));
    }

    #[test]
    fn non_finite_values_are_rejected() {
        let mut form = PatientForm::default();
        assert!(matches!(
            form.set_value("HDL", f64::NAN),
            Err(FormError::NotFinite { .. })
        ));
        assert!(form.set_value("CD4_CD8_Ratio", -0.1).is_err());
        form.set_value("Cholesterol", -5.0).unwrap();
    }

    #[test]
    fn option_matching_ignores_case_and_padding() {
        let mut form = PatientForm::default();
        form.select("Smoking", "  past smoking ").unwrap();
        assert_eq!(form.selection("Smoking"), Some("Past Smoking"));
        assert!(matches!(
            form.select("Smoking", "Sometimes"),
            Err(FormError::UnknownOption { .. })
        ));
        assert!(matches!(
            form.select("Hair_Colour", "Red"),
            Err(FormError::UnknownField(_))
        ));
    }

    #[test]
    fn patient_file_overrides_defaults() {
        let form = PatientForm::from_toml_str(
            "Age = 61\nCD4_CD8_Ratio = 0.8\nAIDS = \"Yes\"\nSmoking = \"Current Smoking\"\n",
        )
        .unwrap();
        assert_eq!(form.value("Age"), Some(61.0));
        assert_eq!(form.value("HDL"), Some(50.0));
        assert_eq!(form.selection("AIDS"), Some("Yes"));
        let record = form.to_record();
        assert_eq!(record.get("Smoking_Current Smoking"), Some(1.0));
        assert_eq!(record.get("Smoking_Past Smoking"), Some(0.0));
    }

    #[test]
    fn patient_file_rejects_bad_entries() {
        assert!(matches!(
            PatientForm::from_toml_str("Weight = 80\n"),
            Err(FormError::UnknownField(_))
        ));
        assert!(matches!(
            PatientForm::from_toml_str("Age = \"old\"\n"),
            Err(FormError::WrongType { .. })
        ));
        assert!(matches!(
            PatientForm::from_toml_str("AIDS = 1\n"),
            Err(FormError::WrongType { .. })
        ));
        assert!(matches!(
            PatientForm::from_toml_str("Age = 130\n"),
            Err(FormError::OutOfRange { .. })
        ));
    }
}
