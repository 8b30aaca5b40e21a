//! Editable biometric profile and the field-level edits applied to it.

use nutriscan_client::{ActivityLevel, ProfileUpdate, Sex, UserRecord};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Profile as shown in the editing form. Numeric fields are absent while
/// the corresponding input is empty.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub age: Option<u32>,
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub sex: Sex,
    pub activity_level: ActivityLevel,
}

impl Profile {
    /// Age, weight and height are all present and positive.
    pub fn is_complete(&self) -> bool {
        matches!(self.age, Some(a) if a > 0)
            && matches!(self.weight_kg, Some(w) if w.is_finite() && w > 0.0)
            && matches!(self.height_cm, Some(h) if h.is_finite() && h > 0.0)
    }

    /// The full field set to persist, or `None` while the profile is incomplete.
    pub fn to_update(&self) -> Option<ProfileUpdate> {
        if !self.is_complete() {
            return None;
        }
        Some(ProfileUpdate {
            age: self.age?,
            weight: self.weight_kg?,
            height: self.height_cm?,
            sex: self.sex,
            activity_level: self.activity_level,
        })
    }

    pub fn apply(&mut self, field: ProfileField) {
        match field {
            ProfileField::Age(v) => self.age = v,
            ProfileField::WeightKg(v) => self.weight_kg = v,
            ProfileField::HeightCm(v) => self.height_cm = v,
            ProfileField::Sex(v) => self.sex = v,
            ProfileField::ActivityLevel(v) => self.activity_level = v,
        }
    }
}

impl From<&UserRecord> for Profile {
    fn from(u: &UserRecord) -> Self {
        Self {
            age: u.age,
            weight_kg: u.weight,
            height_cm: u.height,
            sex: u.sex.unwrap_or_default(),
            activity_level: u.activity_level.unwrap_or_default(),
        }
    }
}

/// A single edit to one profile field.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ProfileField {
    Age(Option<u32>),
    WeightKg(Option<f64>),
    HeightCm(Option<f64>),
    Sex(Sex),
    ActivityLevel(ActivityLevel),
}

impl ProfileField {
    /// Parse raw form input. An empty value clears a numeric field.
    pub fn parse(name: &str, value: &str) -> EngineResult<Self> {
        let value = value.trim();
        match name {
            "age" => parse_opt(value, name).map(ProfileField::Age),
            "weight" | "weight_kg" => parse_opt_real(value, name).map(ProfileField::WeightKg),
            "height" | "height_cm" => parse_opt_real(value, name).map(ProfileField::HeightCm),
            "sex" => value
                .parse()
                .map(ProfileField::Sex)
                .map_err(EngineError::Validation),
            "activity_level" => value
                .parse()
                .map(ProfileField::ActivityLevel)
                .map_err(EngineError::Validation),
            other => Err(EngineError::Validation(format!(
                "unknown profile field: {other}"
            ))),
        }
    }
}

fn parse_opt<T: std::str::FromStr>(value: &str, name: &str) -> EngineResult<Option<T>> {
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<T>()
        .map(Some)
        .map_err(|_| EngineError::Validation(format!("{name}: not a number: {value}")))
}

fn parse_opt_real(value: &str, name: &str) -> EngineResult<Option<f64>> {
    match parse_opt::<f64>(value, name)? {
        Some(v) if !v.is_finite() => Err(EngineError::Validation(format!(
            "{name}: not a finite number: {value}"
        ))),
        other => Ok(other),
    }
}
