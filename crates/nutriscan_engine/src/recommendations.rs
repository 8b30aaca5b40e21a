//! Daily intake targets derived from a biometric profile.
//!
//! Basal metabolic rate uses the Mifflin-St Jeor equation (1990):
//! `BMR = 10 x weight_kg + 6.25 x height_cm - 5 x age + offset`, with an
//! offset of +5 for men and -161 for women. Energy expenditure scales BMR by
//! a fixed activity factor; macros split it 30/40/30 (protein/carbs/fat) at
//! 4/4/9 kcal per gram. Water is 35 ml per kg of body weight.

use nutriscan_client::{ActivityLevel, Sex};
use serde::Serialize;

use crate::profile::Profile;

const PROTEIN_SHARE: f64 = 0.30;
const CARBS_SHARE: f64 = 0.40;
const FAT_SHARE: f64 = 0.30;
const KCAL_PER_G_PROTEIN: f64 = 4.0;
const KCAL_PER_G_CARBS: f64 = 4.0;
const KCAL_PER_G_FAT: f64 = 9.0;
const WATER_ML_PER_KG: f64 = 35.0;

/// Derived targets. All zero means the profile is not configured yet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RecommendationSet {
    pub calories: u32,
    pub protein_g: u32,
    pub carbs_g: u32,
    pub fats_g: u32,
    pub water_ml: u32,
}

impl RecommendationSet {
    pub fn is_configured(&self) -> bool {
        *self != Self::default()
    }
}

pub fn activity_factor(level: ActivityLevel) -> f64 {
    match level {
        ActivityLevel::Sedentary => 1.20,
        ActivityLevel::Light => 1.375,
        ActivityLevel::Moderate => 1.55,
        ActivityLevel::Active => 1.725,
        ActivityLevel::VeryActive => 1.90,
    }
}

/// Basal metabolic rate in kcal/day, or `None` for an incomplete profile.
pub fn bmr(profile: &Profile) -> Option<f64> {
    if !profile.is_complete() {
        return None;
    }
    let weight = profile.weight_kg?;
    let height = profile.height_cm?;
    let age = f64::from(profile.age?);
    let offset = match profile.sex {
        Sex::Male => 5.0,
        Sex::Female => -161.0,
    };
    Some(10.0 * weight + 6.25 * height - 5.0 * age + offset)
}

pub fn compute(profile: &Profile) -> RecommendationSet {
    let (Some(bmr), Some(weight)) = (bmr(profile), profile.weight_kg) else {
        return RecommendationSet::default();
    };
    let calories = round_non_negative(bmr * activity_factor(profile.activity_level));
    let tdee = f64::from(calories);
    RecommendationSet {
        calories,
        protein_g: round_non_negative((tdee * PROTEIN_SHARE) / KCAL_PER_G_PROTEIN),
        carbs_g: round_non_negative((tdee * CARBS_SHARE) / KCAL_PER_G_CARBS),
        fats_g: round_non_negative((tdee * FAT_SHARE) / KCAL_PER_G_FAT),
        water_ml: round_non_negative(weight * WATER_ML_PER_KG),
    }
}

fn round_non_negative(x: f64) -> u32 {
    if x.is_finite() && x > 0.0 {
        x.round() as u32
    } else {
        0
    }
}
