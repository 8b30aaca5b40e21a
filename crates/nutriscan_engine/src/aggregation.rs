//! Daily and period views over raw food-log data.
//!
//! Everything here is pure: identical inputs always give identical,
//! same-order outputs.

use std::collections::HashMap;

use chrono::{Datelike, Days, NaiveDate};
use nutriscan_client::{DayTotal, LogItem, PeriodRange};
use serde::Serialize;

use crate::error::{EngineError, EngineResult};

pub type LogEntry = LogItem;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub items: Vec<LogEntry>,
    pub total_calories: f64,
}

/// One day of a weekly or monthly view, split against the calorie goal.
/// `base_calories + excess_calories == total_calories`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PeriodSummary {
    pub date: NaiveDate,
    pub total_calories: f64,
    pub calorie_goal: f64,
    pub excess_calories: f64,
    pub base_calories: f64,
}

/// Entries are expected to be scoped to `date` already.
pub fn daily_view(date: NaiveDate, entries: Vec<LogEntry>) -> DailySummary {
    let total_calories = entries.iter().map(|e| e.calories).sum();
    DailySummary {
        date,
        items: entries,
        total_calories,
    }
}

/// Intake against the daily goal. `percent_of_goal` is absent while no
/// positive goal is known.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DailyProgress {
    pub date: NaiveDate,
    pub total_calories: f64,
    pub calorie_goal: f64,
    pub percent_of_goal: Option<u32>,
    pub items_logged: usize,
}

/// One food's part of a day's calories. `share` is in `0.0..=1.0`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FoodShare {
    pub food_name: String,
    pub calories: f64,
    pub share: f64,
}

pub fn daily_progress(summary: &DailySummary, calorie_goal: Option<f64>) -> DailyProgress {
    let goal = effective_goal(calorie_goal);
    let percent_of_goal = (goal > 0.0).then(|| {
        let pct = (summary.total_calories / goal * 100.0).round();
        if pct.is_finite() && pct > 0.0 {
            pct as u32
        } else {
            0
        }
    });
    DailyProgress {
        date: summary.date,
        total_calories: summary.total_calories,
        calorie_goal: goal,
        percent_of_goal,
        items_logged: summary.items.len(),
    }
}

/// Calories per food name, in order of first appearance. Repeated foods are
/// merged. With nothing eaten every share is zero.
pub fn food_breakdown(summary: &DailySummary) -> Vec<FoodShare> {
    let mut foods: Vec<FoodShare> = Vec::new();
    for item in &summary.items {
        match foods.iter_mut().find(|f| f.food_name == item.food_name) {
            Some(f) => f.calories += item.calories,
            None => foods.push(FoodShare {
                food_name: item.food_name.clone(),
                calories: item.calories,
                share: 0.0,
            }),
        }
    }
    let total: f64 = foods.iter().map(|f| f.calories).sum();
    if total > 0.0 {
        for f in &mut foods {
            f.share = f.calories / total;
        }
    }
    foods
}

pub fn period_view(per_day_totals: &[DayTotal], calorie_goal: Option<f64>) -> Vec<PeriodSummary> {
    let goal = effective_goal(calorie_goal);
    per_day_totals
        .iter()
        .map(|day| {
            let total = day.total_calories;
            let excess_calories = (total - goal).max(0.0);
            PeriodSummary {
                date: day.date,
                total_calories: total,
                calorie_goal: goal,
                excess_calories,
                base_calories: total - excess_calories,
            }
        })
        .collect()
}

/// Absent, zero, negative and non-finite goals all count as zero, so the
/// whole total is reported as excess.
fn effective_goal(goal: Option<f64>) -> f64 {
    match goal {
        Some(g) if g.is_finite() && g > 0.0 => g,
        _ => 0.0,
    }
}

/// Every day of the range, in calendar order.
pub fn range_days(range: &PeriodRange) -> EngineResult<Vec<NaiveDate>> {
    match *range {
        PeriodRange::WeekEnding { date } => (0..7u64)
            .rev()
            .map(|back| {
                date.checked_sub_days(Days::new(back))
                    .ok_or_else(|| EngineError::Validation(format!("date out of range: {date}")))
            })
            .collect(),
        PeriodRange::Month { year, month } => {
            let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
                EngineError::Validation(format!("invalid year or month: {year}-{month}"))
            })?;
            Ok(first
                .iter_days()
                .take_while(|d| d.month() == month && d.year() == year)
                .collect())
        }
    }
}

/// Dense per-day totals for `range`: days without data are zero, days
/// outside the range are dropped, repeated days are summed.
pub fn fill_range(range: &PeriodRange, totals: &[DayTotal]) -> EngineResult<Vec<DayTotal>> {
    let mut by_day: HashMap<NaiveDate, f64> = HashMap::with_capacity(totals.len());
    for t in totals {
        *by_day.entry(t.date).or_default() += t.total_calories;
    }
    Ok(range_days(range)?
        .into_iter()
        .map(|date| DayTotal {
            date,
            total_calories: by_day.get(&date).copied().unwrap_or(0.0),
        })
        .collect())
}
