//! Client-side nutrition state and aggregation engine.
//!
//! Derives intake recommendations from a biometric profile, keeps the edited
//! profile in sync with the remote store, aggregates food-log data into
//! daily and period summaries and owns the authenticated session.

pub mod aggregation;
pub mod error;
pub mod logging;
pub mod profile;
pub mod profile_sync;
pub mod recommendations;
pub mod session;
pub mod tracker;

mod test_utils;

pub use aggregation::{DailyProgress, DailySummary, FoodShare, LogEntry, PeriodSummary};
pub use error::{EngineError, EngineResult};
pub use profile::{Profile, ProfileField};
pub use profile_sync::{ProfileSnapshot, ProfileSyncController, ProfileSyncHandle, SyncState};
pub use recommendations::RecommendationSet;
pub use session::{Session, SessionInvalidator, SessionManager, SessionStatus};
pub use tracker::NutritionTracker;
