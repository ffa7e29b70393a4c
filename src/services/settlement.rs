//! Best-effort persistence of a settled quiz.

use std::sync::Arc;

use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{dao::quiz_store::QuizStore, state::quiz::QuizResult};

/// Streak increment applied per settled quiz.
const STREAK_INCREMENT: i64 = 1;

/// Current time as an RFC 3339 timestamp.
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}

/// Write the result record and credit the user's counters.
///
/// The two writes are independent; a failure of one does not skip the other.
/// Failures are logged and reported through the return value, never propagated.
pub async fn persist(store: Option<Arc<dyn QuizStore>>, result: &QuizResult) -> bool {
    let Some(store) = store else {
        warn!(user_id = %result.user_id, "no quiz store installed; result not persisted");
        return false;
    };

    let result_id = Uuid::new_v4();
    let saved = match store
        .save_result((result_id, result.clone()).into())
        .await
    {
        Ok(()) => true,
        Err(err) => {
            error!(
                user_id = %result.user_id,
                %result_id,
                error = %err,
                "failed to save quiz result"
            );
            false
        }
    };

    let credited = match store
        .increment_user_stats(
            result.user_id.clone(),
            i64::from(result.earned_points),
            STREAK_INCREMENT,
        )
        .await
    {
        Ok(()) => true,
        Err(err) => {
            error!(
                user_id = %result.user_id,
                points = result.earned_points,
                error = %err,
                "failed to credit user points"
            );
            false
        }
    };

    if saved && credited {
        info!(
            user_id = %result.user_id,
            %result_id,
            score = result.score,
            points = result.earned_points,
            "quiz settled"
        );
    }
    saved && credited
}
