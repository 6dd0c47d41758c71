//! Query-side API over the projected read-model containers.
//!
//! Three views: current match state, momentum window, leaderboard.
//! All field access is tolerant to absence and to camel/Pascal casing
//! variants, because the projector and legacy manual writers disagreed
//! historically.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::domain::casing;
use crate::domain::{StreamId, TrainerMetrics};
use crate::error::AppError;
use crate::store::{DocumentStore, ItemQuery};

/// Default number of momentum points returned.
pub const DEFAULT_MOMENTUM_POINTS: usize = 60;
/// Default leaderboard size.
pub const DEFAULT_LEADERBOARD_TOP: usize = 10;

/// Flattened current-match-state view.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchStateView {
    /// Stream the state belongs to.
    pub stream_id: String,
    /// Home side score.
    pub score_home: i64,
    /// Away side score.
    pub score_away: i64,
    /// Current quarter.
    pub quarter: u32,
    /// Game clock, `mm:ss`.
    pub clock: String,
    /// Time of the last projection write.
    pub updated_at: DateTime<Utc>,
}

/// One momentum point.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MomentumPoint {
    /// Power output in watts.
    pub watts: f64,
    /// Cadence in rpm.
    pub cadence: f64,
    /// Heart rate in bpm.
    pub heart_rate: f64,
    /// Capture time.
    pub captured_at: DateTime<Utc>,
}

/// Momentum window for one stream, ascending by capture time.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MomentumView {
    /// Stream the window belongs to.
    pub stream_id: String,
    /// Points ascending by `captured_at`.
    pub points: Vec<MomentumPoint>,
}

/// One leaderboard entry.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// Rider the entry belongs to.
    pub rider_id: String,
    /// Most recent power output.
    pub watts: f64,
    /// Most recent cadence.
    pub cadence: f64,
    /// Most recent heart rate.
    pub heart_rate: f64,
    /// Time of the last projection write.
    pub updated_at: DateTime<Utc>,
}

/// Top-K leaderboard across streams, descending by watts.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardView {
    /// Entries descending by `watts`.
    pub entries: Vec<LeaderboardEntry>,
    /// Server clock at response time.
    pub generated_at: DateTime<Utc>,
}

/// Read-model container names used by the query side.
#[derive(Debug, Clone)]
pub struct ReadModelContainers {
    /// Current-match-state container.
    pub match_state: String,
    /// Momentum-history container.
    pub tes_history: String,
    /// Leaderboard container.
    pub leaderboard: String,
}

/// Query-side service over the projected containers.
#[derive(Debug, Clone)]
pub struct ReadModelService {
    store: Arc<dyn DocumentStore>,
    containers: ReadModelContainers,
}

impl ReadModelService {
    /// Creates a read-model service over the given containers.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, containers: ReadModelContainers) -> Self {
        Self { store, containers }
    }

    /// Returns the flattened current match state, or `None`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`] on infrastructure failure.
    pub async fn get_match_state(
        &self,
        stream_id: &StreamId,
    ) -> Result<Option<MatchStateView>, AppError> {
        let row = match self
            .store
            .read_item(
                &self.containers.match_state,
                stream_id.as_str(),
                stream_id.as_str(),
            )
            .await
        {
            Ok(read) => read.body,
            Err(crate::store::StoreError::NotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let state = casing::field(&row, "state").cloned().unwrap_or(Value::Null);
        let score = casing::field(&state, "score").cloned().unwrap_or(Value::Null);
        Ok(Some(MatchStateView {
            stream_id: stream_id.to_string(),
            score_home: casing::field_i64(&score, "home").unwrap_or(0),
            score_away: casing::field_i64(&score, "away").unwrap_or(0),
            quarter: u32::try_from(casing::field_u64(&state, "quarter").unwrap_or(0))
                .unwrap_or(u32::MAX),
            clock: casing::field_str(&state, "clock").unwrap_or_default().to_string(),
            updated_at: parse_ts(casing::field(&row, "updatedAt")),
        }))
    }

    /// Returns the newest `max_points` momentum points for a stream,
    /// sorted ascending by capture time, or `None` for an unknown stream.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`] on infrastructure failure.
    pub async fn get_momentum(
        &self,
        stream_id: &StreamId,
        max_points: usize,
    ) -> Result<Option<MomentumView>, AppError> {
        let query = ItemQuery::new()
            .filter("streamId", json!(stream_id.as_str()))
            .order_by_desc("ts")
            .limit(max_points);
        let rows = self.store.query(&self.containers.tes_history, &query).await?;
        if rows.is_empty() {
            return Ok(None);
        }

        let mut points: Vec<MomentumPoint> = rows
            .iter()
            .map(|row| {
                let metrics =
                    TrainerMetrics::from_value(casing::field(row, "metrics").unwrap_or(&Value::Null));
                MomentumPoint {
                    watts: metrics.watts,
                    cadence: metrics.cadence,
                    heart_rate: metrics.heart_rate,
                    captured_at: metrics
                        .captured_at
                        .unwrap_or_else(|| parse_ts(casing::field(row, "ts"))),
                }
            })
            .collect();
        points.sort_by_key(|p| p.captured_at);

        Ok(Some(MomentumView {
            stream_id: stream_id.to_string(),
            points,
        }))
    }

    /// Returns the top-`top` leaderboard, descending by watts.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Store`] on infrastructure failure.
    pub async fn get_leaderboard(&self, top: usize) -> Result<LeaderboardView, AppError> {
        let query = ItemQuery::new().order_by_desc("metrics.watts").limit(top);
        let rows = self.store.query(&self.containers.leaderboard, &query).await?;

        let entries = rows
            .iter()
            .map(|row| {
                let metrics =
                    TrainerMetrics::from_value(casing::field(row, "metrics").unwrap_or(&Value::Null));
                let rider_id = metrics
                    .rider_id
                    .or_else(|| casing::field_str(row, "streamId").map(str::to_string))
                    .unwrap_or_default();
                LeaderboardEntry {
                    rider_id,
                    watts: metrics.watts,
                    cadence: metrics.cadence,
                    heart_rate: metrics.heart_rate,
                    updated_at: parse_ts(casing::field(row, "updatedAt")),
                }
            })
            .collect();

        Ok(LeaderboardView {
            entries,
            generated_at: Utc::now(),
        })
    }
}

/// Parses an RFC-3339 timestamp value, defaulting to now when absent or
/// malformed.
fn parse_ts(value: Option<&Value>) -> DateTime<Utc> {
    value
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map_or_else(Utc::now, |dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service() -> (Arc<MemoryStore>, ReadModelService) {
        let store = Arc::new(MemoryStore::new());
        let rms = ReadModelService::new(
            Arc::clone(&store) as Arc<dyn DocumentStore>,
            ReadModelContainers {
                match_state: "rm_match_state".to_string(),
                tes_history: "rm_tes_history".to_string(),
                leaderboard: "rm_leaderboard".to_string(),
            },
        );
        (store, rms)
    }

    #[tokio::test]
    async fn match_state_missing_is_none() {
        let (_store, rms) = service();
        let result = rms.get_match_state(&StreamId::new("ghost")).await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn match_state_flattens_camel_case_row() {
        let (store, rms) = service();
        let Ok(_) = store
            .upsert_item(
                "rm_match_state",
                "m1",
                json!({
                    "id": "m1",
                    "streamId": "m1",
                    "state": { "score": { "home": 3, "away": 11 }, "quarter": 2, "clock": "07:41" },
                    "aggVersion": 4,
                    "updatedAt": "2026-08-02T10:00:00Z",
                }),
            )
            .await
        else {
            panic!("seed failed");
        };

        let Ok(Some(view)) = rms.get_match_state(&StreamId::new("m1")).await else {
            panic!("expected view");
        };
        assert_eq!(view.score_home, 3);
        assert_eq!(view.score_away, 11);
        assert_eq!(view.quarter, 2);
        assert_eq!(view.clock, "07:41");
    }

    #[tokio::test]
    async fn match_state_tolerates_pascal_case_legacy_row() {
        let (store, rms) = service();
        let Ok(_) = store
            .upsert_item(
                "rm_match_state",
                "m1",
                json!({
                    "id": "m1",
                    "streamId": "m1",
                    "State": { "Score": { "Home": 1, "Away": 0 }, "Quarter": 1, "Clock": "19:59" },
                    "UpdatedAt": "2026-08-02T10:00:00Z",
                }),
            )
            .await
        else {
            panic!("seed failed");
        };

        let Ok(Some(view)) = rms.get_match_state(&StreamId::new("m1")).await else {
            panic!("expected view");
        };
        assert_eq!(view.score_home, 1);
        assert_eq!(view.clock, "19:59");
    }

    #[tokio::test]
    async fn momentum_missing_is_none() {
        let (_store, rms) = service();
        let result = rms.get_momentum(&StreamId::new("ghost"), 60).await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn momentum_returns_newest_window_ascending() {
        let (store, rms) = service();
        // 80 rows with strictly increasing timestamps, inserted shuffled
        // across two passes to exercise storage-order independence.
        for pass in [1_u64, 0] {
            for i in (0..80_u64).filter(|i| i % 2 == pass) {
                let ts = format!("2026-08-02T10:{:02}:{:02}Z", i / 60, i % 60);
                let Ok(_) = store
                    .upsert_item(
                        "rm_tes_history",
                        "m1",
                        json!({
                            "id": format!("m1-{}", i + 1),
                            "streamId": "m1",
                            "metrics": { "watts": 200 + i, "capturedAt": ts },
                            "ts": ts,
                        }),
                    )
                    .await
                else {
                    panic!("seed failed");
                };
            }
        }

        let Ok(Some(view)) = rms.get_momentum(&StreamId::new("m1"), 60).await else {
            panic!("expected view");
        };
        assert_eq!(view.points.len(), 60);
        // Newest 60 of 80: watts 220..=279, ascending by capture time.
        assert!((view.points[0].watts - 220.0).abs() < f64::EPSILON);
        assert!((view.points[59].watts - 279.0).abs() < f64::EPSILON);
        for pair in view.points.windows(2) {
            assert!(pair[0].captured_at <= pair[1].captured_at);
        }
    }

    #[tokio::test]
    async fn momentum_defaults_missing_numerics_to_zero() {
        let (store, rms) = service();
        let Ok(_) = store
            .upsert_item(
                "rm_tes_history",
                "m1",
                json!({
                    "id": "m1-1",
                    "streamId": "m1",
                    "metrics": { "cadence": 90 },
                    "ts": "2026-08-02T10:00:00Z",
                }),
            )
            .await
        else {
            panic!("seed failed");
        };

        let Ok(Some(view)) = rms.get_momentum(&StreamId::new("m1"), 60).await else {
            panic!("expected view");
        };
        assert!((view.points[0].watts - 0.0).abs() < f64::EPSILON);
        assert!((view.points[0].cadence - 90.0).abs() < f64::EPSILON);
        // capturedAt missing on metrics falls back to the row ts.
        assert_eq!(
            view.points[0].captured_at.to_rfc3339(),
            "2026-08-02T10:00:00+00:00"
        );
    }

    #[tokio::test]
    async fn leaderboard_ranks_by_watts_descending() {
        let (store, rms) = service();
        for (stream, watts) in [("a", 300), ("b", 400), ("c", 350)] {
            let Ok(_) = store
                .upsert_item(
                    "rm_leaderboard",
                    stream,
                    json!({
                        "id": stream,
                        "streamId": stream,
                        "metrics": { "riderId": format!("rider-{stream}"), "watts": watts },
                        "updatedAt": "2026-08-02T10:00:00Z",
                    }),
                )
                .await
            else {
                panic!("seed failed");
            };
        }

        let Ok(view) = rms.get_leaderboard(10).await else {
            panic!("leaderboard failed");
        };
        let riders: Vec<&str> = view.entries.iter().map(|e| e.rider_id.as_str()).collect();
        assert_eq!(riders, vec!["rider-b", "rider-c", "rider-a"]);
    }

    #[tokio::test]
    async fn leaderboard_caps_at_top_n_and_defaults_rider_to_stream() {
        let (store, rms) = service();
        for i in 0..15 {
            let stream = format!("s{i}");
            let Ok(_) = store
                .upsert_item(
                    "rm_leaderboard",
                    &stream,
                    json!({
                        "id": stream,
                        "streamId": stream,
                        "metrics": { "watts": 100 + i },
                    }),
                )
                .await
            else {
                panic!("seed failed");
            };
        }

        let Ok(view) = rms.get_leaderboard(10).await else {
            panic!("leaderboard failed");
        };
        assert_eq!(view.entries.len(), 10);
        assert_eq!(view.entries[0].rider_id, "s14");
    }
}
