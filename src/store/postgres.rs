use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use tracing::debug;
use uuid::Uuid;

use crate::db::DbPool;
use crate::draw_error::DrawError;
use crate::models::draw::{Draw, DrawFormat, DrawKey, Group, QualifierPairing};
use crate::models::match_model::{Match, MatchStage, MatchStatus, Slot, SlotWrite};
use crate::models::participant::Participant;
use crate::store::DrawStore;

const DRAW_COLUMNS: &str = "tournament_id, category_id, format, advance_from_group, \
     qualifier_pairing, participants, groups, created_at, updated_at";

const MATCH_COLUMNS: &str = "id, tournament_id, category_id, stage, group_id, round, \
     match_number, player1_id, player2_id, parent_match_id, winner_slot, status, winner_id, \
     bye, score_summary, started_at, completed_at";

#[derive(Debug, FromRow)]
struct DrawRow {
    tournament_id: Uuid,
    category_id: Uuid,
    format: DrawFormat,
    advance_from_group: i32,
    qualifier_pairing: QualifierPairing,
    participants: Json<Vec<Participant>>,
    groups: Json<Vec<Group>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct MatchRow {
    id: Uuid,
    tournament_id: Uuid,
    category_id: Uuid,
    stage: MatchStage,
    group_id: Option<Uuid>,
    round: i32,
    match_number: i32,
    player1_id: Option<Uuid>,
    player2_id: Option<Uuid>,
    parent_match_id: Option<Uuid>,
    winner_slot: Option<Slot>,
    status: MatchStatus,
    winner_id: Option<Uuid>,
    bye: bool,
    score_summary: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl MatchRow {
    fn from_match(key: DrawKey, m: &Match) -> Result<Self, DrawError> {
        Ok(Self {
            id: m.id,
            tournament_id: key.tournament_id,
            category_id: key.category_id,
            stage: m.stage,
            group_id: m.group_id,
            round: to_db_int(m.round, "round")?,
            match_number: to_db_int(m.match_number, "match_number")?,
            player1_id: m.player1_id,
            player2_id: m.player2_id,
            parent_match_id: m.parent_match_id,
            winner_slot: m.winner_slot,
            status: m.status,
            winner_id: m.winner_id,
            bye: m.bye,
            score_summary: m.score_summary.clone(),
            started_at: m.started_at,
            completed_at: m.completed_at,
        })
    }
}

impl TryFrom<MatchRow> for Match {
    type Error = DrawError;

    fn try_from(row: MatchRow) -> Result<Self, Self::Error> {
        let round = u32::try_from(row.round)
            .map_err(|_| DrawError::corrupt(format!("match {} has round {}", row.id, row.round)))?;
        let match_number = u32::try_from(row.match_number).map_err(|_| {
            DrawError::corrupt(format!("match {} has number {}", row.id, row.match_number))
        })?;

        Ok(Match {
            id: row.id,
            stage: row.stage,
            group_id: row.group_id,
            round,
            match_number,
            player1_id: row.player1_id,
            player2_id: row.player2_id,
            parent_match_id: row.parent_match_id,
            winner_slot: row.winner_slot,
            status: row.status,
            winner_id: row.winner_id,
            bye: row.bye,
            score_summary: row.score_summary,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

fn to_db_int(value: u32, field: &str) -> Result<i32, DrawError> {
    i32::try_from(value)
        .map_err(|_| DrawError::Validation(format!("{} {} does not fit the database", field, value)))
}

/// Postgres-backed store. Parent advancement is a conditional single-column
/// update, so concurrent sibling completions never overwrite each other.
#[derive(Clone)]
pub struct PgDrawStore {
    pool: DbPool,
}

impl PgDrawStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fill_slot(
        conn: &mut sqlx::PgConnection,
        key: DrawKey,
        write: &SlotWrite,
    ) -> Result<u64, DrawError> {
        let sql = match write.slot {
            Slot::Player1 => {
                r#"
                UPDATE draw_matches
                SET player1_id = $1, updated_at = NOW()
                WHERE id = $2 AND tournament_id = $3 AND category_id = $4
                  AND status <> 'COMPLETED'
                  AND (player1_id IS NULL OR player1_id = $1)
                "#
            }
            Slot::Player2 => {
                r#"
                UPDATE draw_matches
                SET player2_id = $1, updated_at = NOW()
                WHERE id = $2 AND tournament_id = $3 AND category_id = $4
                  AND status <> 'COMPLETED'
                  AND (player2_id IS NULL OR player2_id = $1)
                "#
            }
        };

        let result = sqlx::query(sql)
            .bind(write.participant_id)
            .bind(write.match_id)
            .bind(key.tournament_id)
            .bind(key.category_id)
            .execute(conn)
            .await?;

        Ok(result.rows_affected())
    }

    async fn touch_draw(conn: &mut sqlx::PgConnection, key: DrawKey) -> Result<(), DrawError> {
        sqlx::query(
            "UPDATE draws SET updated_at = NOW() WHERE tournament_id = $1 AND category_id = $2",
        )
        .bind(key.tournament_id)
        .bind(key.category_id)
        .execute(conn)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DrawStore for PgDrawStore {
    async fn load_draw(&self, key: DrawKey) -> Result<Option<Draw>, DrawError> {
        let mut tx = self.pool.begin().await?;

        let draw_sql = format!(
            "SELECT {} FROM draws WHERE tournament_id = $1 AND category_id = $2",
            DRAW_COLUMNS
        );
        let row: Option<DrawRow> = sqlx::query_as(&draw_sql)
            .bind(key.tournament_id)
            .bind(key.category_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            tx.commit().await?;
            return Ok(None);
        };

        let match_sql = format!(
            "SELECT {} FROM draw_matches WHERE tournament_id = $1 AND category_id = $2 \
             ORDER BY stage, round DESC, match_number",
            MATCH_COLUMNS
        );
        let match_rows: Vec<MatchRow> = sqlx::query_as(&match_sql)
            .bind(key.tournament_id)
            .bind(key.category_id)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        let matches = match_rows
            .into_iter()
            .map(Match::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Draw {
            tournament_id: row.tournament_id,
            category_id: row.category_id,
            format: row.format,
            advance_from_group: u32::try_from(row.advance_from_group).map_err(|_| {
                DrawError::corrupt(format!(
                    "draw {} advances {} per group",
                    key, row.advance_from_group
                ))
            })?,
            qualifier_pairing: row.qualifier_pairing,
            participants: row.participants.0,
            groups: row.groups.0,
            matches,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }))
    }

    async fn save_draw(&self, draw: &Draw) -> Result<(), DrawError> {
        let key = draw.key();
        let rows = draw
            .matches
            .iter()
            .map(|m| MatchRow::from_match(key, m))
            .collect::<Result<Vec<_>, _>>()?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO draws (
                tournament_id, category_id, format, advance_from_group,
                qualifier_pairing, participants, groups, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (tournament_id, category_id) DO UPDATE SET
                format = EXCLUDED.format,
                advance_from_group = EXCLUDED.advance_from_group,
                qualifier_pairing = EXCLUDED.qualifier_pairing,
                participants = EXCLUDED.participants,
                groups = EXCLUDED.groups,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(key.tournament_id)
        .bind(key.category_id)
        .bind(draw.format)
        .bind(to_db_int(draw.advance_from_group, "advance_from_group")?)
        .bind(draw.qualifier_pairing)
        .bind(Json(&draw.participants))
        .bind(Json(&draw.groups))
        .bind(draw.created_at)
        .bind(draw.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM draw_matches WHERE tournament_id = $1 AND category_id = $2")
            .bind(key.tournament_id)
            .bind(key.category_id)
            .execute(&mut *tx)
            .await?;

        for row in &rows {
            sqlx::query(
                r#"
                INSERT INTO draw_matches (
                    id, tournament_id, category_id, stage, group_id, round,
                    match_number, player1_id, player2_id, parent_match_id, winner_slot,
                    status, winner_id, bye, score_summary, started_at, completed_at
                ) VALUES (
                    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17
                )
                "#,
            )
            .bind(row.id)
            .bind(row.tournament_id)
            .bind(row.category_id)
            .bind(row.stage)
            .bind(row.group_id)
            .bind(row.round)
            .bind(row.match_number)
            .bind(row.player1_id)
            .bind(row.player2_id)
            .bind(row.parent_match_id)
            .bind(row.winner_slot)
            .bind(row.status)
            .bind(row.winner_id)
            .bind(row.bye)
            .bind(&row.score_summary)
            .bind(row.started_at)
            .bind(row.completed_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(draw = %key, matches = rows.len(), "Saved draw");
        Ok(())
    }

    async fn delete_draw(&self, key: DrawKey) -> Result<bool, DrawError> {
        let result = sqlx::query("DELETE FROM draws WHERE tournament_id = $1 AND category_id = $2")
            .bind(key.tournament_id)
            .bind(key.category_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_draw_key(&self, match_id: Uuid) -> Result<Option<DrawKey>, DrawError> {
        let row: Option<(Uuid, Uuid)> =
            sqlx::query_as("SELECT tournament_id, category_id FROM draw_matches WHERE id = $1")
                .bind(match_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(tournament_id, category_id)| DrawKey::new(tournament_id, category_id)))
    }

    async fn update_match_state(&self, key: DrawKey, m: &Match) -> Result<(), DrawError> {
        let result = sqlx::query(
            r#"
            UPDATE draw_matches
            SET status = $1, winner_id = $2, score_summary = $3,
                started_at = $4, completed_at = $5, updated_at = NOW()
            WHERE id = $6 AND tournament_id = $7 AND category_id = $8
            "#,
        )
        .bind(m.status)
        .bind(m.winner_id)
        .bind(&m.score_summary)
        .bind(m.started_at)
        .bind(m.completed_at)
        .bind(m.id)
        .bind(key.tournament_id)
        .bind(key.category_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DrawError::not_found(format!("match {}", m.id)));
        }
        Ok(())
    }

    async fn apply_completion(
        &self,
        key: DrawKey,
        completed: &Match,
        parent_write: Option<&SlotWrite>,
    ) -> Result<(), DrawError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE draw_matches
            SET status = 'COMPLETED', winner_id = $1, score_summary = $2,
                completed_at = $3, updated_at = NOW()
            WHERE id = $4 AND tournament_id = $5 AND category_id = $6
              AND status <> 'COMPLETED'
            "#,
        )
        .bind(completed.winner_id)
        .bind(&completed.score_summary)
        .bind(completed.completed_at)
        .bind(completed.id)
        .bind(key.tournament_id)
        .bind(key.category_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<(MatchStatus,)> =
                sqlx::query_as("SELECT status FROM draw_matches WHERE id = $1")
                    .bind(completed.id)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match exists {
                Some(_) => DrawError::AlreadyCompleted(completed.id),
                None => DrawError::not_found(format!("match {}", completed.id)),
            });
        }

        if let Some(write) = parent_write {
            if Self::fill_slot(&mut *tx, key, write).await? == 0 {
                return Err(DrawError::corrupt(format!(
                    "{} of match {} could not take winner {}",
                    write.slot, write.match_id, write.participant_id
                )));
            }
        }

        Self::touch_draw(&mut *tx, key).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn assign_slot(&self, key: DrawKey, write: &SlotWrite) -> Result<(), DrawError> {
        let mut tx = self.pool.begin().await?;
        if Self::fill_slot(&mut *tx, key, write).await? == 0 {
            return Err(DrawError::SlotUnavailable(format!(
                "{} of match {} is not open",
                write.slot, write.match_id
            )));
        }
        Self::touch_draw(&mut *tx, key).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_draw_keys(&self) -> Result<Vec<DrawKey>, DrawError> {
        let rows: Vec<(Uuid, Uuid)> = sqlx::query_as(
            "SELECT tournament_id, category_id FROM draws ORDER BY tournament_id, category_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(tournament_id, category_id)| DrawKey::new(tournament_id, category_id))
            .collect())
    }
}
