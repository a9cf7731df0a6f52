use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::draw_error::DrawError;
use crate::models::draw::{Draw, DrawKey};
use crate::models::match_model::{Match, MatchStatus, SlotWrite};
use crate::store::DrawStore;

/// Process-local store. Every operation runs under one write lock, which makes
/// each call atomic.
#[derive(Default)]
pub struct InMemoryDrawStore {
    draws: RwLock<HashMap<DrawKey, Draw>>,
}

impl InMemoryDrawStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_match<T>(
        &self,
        key: DrawKey,
        match_id: Uuid,
        f: impl FnOnce(&mut Draw, usize) -> Result<T, DrawError>,
    ) -> Result<T, DrawError> {
        let mut draws = self
            .draws
            .write()
            .map_err(|_| DrawError::internal("Failed to write draws"))?;
        let draw = draws
            .get_mut(&key)
            .ok_or_else(|| DrawError::not_found(format!("draw {}", key)))?;
        let index = draw
            .matches
            .iter()
            .position(|m| m.id == match_id)
            .ok_or_else(|| DrawError::not_found(format!("match {}", match_id)))?;

        let result = f(draw, index)?;
        draw.updated_at = Utc::now();
        Ok(result)
    }
}

fn copy_state(target: &mut Match, source: &Match) {
    target.status = source.status;
    target.winner_id = source.winner_id;
    target.score_summary = source.score_summary.clone();
    target.started_at = source.started_at;
    target.completed_at = source.completed_at;
}

fn fill_slot(draw: &mut Draw, write: &SlotWrite) -> Result<(), DrawError> {
    let target = draw
        .matches
        .iter_mut()
        .find(|m| m.id == write.match_id)
        .ok_or_else(|| DrawError::not_found(format!("match {}", write.match_id)))?;

    match target.player(write.slot) {
        None => {
            target.set_player(write.slot, Some(write.participant_id));
            Ok(())
        }
        Some(existing) if existing == write.participant_id => Ok(()),
        Some(existing) => Err(DrawError::SlotUnavailable(format!(
            "{} of match {} is already held by {}",
            write.slot, write.match_id, existing
        ))),
    }
}

#[async_trait]
impl DrawStore for InMemoryDrawStore {
    async fn load_draw(&self, key: DrawKey) -> Result<Option<Draw>, DrawError> {
        let draws = self
            .draws
            .read()
            .map_err(|_| DrawError::internal("Failed to read draws"))?;
        Ok(draws.get(&key).cloned())
    }

    async fn save_draw(&self, draw: &Draw) -> Result<(), DrawError> {
        let mut draws = self
            .draws
            .write()
            .map_err(|_| DrawError::internal("Failed to write draws"))?;
        draws.insert(draw.key(), draw.clone());
        Ok(())
    }

    async fn delete_draw(&self, key: DrawKey) -> Result<bool, DrawError> {
        let mut draws = self
            .draws
            .write()
            .map_err(|_| DrawError::internal("Failed to write draws"))?;
        Ok(draws.remove(&key).is_some())
    }

    async fn find_draw_key(&self, match_id: Uuid) -> Result<Option<DrawKey>, DrawError> {
        let draws = self
            .draws
            .read()
            .map_err(|_| DrawError::internal("Failed to read draws"))?;
        Ok(draws
            .values()
            .find(|d| d.matches.iter().any(|m| m.id == match_id))
            .map(Draw::key))
    }

    async fn update_match_state(&self, key: DrawKey, m: &Match) -> Result<(), DrawError> {
        self.with_match(key, m.id, |draw, index| {
            copy_state(&mut draw.matches[index], m);
            Ok(())
        })
    }

    async fn apply_completion(
        &self,
        key: DrawKey,
        completed: &Match,
        parent_write: Option<&SlotWrite>,
    ) -> Result<(), DrawError> {
        self.with_match(key, completed.id, |draw, index| {
            if draw.matches[index].status == MatchStatus::Completed {
                return Err(DrawError::AlreadyCompleted(completed.id));
            }

            // Check the parent slot first so a refused write leaves nothing applied
            if let Some(write) = parent_write {
                let parent = draw
                    .matches
                    .iter()
                    .find(|m| m.id == write.match_id)
                    .ok_or_else(|| {
                        DrawError::corrupt(format!("parent {} does not exist", write.match_id))
                    })?;
                if let Some(existing) = parent.player(write.slot) {
                    if existing != write.participant_id {
                        return Err(DrawError::corrupt(format!(
                            "{} of match {} already holds {}",
                            write.slot, write.match_id, existing
                        )));
                    }
                }
                fill_slot(draw, write)?;
            }

            copy_state(&mut draw.matches[index], completed);
            Ok(())
        })
    }

    async fn assign_slot(&self, key: DrawKey, write: &SlotWrite) -> Result<(), DrawError> {
        self.with_match(key, write.match_id, |draw, _| fill_slot(draw, write))
    }

    async fn list_draw_keys(&self) -> Result<Vec<DrawKey>, DrawError> {
        let draws = self
            .draws
            .read()
            .map_err(|_| DrawError::internal("Failed to read draws"))?;
        let mut keys: Vec<DrawKey> = draws.keys().copied().collect();
        keys.sort();
        Ok(keys)
    }
}
