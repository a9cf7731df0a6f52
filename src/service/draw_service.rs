use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::config::DrawsConfig;
use crate::draw_error::DrawError;
use crate::engine::{advancement, match_graph, round_robin, seeder, standings, AdvancementResult};
use crate::models::draw::{
    Draw, DrawFormat, DrawKey, Group, GroupView, NewGroupStage, QualifierPairing, RoundView,
};
use crate::models::match_model::{Match, MatchResultReport, MatchStage, MatchStatus, Slot};
use crate::models::participant::Participant;
use crate::models::standing::StandingEntry;
use crate::service::draw_events::DrawEvent;
use crate::store::DrawStore;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Draw Service - stage transitions and every bracket mutation
///
/// Mutations of one draw are serialized through a per-draw lock and each
/// one is persisted before its event is published.
pub struct DrawService {
    store: Arc<dyn DrawStore>,
    locks: StdMutex<HashMap<DrawKey, Arc<Mutex<()>>>>,
    events: broadcast::Sender<DrawEvent>,
    settings: DrawsConfig,
}

impl DrawService {
    pub fn new(store: Arc<dyn DrawStore>, settings: DrawsConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            locks: StdMutex::new(HashMap::new()),
            events,
            settings,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DrawEvent> {
        self.events.subscribe()
    }

    // =============================================================================
    // STAGE SETUP
    // =============================================================================

    /// Create (or recreate) the round-robin groups of a draw and their fixtures
    pub async fn create_group_stage(
        &self,
        key: DrawKey,
        dto: NewGroupStage,
    ) -> Result<Draw, DrawError> {
        dto.validate()?;
        if !dto.format.has_groups() {
            return Err(DrawError::UnsupportedFormat(format!(
                "{} draws have no group stage",
                dto.format
            )));
        }

        let mut seen = HashSet::new();
        for p in dto.groups.iter().flat_map(|g| &g.participants) {
            if !seen.insert(p.id) {
                return Err(DrawError::Validation(format!(
                    "participant {} appears in more than one group slot",
                    p.id
                )));
            }
        }

        let _guard = self.lock_draw(key).await?;
        let existing = self.store.load_draw(key).await?;
        if let Some(existing) = &existing {
            ensure_groups_untouched(existing)?;
            ensure_knockout_untouched(existing)?;
        }

        let now = Utc::now();
        let mut draw = Draw::new(key, dto.format, now);
        if let Some(existing) = &existing {
            draw.created_at = existing.created_at;
        }
        draw.advance_from_group = dto
            .advance_from_group
            .unwrap_or(self.settings.default_advance_from_group);
        draw.qualifier_pairing = dto
            .qualifier_pairing
            .unwrap_or(self.settings.qualifier_pairing);

        for new_group in dto.groups {
            let group = Group {
                id: Uuid::new_v4(),
                name: new_group.name,
                slots: new_group.participants.into_iter().map(Some).collect(),
            };
            draw.matches.extend(round_robin::generate_fixtures(&group));
            draw.participants.extend(group.participants().cloned());
            draw.groups.push(group);
        }

        self.store.save_draw(&draw).await?;

        info!(
            tournament_id = %key.tournament_id,
            category_id = %key.category_id,
            format = %draw.format,
            groups = draw.groups.len(),
            fixtures = draw.matches.len(),
            "Created group stage"
        );
        self.publish(DrawEvent::DrawSeeded {
            tournament_id: key.tournament_id,
            category_id: key.category_id,
            stage: MatchStage::Group,
            matches: draw.matches.len(),
        });

        Ok(draw)
    }

    /// Build a knockout-only draw from a seeded roster, replacing any bracket
    /// that has not started yet
    pub async fn seed_knockout(
        &self,
        key: DrawKey,
        participants: Vec<Participant>,
        slot_count: Option<u32>,
    ) -> Result<Draw, DrawError> {
        for p in &participants {
            p.validate()?;
        }

        let _guard = self.lock_draw(key).await?;
        let existing = self.store.load_draw(key).await?;

        let now = Utc::now();
        let mut draw = match existing {
            Some(existing) if existing.format.has_groups() => {
                return Err(DrawError::UnsupportedFormat(format!(
                    "draw {} is {}, its bracket comes from the group stage",
                    key, existing.format
                )))
            }
            Some(existing) => {
                ensure_knockout_untouched(&existing)?;
                existing
            }
            None => Draw::new(key, DrawFormat::Knockout, now),
        };

        let matches = seeder::build_bracket(&participants, slot_count, now)?;
        match_graph::validate(&matches).map_err(|e| flag_corruption(key, &matches, e))?;

        draw.participants = participants;
        draw.matches = matches;
        draw.updated_at = now;
        self.store.save_draw(&draw).await?;

        info!(
            tournament_id = %key.tournament_id,
            category_id = %key.category_id,
            bracket_size = draw.bracket_size(),
            participants = draw.participants.len(),
            "Seeded knockout bracket"
        );
        self.publish(DrawEvent::DrawSeeded {
            tournament_id: key.tournament_id,
            category_id: key.category_id,
            stage: MatchStage::Knockout,
            matches: draw.matches.len(),
        });

        Ok(draw)
    }

    /// Move a round-robin-then-knockout draw into its knockout stage.
    /// All-or-nothing: nothing is written unless every group match is complete.
    pub async fn advance_to_knockout(&self, key: DrawKey) -> Result<Draw, DrawError> {
        let _guard = self.lock_draw(key).await?;
        let mut draw = self.load(key).await?;

        if !(draw.format.has_groups() && draw.format.has_knockout()) {
            return Err(DrawError::UnsupportedFormat(format!(
                "draw {} is {} and has no group-to-knockout transition",
                key, draw.format
            )));
        }

        let pending = draw.pending_group_matches();
        if pending > 0 {
            warn!(
                tournament_id = %key.tournament_id,
                category_id = %key.category_id,
                pending,
                "Refusing knockout transition with unfinished group matches"
            );
            return Err(DrawError::IncompleteStage { pending });
        }
        ensure_knockout_untouched(&draw)?;

        let qualifiers = collect_qualifiers(&draw)?;
        let now = Utc::now();
        let bracket = seeder::build_bracket(&qualifiers, None, now)?;
        match_graph::validate(&bracket).map_err(|e| flag_corruption(key, &bracket, e))?;

        let replaced = draw.knockout_matches().count();
        draw.matches.retain(|m| !m.is_knockout());
        draw.matches.extend(bracket);
        draw.updated_at = now;
        self.store.save_draw(&draw).await?;

        info!(
            tournament_id = %key.tournament_id,
            category_id = %key.category_id,
            qualifiers = qualifiers.len(),
            pairing = %draw.qualifier_pairing,
            replaced,
            "Advanced draw to knockout stage"
        );
        self.publish(DrawEvent::DrawSeeded {
            tournament_id: key.tournament_id,
            category_id: key.category_id,
            stage: MatchStage::Knockout,
            matches: draw.knockout_matches().count(),
        });

        Ok(draw)
    }

    /// Clear every result, keep first-round players, re-advance byes
    pub async fn restart_draw(&self, key: DrawKey) -> Result<Draw, DrawError> {
        let _guard = self.lock_draw(key).await?;
        let mut draw = self.load(key).await?;

        if !draw.format.has_knockout() {
            return Err(DrawError::UnsupportedFormat(format!(
                "draw {} is {} and has no knockout bracket to restart",
                key, draw.format
            )));
        }

        match_graph::validate(&draw.matches).map_err(|e| flag_corruption(key, &draw.matches, e))?;

        let now = Utc::now();
        if let Err(e) = seeder::restart_bracket(&mut draw.matches, now) {
            return Err(flag_corruption(key, &draw.matches, e));
        }
        draw.updated_at = now;
        self.store.save_draw(&draw).await?;

        info!(
            tournament_id = %key.tournament_id,
            category_id = %key.category_id,
            matches = draw.matches.len(),
            "Restarted draw"
        );
        self.publish(DrawEvent::DrawRestarted {
            tournament_id: key.tournament_id,
            category_id: key.category_id,
        });

        Ok(draw)
    }

    /// Delete the draw and every match it owns
    pub async fn reset_draw(&self, key: DrawKey) -> Result<(), DrawError> {
        let _guard = self.lock_draw(key).await?;
        if !self.store.delete_draw(key).await? {
            return Err(DrawError::not_found(format!("draw {}", key)));
        }

        info!(
            tournament_id = %key.tournament_id,
            category_id = %key.category_id,
            "Reset draw"
        );
        self.publish(DrawEvent::DrawReset {
            tournament_id: key.tournament_id,
            category_id: key.category_id,
        });

        Ok(())
    }

    // =============================================================================
    // MATCH PLAY
    // =============================================================================

    pub async fn start_match(&self, match_id: Uuid) -> Result<Match, DrawError> {
        let key = self.draw_key_for(match_id).await?;
        let _guard = self.lock_draw(key).await?;
        let mut draw = self.load(key).await?;

        let started = advancement::start_match(&mut draw.matches, match_id, Utc::now())?;
        self.store.update_match_state(key, &started).await?;

        info!(match_id = %match_id, category_id = %key.category_id, "Match started");
        if let Some(started_at) = started.started_at {
            self.publish(DrawEvent::MatchStarted {
                match_id,
                started_at,
            });
        }

        Ok(started)
    }

    /// Record the winner of a match and advance them one round
    pub async fn complete_match(
        &self,
        match_id: Uuid,
        winner_id: Uuid,
    ) -> Result<AdvancementResult, DrawError> {
        self.complete(match_id, winner_id, None).await
    }

    /// `complete_match` for a full report from the scoring component
    pub async fn report_result(
        &self,
        report: MatchResultReport,
    ) -> Result<AdvancementResult, DrawError> {
        report.validate()?;
        self.complete(report.match_id, report.winner_id, report.score_summary)
            .await
    }

    /// Place a participant into an open first-round slot of a bracket seeded
    /// without a full roster
    pub async fn assign_slot(
        &self,
        key: DrawKey,
        match_id: Uuid,
        slot: Slot,
        participant: Participant,
    ) -> Result<Match, DrawError> {
        participant.validate()?;

        let _guard = self.lock_draw(key).await?;
        let mut draw = self.load(key).await?;

        let write = seeder::assign_slot(&mut draw.matches, match_id, slot, participant.id)?;
        let new_to_roster = draw.participant(participant.id).is_none();
        if new_to_roster {
            draw.participants.push(participant);
            draw.updated_at = Utc::now();
            self.store.save_draw(&draw).await?;
        } else {
            self.store.assign_slot(key, &write).await?;
        }

        let updated = draw
            .find_match(match_id)
            .cloned()
            .ok_or_else(|| DrawError::not_found(format!("match {}", match_id)))?;

        info!(
            match_id = %match_id,
            slot = %slot,
            participant_id = %write.participant_id,
            new_to_roster,
            "Assigned bracket slot"
        );
        self.publish(DrawEvent::SlotAssigned {
            match_id,
            slot,
            participant_id: write.participant_id,
        });

        Ok(updated)
    }

    /// Finish manual assignment: every first-round match left with a single
    /// player becomes a bye and that player advances
    pub async fn close_open_slots(&self, key: DrawKey) -> Result<Draw, DrawError> {
        let _guard = self.lock_draw(key).await?;
        let mut draw = self.load(key).await?;
        match_graph::validate(&draw.matches).map_err(|e| flag_corruption(key, &draw.matches, e))?;

        let pending: HashSet<Uuid> = draw
            .knockout_matches()
            .filter(|m| m.status == MatchStatus::Pending)
            .map(|m| m.id)
            .collect();

        let now = Utc::now();
        let closed = match seeder::close_open_slots(&mut draw.matches, now) {
            Ok(closed) => closed,
            Err(e @ DrawError::CorruptBracket(_)) => {
                return Err(flag_corruption(key, &draw.matches, e))
            }
            Err(e) => return Err(e),
        };
        if closed == 0 {
            return Ok(draw);
        }
        draw.updated_at = now;
        self.store.save_draw(&draw).await?;

        info!(
            tournament_id = %key.tournament_id,
            category_id = %key.category_id,
            byes = closed,
            "Closed open bracket slots"
        );
        for bye in draw
            .matches
            .iter()
            .filter(|m| m.bye && pending.contains(&m.id) && m.status == MatchStatus::Completed)
        {
            let Some(winner_id) = bye.winner_id else {
                continue;
            };
            self.publish(DrawEvent::MatchCompleted {
                match_id: bye.id,
                winner_id,
                completed_at: now,
            });
            let (Some(parent_id), Some(slot)) = (bye.parent_match_id, bye.winner_slot) else {
                continue;
            };
            self.publish(DrawEvent::PlayerAdvanced {
                from_match_id: bye.id,
                to_match_id: parent_id,
                slot,
                participant_id: winner_id,
                ready: draw.find_match(parent_id).is_some_and(|p| p.is_ready()),
            });
        }

        Ok(draw)
    }

    async fn complete(
        &self,
        match_id: Uuid,
        winner_id: Uuid,
        score_summary: Option<String>,
    ) -> Result<AdvancementResult, DrawError> {
        let key = self.draw_key_for(match_id).await?;
        let _guard = self.lock_draw(key).await?;
        let mut draw = self.load(key).await?;

        let now = Utc::now();
        let result = match advancement::complete_match(
            &mut draw.matches,
            match_id,
            winner_id,
            score_summary,
            now,
        ) {
            Ok(result) => result,
            Err(e) => return Err(flag_corruption(key, &draw.matches, e)),
        };

        if let Err(e) = self
            .store
            .apply_completion(key, &result.completed, result.parent_write.as_ref())
            .await
        {
            return Err(flag_corruption(key, &draw.matches, e));
        }

        info!(
            match_id = %match_id,
            winner_id = %winner_id,
            tournament_id = %key.tournament_id,
            category_id = %key.category_id,
            "Match completed"
        );
        self.publish(DrawEvent::MatchCompleted {
            match_id,
            winner_id,
            completed_at: now,
        });

        if let (Some(write), Some(parent)) = (&result.parent_write, &result.updated_parent) {
            debug!(
                from = %match_id,
                to = %write.match_id,
                slot = %write.slot,
                ready = parent.is_ready(),
                "Winner advanced"
            );
            self.publish(DrawEvent::PlayerAdvanced {
                from_match_id: match_id,
                to_match_id: write.match_id,
                slot: write.slot,
                participant_id: write.participant_id,
                ready: parent.is_ready(),
            });
        }

        Ok(result)
    }

    // =============================================================================
    // QUERIES
    // =============================================================================

    pub async fn get_draw(&self, key: DrawKey) -> Result<Draw, DrawError> {
        self.load(key).await
    }

    pub async fn list_draws(&self) -> Result<Vec<DrawKey>, DrawError> {
        self.store.list_draw_keys().await
    }

    pub async fn get_group(&self, key: DrawKey, group_id: Uuid) -> Result<GroupView, DrawError> {
        let draw = self.load(key).await?;
        draw.group_view(group_id)
            .ok_or_else(|| DrawError::not_found(format!("group {}", group_id)))
    }

    pub async fn get_standings(
        &self,
        key: DrawKey,
        group_id: Uuid,
    ) -> Result<Vec<StandingEntry>, DrawError> {
        Ok(self.get_group(key, group_id).await?.standings)
    }

    /// Pending matches with both slots filled
    pub async fn get_playable_matches(&self, key: DrawKey) -> Result<Vec<Match>, DrawError> {
        let draw = self.load(key).await?;
        Ok(draw.playable_matches().into_iter().cloned().collect())
    }

    pub async fn get_knockout_rounds(&self, key: DrawKey) -> Result<Vec<RoundView>, DrawError> {
        Ok(self.load(key).await?.knockout_rounds())
    }

    /// Check the stored match graph of a draw without changing it
    pub async fn audit_draw(&self, key: DrawKey) -> Result<(), DrawError> {
        let draw = self.load(key).await?;
        match_graph::validate(&draw.matches).map_err(|e| flag_corruption(key, &draw.matches, e))?;

        debug!(
            tournament_id = %key.tournament_id,
            category_id = %key.category_id,
            matches = draw.matches.len(),
            "Draw passed audit"
        );
        Ok(())
    }

    // =============================================================================
    // HELPERS
    // =============================================================================

    async fn lock_draw(&self, key: DrawKey) -> Result<OwnedMutexGuard<()>, DrawError> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| DrawError::internal("Failed to acquire draw lock table"))?;
            // Entries only the table still references have no holder or waiter
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(key).or_default().clone()
        };
        Ok(lock.lock_owned().await)
    }

    #[cfg(test)]
    pub(crate) fn tracked_draw_locks(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    async fn load(&self, key: DrawKey) -> Result<Draw, DrawError> {
        self.store
            .load_draw(key)
            .await?
            .ok_or_else(|| DrawError::not_found(format!("draw {}", key)))
    }

    async fn draw_key_for(&self, match_id: Uuid) -> Result<DrawKey, DrawError> {
        self.store
            .find_draw_key(match_id)
            .await?
            .ok_or_else(|| DrawError::not_found(format!("match {}", match_id)))
    }

    fn publish(&self, event: DrawEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }
}

fn ensure_knockout_untouched(draw: &Draw) -> Result<(), DrawError> {
    match draw.started_knockout_matches() {
        0 => Ok(()),
        started => Err(DrawError::KnockoutAlreadyStarted(started)),
    }
}

fn ensure_groups_untouched(draw: &Draw) -> Result<(), DrawError> {
    match draw.started_group_matches() {
        0 => Ok(()),
        started => Err(DrawError::GroupStageAlreadyStarted(started)),
    }
}

/// Group qualifiers in pairing order, reseeded 1..=Q for the bracket.
fn collect_qualifiers(draw: &Draw) -> Result<Vec<Participant>, DrawError> {
    let per_group: Vec<Vec<Uuid>> = draw
        .groups
        .iter()
        .map(|group| {
            let matches: Vec<Match> = draw.group_matches(group.id).cloned().collect();
            let table = standings::compute_standings(&group.slots, &matches);
            standings::qualifiers(&table, draw.advance_from_group)
                .iter()
                .map(|entry| entry.participant_id)
                .collect()
        })
        .collect();

    let ordered: Vec<Uuid> = match draw.qualifier_pairing {
        QualifierPairing::Concatenate => per_group.into_iter().flatten().collect(),
        QualifierPairing::CrossGroup => {
            let depth = per_group.iter().map(Vec::len).max().unwrap_or(0);
            (0..depth)
                .flat_map(|rank| per_group.iter().filter_map(move |q| q.get(rank).copied()))
                .collect()
        }
    };

    ordered
        .iter()
        .enumerate()
        .map(|(i, id)| {
            draw.participant(*id)
                .map(|p| p.reseeded(i as u32 + 1))
                .ok_or_else(|| DrawError::corrupt(format!("qualifier {} is not on the roster", id)))
        })
        .collect()
}

fn flag_corruption(key: DrawKey, matches: &[Match], err: DrawError) -> DrawError {
    if let DrawError::CorruptBracket(detail) = &err {
        error!(
            tournament_id = %key.tournament_id,
            category_id = %key.category_id,
            detail = %detail,
            graph = %match_graph::graph_dump(matches),
            "Corrupt bracket detected"
        );
    }
    err
}
