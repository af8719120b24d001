use crate::models::Flashcard;
use crate::scheduler::{Rating, Scheduler, SchedulingState};
use crate::DeckError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const LEARNED_REPS: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredCard {
    #[serde(flatten)]
    pub card: Flashcard,
    pub schedule: SchedulingState,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_reviewed: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct DeckStats {
    pub total: usize,
    pub due: usize,
    pub learned: usize,
    /// Percentage of cards with at least three reviews.
    pub retention_rate: f64,
}

/// Flashcards and their review schedules, persisted as one JSON file.
pub struct FlashcardDeck {
    path: PathBuf,
    cards: BTreeMap<String, StoredCard>,
    scheduler: Scheduler,
}

impl FlashcardDeck {
    /// Opens the store at `path`, starting empty when the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DeckError> {
        let path = path.into();
        let cards = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)?
            }
        } else {
            debug!(path = %path.display(), "no flashcard store yet");
            BTreeMap::new()
        };

        Ok(Self {
            path,
            cards,
            scheduler: Scheduler::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&StoredCard> {
        self.cards.get(id)
    }

    pub fn save(&self) -> Result<(), DeckError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(&self.cards)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }

    /// Adds cards whose ids are not stored yet and saves; returns how many were new.
    pub fn add_cards(&mut self, cards: Vec<Flashcard>, now: DateTime<Utc>) -> Result<usize, DeckError> {
        let offered = cards.len();
        let mut added = 0;
        for card in cards {
            if self.cards.contains_key(&card.id) {
                continue;
            }
            self.cards.insert(
                card.id.clone(),
                StoredCard {
                    card,
                    schedule: SchedulingState::new(now),
                    created_at: now,
                    last_reviewed: None,
                },
            );
            added += 1;
        }

        self.save()?;
        info!(added, skipped = offered - added, "flashcards added");
        Ok(added)
    }

    /// Due cards, most overdue first.
    pub fn due_cards(
        &self,
        subject: Option<&str>,
        topic: Option<&str>,
        now: DateTime<Utc>,
    ) -> Vec<&StoredCard> {
        let mut due = self
            .cards
            .values()
            .filter(|stored| matches_scope(stored, subject, topic))
            .filter(|stored| stored.schedule.is_due(now))
            .collect::<Vec<_>>();
        due.sort_by_key(|stored| stored.schedule.due);
        due
    }

    pub fn review_card(&mut self, id: &str, rating: Rating, now: DateTime<Utc>) -> Result<&StoredCard, DeckError> {
        let Some(stored) = self.cards.get_mut(id) else {
            warn!(id, "review requested for unknown card");
            return Err(DeckError::UnknownCard(id.to_string()));
        };

        stored.schedule = self.scheduler.review(&stored.schedule, rating, now);
        stored.last_reviewed = Some(now);
        debug!(
            id,
            ?rating,
            due = %stored.schedule.due,
            state = ?stored.schedule.state,
            "card reviewed"
        );

        self.save()?;
        self.cards
            .get(id)
            .ok_or_else(|| DeckError::UnknownCard(id.to_string()))
    }

    pub fn stats(&self, subject: Option<&str>, now: DateTime<Utc>) -> DeckStats {
        let mut stats = DeckStats::default();
        for stored in self.cards.values().filter(|stored| matches_scope(stored, subject, None)) {
            stats.total += 1;
            if stored.schedule.is_due(now) {
                stats.due += 1;
            }
            if stored.schedule.reps >= LEARNED_REPS {
                stats.learned += 1;
            }
        }
        if stats.total > 0 {
            stats.retention_rate = stats.learned as f64 / stats.total as f64 * 100.0;
        }
        stats
    }
}

fn matches_scope(stored: &StoredCard, subject: Option<&str>, topic: Option<&str>) -> bool {
    subject.map_or(true, |subject| stored.card.subject == subject)
        && topic.map_or(true, |topic| stored.card.topic == topic)
}
