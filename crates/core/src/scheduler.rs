//! FSRS-4.5 review scheduling with the published default weights.

use crate::DeckError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

const DEFAULT_WEIGHTS: [f64; 17] = [
    0.4872, 1.4003, 3.7145, 13.8206, 5.1618, 1.2298, 0.8975, 0.031, 1.6474, 0.1367, 1.0461,
    2.1072, 0.0793, 0.3246, 1.587, 0.2272, 2.8755,
];
const DECAY: f64 = -0.5;
const FACTOR: f64 = 19.0 / 81.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Rating {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

impl Rating {
    pub const ALL: [Rating; 4] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy];

    fn value(self) -> f64 {
        self as u8 as f64
    }
}

impl TryFrom<u8> for Rating {
    type Error = DeckError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Rating::Again),
            2 => Ok(Rating::Hard),
            3 => Ok(Rating::Good),
            4 => Ok(Rating::Easy),
            other => Err(DeckError::InvalidRating(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CardState {
    #[default]
    New,
    Learning,
    Review,
    Relearning,
}

/// Memory state of one card.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulingState {
    pub due: DateTime<Utc>,
    pub stability: f64,
    pub difficulty: f64,
    pub elapsed_days: i64,
    pub scheduled_days: i64,
    pub reps: u32,
    pub lapses: u32,
    pub state: CardState,
    pub last_review: Option<DateTime<Utc>>,
}

impl SchedulingState {
    /// A new card, due immediately.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            due: now,
            stability: 0.0,
            difficulty: 0.0,
            elapsed_days: 0,
            scheduled_days: 0,
            reps: 0,
            lapses: 0,
            state: CardState::New,
            last_review: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due <= now
    }
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    weights: [f64; 17],
    request_retention: f64,
    maximum_interval: i64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            weights: DEFAULT_WEIGHTS,
            request_retention: 0.9,
            maximum_interval: 36_500,
        }
    }
}

impl Scheduler {
    pub fn new(request_retention: f64, maximum_interval: i64) -> Self {
        Self {
            request_retention,
            maximum_interval,
            ..Self::default()
        }
    }

    /// The next state for `card` after it is answered with `rating` at `now`.
    pub fn review(&self, card: &SchedulingState, rating: Rating, now: DateTime<Utc>) -> SchedulingState {
        let mut base = card.clone();
        base.elapsed_days = match (card.state, card.last_review) {
            (CardState::New, _) | (_, None) => 0,
            (_, Some(last)) => (now - last).num_days().max(0),
        };
        base.last_review = Some(now);
        base.reps += 1;

        let mut outcomes = Rating::ALL.map(|_| base.clone());
        self.update_states(&mut outcomes, card.state);

        match card.state {
            CardState::New => {
                for (outcome, rating) in outcomes.iter_mut().zip(Rating::ALL) {
                    outcome.difficulty = self.init_difficulty(rating);
                    outcome.stability = self.init_stability(rating);
                }
                let [again, hard, good, easy] = &mut outcomes;
                again.due = now + Duration::minutes(1);
                hard.due = now + Duration::minutes(5);
                good.due = now + Duration::minutes(10);
                let easy_interval = self.next_interval(easy.stability);
                easy.scheduled_days = easy_interval;
                easy.due = now + Duration::days(easy_interval);
            }
            CardState::Learning | CardState::Relearning => {
                let good_interval = self.next_interval(outcomes[2].stability);
                let easy_interval = self.next_interval(outcomes[3].stability).max(good_interval + 1);
                schedule(&mut outcomes, now, 0, good_interval, easy_interval);
            }
            CardState::Review => {
                let retrievability = forgetting_curve(base.elapsed_days as f64, card.stability);
                for (outcome, rating) in outcomes.iter_mut().zip(Rating::ALL) {
                    outcome.difficulty = self.next_difficulty(card.difficulty, rating);
                    outcome.stability = match rating {
                        Rating::Again => {
                            self.next_forget_stability(card.difficulty, card.stability, retrievability)
                        }
                        _ => self.next_recall_stability(
                            card.difficulty,
                            card.stability,
                            retrievability,
                            rating,
                        ),
                    };
                }
                let hard_interval = self.next_interval(outcomes[1].stability);
                let good_interval = self.next_interval(outcomes[2].stability);
                let hard_interval = hard_interval.min(good_interval);
                let good_interval = good_interval.max(hard_interval + 1);
                let easy_interval = self.next_interval(outcomes[3].stability).max(good_interval + 1);
                schedule(&mut outcomes, now, hard_interval, good_interval, easy_interval);
            }
        }

        let [again, hard, good, easy] = outcomes;
        match rating {
            Rating::Again => again,
            Rating::Hard => hard,
            Rating::Good => good,
            Rating::Easy => easy,
        }
    }

    fn update_states(&self, outcomes: &mut [SchedulingState; 4], state: CardState) {
        let [again, hard, good, easy] = outcomes;
        match state {
            CardState::New => {
                again.state = CardState::Learning;
                hard.state = CardState::Learning;
                good.state = CardState::Learning;
                easy.state = CardState::Review;
            }
            CardState::Learning | CardState::Relearning => {
                again.state = state;
                hard.state = state;
                good.state = CardState::Review;
                easy.state = CardState::Review;
            }
            CardState::Review => {
                again.state = CardState::Relearning;
                again.lapses += 1;
                hard.state = CardState::Review;
                good.state = CardState::Review;
                easy.state = CardState::Review;
            }
        }
    }

    fn init_stability(&self, rating: Rating) -> f64 {
        self.weights[rating as usize - 1].max(0.1)
    }

    fn init_difficulty(&self, rating: Rating) -> f64 {
        (self.weights[4] - self.weights[5] * (rating.value() - 3.0)).clamp(1.0, 10.0)
    }

    fn next_interval(&self, stability: f64) -> i64 {
        let interval = stability / FACTOR * (self.request_retention.powf(1.0 / DECAY) - 1.0);
        (interval.round() as i64).clamp(1, self.maximum_interval)
    }

    fn next_difficulty(&self, difficulty: f64, rating: Rating) -> f64 {
        let next = difficulty - self.weights[6] * (rating.value() - 3.0);
        self.mean_reversion(self.weights[4], next).clamp(1.0, 10.0)
    }

    fn mean_reversion(&self, initial: f64, current: f64) -> f64 {
        self.weights[7] * initial + (1.0 - self.weights[7]) * current
    }

    fn next_recall_stability(&self, difficulty: f64, stability: f64, retrievability: f64, rating: Rating) -> f64 {
        let w = &self.weights;
        let hard_penalty = if rating == Rating::Hard { w[15] } else { 1.0 };
        let easy_bonus = if rating == Rating::Easy { w[16] } else { 1.0 };
        stability
            * (1.0
                + w[8].exp()
                    * (11.0 - difficulty)
                    * stability.powf(-w[9])
                    * (((1.0 - retrievability) * w[10]).exp() - 1.0)
                    * hard_penalty
                    * easy_bonus)
    }

    fn next_forget_stability(&self, difficulty: f64, stability: f64, retrievability: f64) -> f64 {
        let w = &self.weights;
        w[11]
            * difficulty.powf(-w[12])
            * ((stability + 1.0).powf(w[13]) - 1.0)
            * ((1.0 - retrievability) * w[14]).exp()
    }
}

fn forgetting_curve(elapsed_days: f64, stability: f64) -> f64 {
    (1.0 + FACTOR * elapsed_days / stability).powf(DECAY)
}

fn schedule(
    outcomes: &mut [SchedulingState; 4],
    now: DateTime<Utc>,
    hard_interval: i64,
    good_interval: i64,
    easy_interval: i64,
) {
    let [again, hard, good, easy] = outcomes;
    again.scheduled_days = 0;
    again.due = now + Duration::minutes(5);

    hard.scheduled_days = hard_interval;
    hard.due = if hard_interval > 0 {
        now + Duration::days(hard_interval)
    } else {
        now + Duration::minutes(10)
    };

    good.scheduled_days = good_interval;
    good.due = now + Duration::days(good_interval);

    easy.scheduled_days = easy_interval;
    easy.due = now + Duration::days(easy_interval);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).single().expect("valid timestamp")
    }

    #[test]
    fn new_card_good_enters_learning_for_ten_minutes() {
        let scheduler = Scheduler::default();
        let now = start();
        let next = scheduler.review(&SchedulingState::new(now), Rating::Good, now);

        assert_eq!(next.state, CardState::Learning);
        assert_eq!(next.due, now + Duration::minutes(10));
        assert_eq!(next.reps, 1);
        assert_eq!(next.stability, 3.7145);
        assert_eq!(next.difficulty, 5.1618);
        assert_eq!(next.last_review, Some(now));
    }

    #[test]
    fn new_card_easy_graduates_to_review() {
        let scheduler = Scheduler::default();
        let now = start();
        let next = scheduler.review(&SchedulingState::new(now), Rating::Easy, now);

        assert_eq!(next.state, CardState::Review);
        // 13.8206 days of stability at 90% retention rounds to 14 days.
        assert_eq!(next.scheduled_days, 14);
        assert_eq!(next.due, now + Duration::days(14));
        assert!((next.difficulty - (5.1618 - 1.2298)).abs() < 1e-9);
    }

    #[test]
    fn interval_equals_stability_at_ninety_percent_retention() {
        let scheduler = Scheduler::default();
        assert_eq!(scheduler.next_interval(10.0), 10);
        assert_eq!(scheduler.next_interval(0.2), 1);
        assert_eq!(scheduler.next_interval(1.0e9), 36_500);
    }

    #[test]
    fn learning_card_good_graduates_with_day_interval() {
        let scheduler = Scheduler::default();
        let now = start();
        let learning = scheduler.review(&SchedulingState::new(now), Rating::Good, now);
        let later = now + Duration::minutes(10);

        let hard = scheduler.review(&learning, Rating::Hard, later);
        assert_eq!(hard.state, CardState::Learning);
        assert_eq!(hard.due, later + Duration::minutes(10));

        let good = scheduler.review(&learning, Rating::Good, later);
        assert_eq!(good.state, CardState::Review);
        assert_eq!(good.scheduled_days, 4);
        assert_eq!(good.reps, 2);
    }

    #[test]
    fn review_lapse_moves_to_relearning() {
        let scheduler = Scheduler::default();
        let now = start();
        let mut card = scheduler.review(&SchedulingState::new(now), Rating::Easy, now);
        let review_at = card.due;

        let lapsed = scheduler.review(&card, Rating::Again, review_at);
        assert_eq!(lapsed.state, CardState::Relearning);
        assert_eq!(lapsed.lapses, 1);
        assert_eq!(lapsed.due, review_at + Duration::minutes(5));
        assert!(lapsed.stability < card.stability);

        card = scheduler.review(&card, Rating::Good, review_at);
        assert_eq!(card.state, CardState::Review);
        assert!(card.scheduled_days > 14);
    }

    #[test]
    fn review_intervals_are_ordered_by_rating() {
        let scheduler = Scheduler::default();
        let now = start();
        let card = scheduler.review(&SchedulingState::new(now), Rating::Easy, now);
        let at = card.due;

        let days = Rating::ALL.map(|rating| scheduler.review(&card, rating, at).scheduled_days);
        assert_eq!(days[0], 0);
        assert!(days[1] < days[2]);
        assert!(days[2] < days[3]);
    }

    #[test]
    fn ratings_outside_one_to_four_are_rejected() {
        assert_eq!(Rating::try_from(3).ok(), Some(Rating::Good));
        assert!(matches!(Rating::try_from(0), Err(DeckError::InvalidRating(0))));
        assert!(matches!(Rating::try_from(5), Err(DeckError::InvalidRating(5))));
    }
}
