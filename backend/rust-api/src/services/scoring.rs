use serde::Deserialize;

use crate::models::SessionState;

/// Points and leveling parameters. Defaults: 10 per correct answer, 0 per
/// incorrect one, a new level every `level * 100` experience, no streak bonus.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScoringRules {
    pub points_per_correct: u32,
    pub points_per_incorrect: u32,
    pub level_step: u32,
    pub streak_threshold: u32,
    pub streak_bonus: u32,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            points_per_correct: 10,
            points_per_incorrect: 0,
            level_step: 100,
            streak_threshold: 3,
            streak_bonus: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreChange {
    pub points: u32,
    pub level_ups: Vec<u32>,
}

impl ScoringRules {
    /// Applies one evaluated answer to score, experience, streak and level.
    pub fn apply(&self, state: &mut SessionState, correct: bool) -> ScoreChange {
        let points = if correct {
            state.correct_count += 1;
            state.streak += 1;
            let bonus = if self.streak_bonus > 0 && state.streak >= self.streak_threshold {
                self.streak_bonus
            } else {
                0
            };
            self.points_per_correct + bonus
        } else {
            state.streak = 0;
            self.points_per_incorrect
        };

        state.score = state.score.saturating_add(points);
        state.experience = state.experience.saturating_add(points);

        let level_ups = self.level_up(state);
        ScoreChange { points, level_ups }
    }

    /// Raises the level until experience sits below the next threshold.
    /// Returns every level reached, in order.
    pub fn level_up(&self, state: &mut SessionState) -> Vec<u32> {
        let step = self.level_step.max(1);
        let mut reached = Vec::new();
        while state.experience >= state.level.saturating_mul(step) {
            state.level += 1;
            reached.push(state.level);
        }
        reached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SessionState {
        SessionState::new("player", "Topic")
    }

    #[test]
    fn correct_answer_awards_default_points() {
        let rules = ScoringRules::default();
        let mut state = state();

        let change = rules.apply(&mut state, true);

        assert_eq!(change.points, 10);
        assert_eq!(state.score, 10);
        assert_eq!(state.experience, 10);
        assert_eq!(state.correct_count, 1);
        assert!(change.level_ups.is_empty());
    }

    #[test]
    fn incorrect_answer_changes_nothing_but_streak() {
        let rules = ScoringRules::default();
        let mut state = state();
        state.streak = 4;

        let change = rules.apply(&mut state, false);

        assert_eq!(change.points, 0);
        assert_eq!(state.score, 0);
        assert_eq!(state.experience, 0);
        assert_eq!(state.streak, 0);
        assert_eq!(state.correct_count, 0);
    }

    #[test]
    fn crossing_threshold_levels_up_once() {
        let rules = ScoringRules::default();
        let mut state = state();
        state.experience = 90;

        let change = rules.apply(&mut state, true);

        assert_eq!(state.experience, 100);
        assert_eq!(state.level, 2);
        assert_eq!(change.level_ups, vec![2]);
    }

    #[test]
    fn large_award_levels_up_repeatedly() {
        let rules = ScoringRules {
            points_per_correct: 350,
            ..ScoringRules::default()
        };
        let mut state = state();

        let change = rules.apply(&mut state, true);

        assert_eq!(state.experience, 350);
        assert_eq!(change.level_ups, vec![2, 3, 4]);
        assert!(state.experience < state.level * rules.level_step);
    }

    #[test]
    fn level_never_lags_experience() {
        let rules = ScoringRules::default();
        let mut state = state();
        for _ in 0..57 {
            rules.apply(&mut state, true);
            assert!(state.experience < state.level * 100);
            assert!(state.level * 100 <= state.experience + rules.points_per_correct + 100);
            assert_eq!(state.level, state.experience / 100 + 1);
        }
    }

    #[test]
    fn streak_bonus_applies_after_threshold() {
        let rules = ScoringRules {
            streak_bonus: 5,
            ..ScoringRules::default()
        };
        let mut state = state();

        let points: Vec<u32> = (0..5).map(|_| rules.apply(&mut state, true).points).collect();

        assert_eq!(points, vec![10, 10, 15, 15, 15]);
        assert_eq!(state.score, 65);
        assert_eq!(state.streak, 5);
    }

    #[test]
    fn substituted_incorrect_points_are_applied() {
        let rules = ScoringRules {
            points_per_correct: 3,
            points_per_incorrect: 1,
            ..ScoringRules::default()
        };
        let mut state = state();

        rules.apply(&mut state, true);
        rules.apply(&mut state, false);

        assert_eq!(state.score, 4);
        assert_eq!(state.experience, 4);
    }
}
