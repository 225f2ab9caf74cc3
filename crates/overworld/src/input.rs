use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputAction {
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
}

const ACTION_COUNT: usize = 4;

impl InputAction {
    pub const ALL: [InputAction; ACTION_COUNT] = [
        InputAction::MoveUp,
        InputAction::MoveDown,
        InputAction::MoveLeft,
        InputAction::MoveRight,
    ];

    const fn index(self) -> usize {
        match self {
            InputAction::MoveUp => 0,
            InputAction::MoveDown => 1,
            InputAction::MoveLeft => 2,
            InputAction::MoveRight => 3,
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "up" | "w" => Some(Self::MoveUp),
            "down" | "s" => Some(Self::MoveDown),
            "left" | "a" => Some(Self::MoveLeft),
            "right" | "d" => Some(Self::MoveRight),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionStates {
    down: [bool; ACTION_COUNT],
}

impl ActionStates {
    pub fn set(&mut self, action: InputAction, is_down: bool) {
        self.down[action.index()] = is_down;
    }

    pub fn is_down(&self, action: InputAction) -> bool {
        self.down[action.index()]
    }

    pub fn any_down(&self) -> bool {
        self.down.iter().any(|down| *down)
    }
}

/// Held movement keys for one simulation tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputSnapshot {
    actions: ActionStates,
}

impl InputSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_actions(actions: ActionStates) -> Self {
        Self { actions }
    }

    pub fn with_action_down(mut self, action: InputAction) -> Self {
        self.actions.set(action, true);
        self
    }

    pub fn is_down(&self, action: InputAction) -> bool {
        self.actions.is_down(action)
    }

    /// Opposing keys cancel out, so this can be `false` while keys are held.
    pub fn has_manual_movement(&self) -> bool {
        let (x, y) = self.axis();
        x != 0 || y != 0
    }

    /// Unit-length movement direction; diagonals are normalized.
    pub fn movement_direction(&self) -> (f32, f32) {
        let (x, y) = self.axis();
        if x == 0 && y == 0 {
            return (0.0, 0.0);
        }
        let (x, y) = (x as f32, y as f32);
        let length = (x * x + y * y).sqrt();
        (x / length, y / length)
    }

    fn axis(&self) -> (i32, i32) {
        let mut x = 0;
        let mut y = 0;
        if self.is_down(InputAction::MoveLeft) {
            x -= 1;
        }
        if self.is_down(InputAction::MoveRight) {
            x += 1;
        }
        if self.is_down(InputAction::MoveUp) {
            y -= 1;
        }
        if self.is_down(InputAction::MoveDown) {
            y += 1;
        }
        (x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot_has_no_movement() {
        let input = InputSnapshot::empty();
        assert!(!input.has_manual_movement());
        assert_eq!(input.movement_direction(), (0.0, 0.0));
    }

    #[test]
    fn diagonal_is_normalized() {
        let input = InputSnapshot::empty()
            .with_action_down(InputAction::MoveRight)
            .with_action_down(InputAction::MoveDown);
        let (x, y) = input.movement_direction();
        assert!((x - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert!((y - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn opposing_keys_cancel() {
        let input = InputSnapshot::empty()
            .with_action_down(InputAction::MoveLeft)
            .with_action_down(InputAction::MoveRight);
        assert!(!input.has_manual_movement());
    }

    #[test]
    fn key_tokens_map_to_actions() {
        assert_eq!(InputAction::from_token("W"), Some(InputAction::MoveUp));
        assert_eq!(InputAction::from_token("left"), Some(InputAction::MoveLeft));
        assert_eq!(InputAction::from_token("jump"), None);
    }

    #[test]
    fn action_states_track_release() {
        let mut states = ActionStates::default();
        states.set(InputAction::MoveUp, true);
        assert!(states.any_down());
        states.set(InputAction::MoveUp, false);
        assert!(!states.any_down());
    }
}
