// Direction/rotation input shared between the caller and the gait thread

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use super::{GaitError, Result};
use crate::geometry::Vector2D;

const DIAGONAL: f64 = 0.707;

/// Direction vocabulary used by voice and teleop callers
pub const NAMED_DIRECTIONS: [(&str, Vector2D); 9] = [
    ("forward", Vector2D::new(0.0, 1.0)),
    ("backward", Vector2D::new(0.0, -1.0)),
    ("left", Vector2D::new(-1.0, 0.0)),
    ("right", Vector2D::new(1.0, 0.0)),
    ("forward right", Vector2D::new(DIAGONAL, DIAGONAL)),
    ("forward left", Vector2D::new(-DIAGONAL, DIAGONAL)),
    ("backward right", Vector2D::new(DIAGONAL, -DIAGONAL)),
    ("backward left", Vector2D::new(-DIAGONAL, -DIAGONAL)),
    ("neutral", Vector2D::ZERO),
];

/// Look up a named direction (case-insensitive, `_` and `-` accepted as spaces)
pub fn named_direction(name: &str) -> Result<Vector2D> {
    let normalized = name.trim().to_lowercase().replace(['_', '-'], " ");
    NAMED_DIRECTIONS
        .iter()
        .find(|(n, _)| *n == normalized)
        .map(|&(_, v)| v)
        .ok_or_else(|| GaitError::UnknownDirection(name.to_string()))
}

/// Requested body motion. The direction is not normalized: its magnitude
/// scales the step. Positive rotation turns the body clockwise; while it is
/// non-zero the direction is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DirectionInput {
    pub direction: Vector2D,
    pub rotation: f64,
}

impl DirectionInput {
    pub fn new(direction: impl Into<Vector2D>, rotation: f64) -> Self {
        Self {
            direction: direction.into(),
            rotation,
        }
    }

    /// No translation and no rotation: march in place
    pub fn is_idle(&self) -> bool {
        self.direction.magnitude() == 0.0 && self.rotation == 0.0
    }
}

/// Mutex-guarded input written by any thread, snapshotted once per phase.
/// A queued input waits for the gait thread to bring the legs to neutral.
#[derive(Debug, Clone, Default)]
pub struct SharedInput {
    inner: Arc<Mutex<DirectionInput>>,
    queued: Arc<Mutex<Option<DirectionInput>>>,
}

impl SharedInput {
    /// Replace the input now. Drops any queued input.
    pub fn set(&self, input: DirectionInput) -> Result<()> {
        let mut guard = self.inner.lock().map_err(|_| GaitError::LockPoisoned)?;
        *guard = input;
        self.queued.lock().map_err(|_| GaitError::LockPoisoned)?.take();
        Ok(())
    }

    /// Copy of the current input
    pub fn snapshot(&self) -> Result<DirectionInput> {
        let guard = self.inner.lock().map_err(|_| GaitError::LockPoisoned)?;
        Ok(*guard)
    }

    /// Hold `input` until the next cycle boundary. A later queue replaces it.
    pub fn queue(&self, input: DirectionInput) -> Result<()> {
        *self.queued.lock().map_err(|_| GaitError::LockPoisoned)? = Some(input);
        Ok(())
    }

    pub fn queued(&self) -> Result<Option<DirectionInput>> {
        Ok(*self.queued.lock().map_err(|_| GaitError::LockPoisoned)?)
    }

    /// Make a previously queued input current, leaving any newer queue alone
    pub(crate) fn apply_queued(&self, input: DirectionInput) -> Result<()> {
        *self.inner.lock().map_err(|_| GaitError::LockPoisoned)? = input;
        Ok(())
    }

    pub fn take_queued(&self) -> Result<Option<DirectionInput>> {
        Ok(self.queued.lock().map_err(|_| GaitError::LockPoisoned)?.take())
    }
}
