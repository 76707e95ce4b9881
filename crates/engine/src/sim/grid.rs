use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::actor::{ActorId, CoordinateHolder};
use super::collision::Body;

/// Integer cell position. `x` grows to the right, `y` grows downward (row-major).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct GridCoord {
    pub x: i32,
    pub y: i32,
}

impl GridCoord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, direction: Direction) -> Self {
        let (dx, dy) = direction.delta();
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }
}

impl fmt::Display for GridCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Self::Up => (0, -1),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
        }
    }

    pub fn from_axis_sign(dx: i32, dy: i32) -> Option<Self> {
        match (dx.signum(), dy.signum()) {
            (1, 0) => Some(Self::Right),
            (-1, 0) => Some(Self::Left),
            (0, 1) => Some(Self::Down),
            (0, -1) => Some(Self::Up),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_zero(self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    pub fn scaled(self, factor: f32) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
        }
    }
}

/// Outcome of a placement attempt.
///
/// `blocked` is only populated when `placed` is false. An out-of-bounds target
/// yields `placed == false` with both sets empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceResult {
    pub placed: bool,
    pub blocked: BTreeSet<ActorId>,
    pub overlapped: BTreeSet<ActorId>,
}

impl PlaceResult {
    fn out_of_bounds() -> Self {
        Self::default()
    }

    fn blocked_by(blocked: BTreeSet<ActorId>) -> Self {
        Self {
            placed: false,
            blocked,
            overlapped: BTreeSet::new(),
        }
    }

    fn placed_with(overlapped: BTreeSet<ActorId>) -> Self {
        Self {
            placed: true,
            blocked: BTreeSet::new(),
            overlapped,
        }
    }

    pub fn is_out_of_bounds(&self) -> bool {
        !self.placed && self.blocked.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    coordinates: GridCoord,
    occupants: BTreeMap<ActorId, Body>,
}

impl Cell {
    fn new(coordinates: GridCoord) -> Self {
        Self {
            coordinates,
            occupants: BTreeMap::new(),
        }
    }

    pub fn coordinates(&self) -> GridCoord {
        self.coordinates
    }

    pub fn contains(&self, actor: ActorId) -> bool {
        self.occupants.contains_key(&actor)
    }

    pub fn is_empty(&self) -> bool {
        self.occupants.is_empty()
    }

    pub fn occupants(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.occupants.keys().copied()
    }

    fn collect_others(
        &self,
        actor: ActorId,
        mut predicate: impl FnMut(&Body) -> bool,
    ) -> BTreeSet<ActorId> {
        self.occupants
            .iter()
            .filter(|(id, body)| **id != actor && predicate(body))
            .map(|(id, _)| *id)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("grid dimensions must be non-zero, got {width}x{height}")]
    ZeroSized { width: u32, height: u32 },
    #[error("grid dimensions {width}x{height} exceed the addressable range")]
    TooLarge { width: u32, height: u32 },
}

/// Collision-aware spatial index. Each coordinate holder occupies at most one
/// cell; a rejected placement never mutates any cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    width: u32,
    height: u32,
    cells: Vec<Cell>,
}

impl Grid {
    pub fn new(width: u32, height: u32) -> Result<Self, GridError> {
        if width == 0 || height == 0 {
            return Err(GridError::ZeroSized { width, height });
        }
        if width > i32::MAX as u32 || height > i32::MAX as u32 {
            return Err(GridError::TooLarge { width, height });
        }
        let mut cells = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                cells.push(Cell::new(GridCoord::new(x, y)));
            }
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn contains(&self, coord: GridCoord) -> bool {
        self.index_of(coord).is_some()
    }

    pub fn index_of(&self, coord: GridCoord) -> Option<usize> {
        if coord.x < 0 || coord.y < 0 {
            return None;
        }
        let (x, y) = (coord.x as u32, coord.y as u32);
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    pub fn cell(&self, coord: GridCoord) -> Option<&Cell> {
        self.index_of(coord).and_then(|index| self.cells.get(index))
    }

    fn cell_mut(&mut self, coord: GridCoord) -> Option<&mut Cell> {
        self.index_of(coord).and_then(|index| self.cells.get_mut(index))
    }

    pub fn occupants_at(&self, coord: GridCoord) -> Vec<ActorId> {
        self.cell(coord)
            .map(|cell| cell.occupants().collect())
            .unwrap_or_default()
    }

    /// Inserts `holder` into the cell at `target` when no occupant blocks it.
    ///
    /// This does not clear any previous cell membership; relocating an already
    /// placed holder goes through [`Grid::move_to`].
    pub fn place(
        &mut self,
        actor: ActorId,
        holder: &mut CoordinateHolder,
        target: GridCoord,
    ) -> PlaceResult {
        let body = holder.body;
        let Some(cell) = self.cell_mut(target) else {
            return PlaceResult::out_of_bounds();
        };

        let blocked = cell.collect_others(actor, |other| body.blocks(other));
        if !blocked.is_empty() {
            return PlaceResult::blocked_by(blocked);
        }

        let overlapped = cell.collect_others(actor, |other| body.overlaps(other));
        cell.occupants.insert(actor, body);
        holder.coordinates = Some(target);
        PlaceResult::placed_with(overlapped)
    }

    pub fn remove(&mut self, actor: ActorId, from: GridCoord) -> bool {
        self.cell_mut(from)
            .map(|cell| cell.occupants.remove(&actor).is_some())
            .unwrap_or(false)
    }

    /// Places at `target` first and only then leaves the previous cell, so a
    /// failed move leaves both cells untouched.
    pub fn move_to(
        &mut self,
        actor: ActorId,
        holder: &mut CoordinateHolder,
        target: GridCoord,
    ) -> PlaceResult {
        let previous = holder.coordinates;
        let result = self.place(actor, holder, target);
        if result.placed {
            if let Some(previous) = previous.filter(|previous| *previous != target) {
                self.remove(actor, previous);
            }
        }
        result
    }

    /// Number of cells containing `actor`. Used to audit the single-cell invariant.
    pub fn membership_count(&self, actor: ActorId) -> usize {
        self.cells.iter().filter(|cell| cell.contains(actor)).count()
    }
}
