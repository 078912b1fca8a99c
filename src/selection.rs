use crate::{
    boundary::BoundaryPointIndex,
    datatypes::{BoundaryPoint, Constraint, Rect, Vertex},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionState {
    Idle,
    Dragging { anchor: Vertex, current: Vertex },
}

/// Annotation commands applied to the current selection
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    ApplyXConstraint,
    ApplyYConstraint,
    ClearConstraints,
    /// Overwrites, does not accumulate
    ApplyForce { fx: f64, fy: f64 },
    ClearForce,
}

impl Command {
    pub fn apply_to(&self, point: &mut BoundaryPoint) {
        match *self {
            Command::ApplyXConstraint => point.x_constraint = Constraint::Fixed,
            Command::ApplyYConstraint => point.y_constraint = Constraint::Fixed,
            Command::ClearConstraints => {
                point.x_constraint = Constraint::Free;
                point.y_constraint = Constraint::Free;
            }
            Command::ApplyForce { fx, fy } => {
                point.force_x = fx;
                point.force_y = fy;
            }
            Command::ClearForce => {
                point.force_x = 0.0;
                point.force_y = 0.0;
            }
        }
    }
}

/// Rectangle selection over the boundary point index
///
/// The selection is re-queried from the last committed or in-progress
/// rectangle every frame.
#[derive(Debug, Clone)]
pub struct SelectionEngine {
    state: SelectionState,
    rect: Option<Rect>,
    selected: Vec<usize>,
}

impl Default for SelectionEngine {
    fn default() -> Self {
        SelectionEngine::new()
    }
}

impl SelectionEngine {
    pub fn new() -> SelectionEngine {
        SelectionEngine {
            state: SelectionState::Idle,
            rect: None,
            selected: Vec::new(),
        }
    }

    pub fn state(&self) -> SelectionState {
        self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, SelectionState::Dragging { .. })
    }

    pub fn rect(&self) -> Option<Rect> {
        self.rect
    }

    /// Slots into the boundary index, as of the last refresh
    pub fn selected(&self) -> &[usize] {
        &self.selected
    }

    pub fn begin(&mut self, anchor: Vertex) {
        self.state = SelectionState::Dragging {
            anchor,
            current: anchor,
        };
        self.rect = Some(Rect::from_corners(anchor, anchor));
    }

    pub fn move_to(&mut self, point: Vertex) {
        if let SelectionState::Dragging { anchor, .. } = self.state {
            self.state = SelectionState::Dragging {
                anchor,
                current: point,
            };
            self.rect = Some(Rect::from_corners(anchor, point));
        }
    }

    /// Commits the rectangle; it stays in use until the next `begin`
    pub fn end(&mut self, point: Vertex) {
        if let SelectionState::Dragging { anchor, .. } = self.state {
            self.rect = Some(Rect::from_corners(anchor, point));
            self.state = SelectionState::Idle;
        }
    }

    pub fn refresh(&mut self, index: &BoundaryPointIndex) -> &[usize] {
        if let Some(rect) = self.rect {
            self.selected = index.query(&rect);
        }
        &self.selected
    }

    /// Applies `command` to every selected point
    ///
    /// # Returns
    /// The number of points touched; zero is not an error
    pub fn apply(&self, command: Command, index: &mut BoundaryPointIndex) -> usize {
        if self.selected.is_empty() {
            log::debug!("{command:?} on an empty selection");
            return 0;
        }
        index.update(&self.selected, |p| command.apply_to(p));
        log::debug!("{command:?} applied to {} points", self.selected.len());
        self.selected.len()
    }
}
