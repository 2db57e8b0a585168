//! Column drag-resize state machine
//!
//! `Idle → Resizing → Idle`. Pointer samples only move the candidate width and
//! the guide line; nothing is written to the table until the drag ends. The
//! body-level `resize-active` class is a projection of [`ResizeState`].

use serde::{Deserialize, Serialize};

/// Table geometry captured when a drag starts
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableFrame {
    /// Left edge of the table in viewport coordinates
    pub left: f64,
    pub height: f64,
}

/// Vertical guide shown while dragging, relative to the table's left edge
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GuideLine {
    pub left: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeSession {
    pub column: usize,
    pub start_x: f64,
    pub start_width: u32,
    pub candidate: u32,
    frame: TableFrame,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ResizeState {
    #[default]
    Idle,
    Resizing(ResizeSession),
}

/// Width to lock onto a column when a drag ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeCommit {
    pub column: usize,
    pub width: u32,
}

#[derive(Debug)]
pub struct ResizeHandler {
    state: ResizeState,
    min_width: u32,
}

impl ResizeHandler {
    pub fn new(min_width: u32) -> Self {
        Self {
            state: ResizeState::Idle,
            min_width,
        }
    }

    pub fn state(&self) -> &ResizeState {
        &self.state
    }

    pub fn is_resizing(&self) -> bool {
        matches!(self.state, ResizeState::Resizing(_))
    }

    pub fn active_column(&self) -> Option<usize> {
        match self.state {
            ResizeState::Resizing(session) => Some(session.column),
            ResizeState::Idle => None,
        }
    }

    /// Begin a drag. `column_right` is the column's right edge relative to the
    /// table. Returns `None` while another drag is in flight.
    pub fn start(
        &mut self,
        column: usize,
        pointer_x: f64,
        start_width: u32,
        column_right: f64,
        frame: TableFrame,
    ) -> Option<GuideLine> {
        if self.is_resizing() {
            log::debug!("ignoring resize start on column {} during an active drag", column);
            return None;
        }
        let start_width = start_width.max(self.min_width);
        self.state = ResizeState::Resizing(ResizeSession {
            column,
            start_x: pointer_x,
            start_width,
            candidate: start_width,
            frame,
        });
        Some(GuideLine {
            left: column_right,
            height: frame.height,
        })
    }

    /// Track one pointer sample
    pub fn update(&mut self, pointer_x: f64) -> Option<GuideLine> {
        let ResizeState::Resizing(session) = &mut self.state else {
            return None;
        };
        let proposed = f64::from(session.start_width) + (pointer_x - session.start_x);
        session.candidate = proposed.round().max(f64::from(self.min_width)) as u32;
        Some(GuideLine {
            left: pointer_x - session.frame.left,
            height: session.frame.height,
        })
    }

    /// End the drag and hand back the width to commit
    pub fn finish(&mut self) -> Option<ResizeCommit> {
        match std::mem::take(&mut self.state) {
            ResizeState::Resizing(session) => Some(ResizeCommit {
                column: session.column,
                width: session.candidate,
            }),
            ResizeState::Idle => None,
        }
    }

    /// Drop an in-flight drag without committing
    pub fn cancel(&mut self) {
        self.state = ResizeState::Idle;
    }
}
