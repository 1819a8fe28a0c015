use crate::{
    error::Result,
    transitions::traits::{clamp_progress, TransitionEffect},
    video::{Frame, Surface, TransitionType},
};

/// Push transition: the incoming frame enters from one edge while the
/// outgoing frame leaves through the opposite edge
///
/// Both frames move together, so there is never a gap between them.
pub struct SlideTransition {
    kind: TransitionType,
}

impl SlideTransition {
    /// Outgoing frame moves left, incoming enters from the right
    pub fn left() -> Self {
        Self {
            kind: TransitionType::SlideLeft,
        }
    }

    /// Outgoing frame moves right, incoming enters from the left
    pub fn right() -> Self {
        Self {
            kind: TransitionType::SlideRight,
        }
    }
}

impl TransitionEffect for SlideTransition {
    fn kind(&self) -> TransitionType {
        self.kind
    }

    fn description(&self) -> &str {
        match self.kind {
            TransitionType::SlideRight => "Slide the next clip in from the left edge",
            _ => "Slide the next clip in from the right edge",
        }
    }

    fn render(
        &self,
        surface: &mut Surface,
        outgoing: &Frame,
        incoming: &Frame,
        progress: f32,
    ) -> Result<()> {
        let progress = clamp_progress(progress);
        let width = surface.width() as i64;
        let shift = (width as f32 * progress).round() as i64;

        let (outgoing_x, incoming_x) = match self.kind {
            TransitionType::SlideRight => (shift, shift - width),
            _ => (-shift, width - shift),
        };

        surface.draw(outgoing, outgoing_x, 1.0)?;
        surface.draw(incoming, incoming_x, 1.0)
    }
}
