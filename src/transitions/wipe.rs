use crate::{
    error::Result,
    transitions::traits::{clamp_progress, TransitionEffect},
    video::{Frame, Surface, TransitionType},
};

/// Wipe transition: the incoming frame is revealed inside a rectangle that
/// grows from one edge until it covers the surface
pub struct WipeTransition {
    kind: TransitionType,
}

impl WipeTransition {
    /// Reveal grows from the left edge
    pub fn left() -> Self {
        Self {
            kind: TransitionType::WipeLeft,
        }
    }

    /// Reveal grows from the right edge
    pub fn right() -> Self {
        Self {
            kind: TransitionType::WipeRight,
        }
    }
}

impl TransitionEffect for WipeTransition {
    fn kind(&self) -> TransitionType {
        self.kind
    }

    fn description(&self) -> &str {
        match self.kind {
            TransitionType::WipeRight => "Wipe the next clip in from the right edge",
            _ => "Wipe the next clip in from the left edge",
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
        let width = surface.width();
        let revealed = ((width as f32 * progress).round() as u32).min(width);

        let columns = match self.kind {
            TransitionType::WipeRight => (width - revealed)..width,
            _ => 0..revealed,
        };

        surface.draw(outgoing, 0, 1.0)?;
        surface.draw_clipped(incoming, columns, 1.0)
    }
}
