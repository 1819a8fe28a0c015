use crate::{
    error::Result,
    transitions::traits::{clamp_progress, TransitionEffect},
    video::{Frame, Surface, TransitionType},
};

/// Cross-dissolve: outgoing frame fully opaque, incoming frame on top at opacity `progress`
pub struct FadeTransition;

impl FadeTransition {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FadeTransition {
    fn default() -> Self {
        Self::new()
    }
}

impl TransitionEffect for FadeTransition {
    fn kind(&self) -> TransitionType {
        TransitionType::Fade
    }

    fn description(&self) -> &str {
        "Cross-dissolve from the outgoing clip into the incoming clip"
    }

    fn render(
        &self,
        surface: &mut Surface,
        outgoing: &Frame,
        incoming: &Frame,
        progress: f32,
    ) -> Result<()> {
        let progress = clamp_progress(progress);
        surface.draw(outgoing, 0, 1.0)?;
        surface.draw(incoming, 0, progress)
    }
}
