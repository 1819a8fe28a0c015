use crate::{
    error::Result,
    transitions::traits::{clamp_progress, TransitionEffect},
    video::{surface::BLACK, surface::WHITE, Frame, Surface, TransitionType},
};

/// Two-stage fade through a solid color (`fadeblack` / `fadewhite`)
///
/// The first half darkens (or brightens) the outgoing frame towards the
/// color, the second half brings the incoming frame up from it. At
/// progress 0.5 the surface is exactly the solid color.
pub struct DipTransition {
    kind: TransitionType,
    color: [u8; 3],
}

impl DipTransition {
    pub fn black() -> Self {
        Self {
            kind: TransitionType::FadeBlack,
            color: BLACK,
        }
    }

    pub fn white() -> Self {
        Self {
            kind: TransitionType::FadeWhite,
            color: WHITE,
        }
    }

    pub fn color(&self) -> [u8; 3] {
        self.color
    }
}

impl TransitionEffect for DipTransition {
    fn kind(&self) -> TransitionType {
        self.kind
    }

    fn description(&self) -> &str {
        match self.kind {
            TransitionType::FadeWhite => "Fade out to white, then fade in the next clip",
            _ => "Fade out to black, then fade in the next clip",
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
        if progress < 0.5 {
            surface.draw(outgoing, 0, 1.0)?;
            surface.fill(self.color, progress * 2.0);
            Ok(())
        } else {
            surface.fill(self.color, 1.0);
            surface.draw(incoming, 0, (progress - 0.5) * 2.0)
        }
    }
}
