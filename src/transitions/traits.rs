use crate::{
    error::Result,
    video::{Frame, Surface, TransitionType},
};

/// Core trait that every transition blend must implement
pub trait TransitionEffect: Send + Sync {
    /// The transition type this effect renders
    fn kind(&self) -> TransitionType;

    /// Returns the unique name of this transition
    fn name(&self) -> &str {
        self.kind().name()
    }

    /// Returns a human-readable description of this transition
    fn description(&self) -> &str;

    /// Composite one transition frame onto the surface
    ///
    /// # Arguments
    ///
    /// * `surface` - The shared drawing surface; its previous content is fully overwritten
    /// * `outgoing` - Frame from the clip being left, already sized to the surface
    /// * `incoming` - Frame from the clip being entered, already sized to the surface
    /// * `progress` - Fraction of the transition elapsed; 0 shows only `outgoing`,
    ///   1 shows only `incoming`
    fn render(
        &self,
        surface: &mut Surface,
        outgoing: &Frame,
        incoming: &Frame,
        progress: f32,
    ) -> Result<()>;
}

/// Clamp a progress value into `[0, 1]`, mapping NaN to 0
pub(crate) fn clamp_progress(progress: f32) -> f32 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 1.0)
    }
}
