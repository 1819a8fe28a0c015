use std::fmt;

use crate::video::{Clip, TransitionType};

/// One contiguous run of output frames
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Straight playback of one clip
    Main {
        clip: usize,
        /// Source time of the first frame, in seconds
        start: f64,
        frames: u64,
    },
    /// Blend from the end of `from` into the start of `to`
    Transition {
        from: usize,
        to: usize,
        kind: TransitionType,
        /// Applied duration after clamping, in seconds
        duration: f64,
        /// Source time in `from` where the transition begins
        outgoing_start: f64,
        frames: u64,
    },
}

impl Segment {
    pub fn frames(&self) -> u64 {
        match self {
            Segment::Main { frames, .. } | Segment::Transition { frames, .. } => *frames,
        }
    }

    pub fn is_transition(&self) -> bool {
        matches!(self, Segment::Transition { .. })
    }
}

/// A transition that had to be shortened to fit its clips
#[derive(Debug, Clone, PartialEq)]
pub struct PlanWarning {
    pub from: usize,
    pub to: usize,
    pub requested: f64,
    pub applied: f64,
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transition between clips {} and {} shortened from {:.2}s to {:.2}s",
            self.from + 1,
            self.to + 1,
            self.requested,
            self.applied
        )
    }
}

/// Frame-exact layout of the whole reel
#[derive(Debug, Clone, PartialEq)]
pub struct TimelinePlan {
    pub fps: f64,
    pub segments: Vec<Segment>,
    pub total_frames: u64,
    pub warnings: Vec<PlanWarning>,
}

impl TimelinePlan {
    /// Lay out clips (already in playback order) with their source durations
    ///
    /// Each clip contributes a main segment, followed by a transition segment
    /// when it has a successor and an active transition. The last clip's
    /// transition is never consulted. Interior clips resume after the part
    /// already shown during their incoming transition, while the last clip
    /// plays in full. The last clip therefore starts over from 0 once its
    /// incoming transition ends, so the viewer sees its opening seconds
    /// (the transition length) a second time.
    pub fn build(clips: &[Clip], durations: &[f64], fps: f64) -> Self {
        let count = clips.len().min(durations.len());
        let durations: Vec<f64> = durations[..count]
            .iter()
            .map(|d| if d.is_finite() { d.max(0.0) } else { 0.0 })
            .collect();

        let mut warnings = Vec::new();

        // Applied transition length at each junction i -> i+1
        let junctions: Vec<f64> = (0..count.saturating_sub(1))
            .map(|i| {
                let transition = &clips[i].transition;
                if !transition.is_active() {
                    return 0.0;
                }
                let applied = transition.duration.min(durations[i]).min(durations[i + 1]);
                if applied < transition.duration {
                    warnings.push(PlanWarning {
                        from: i,
                        to: i + 1,
                        requested: transition.duration,
                        applied,
                    });
                }
                applied
            })
            .collect();

        let mut segments = Vec::with_capacity(count * 2);
        for i in 0..count {
            let t_out = junctions.get(i).copied().unwrap_or(0.0);
            let t_in = if i > 0 { junctions[i - 1] } else { 0.0 };
            let skip_in = if t_in > 0.0 && t_out > 0.0 { t_in } else { 0.0 };

            segments.push(Segment::Main {
                clip: i,
                start: skip_in,
                frames: frames_for(durations[i] - skip_in - t_out, fps),
            });

            if t_out > 0.0 {
                segments.push(Segment::Transition {
                    from: i,
                    to: i + 1,
                    kind: clips[i].transition.kind,
                    duration: t_out,
                    outgoing_start: (durations[i] - t_out).max(0.0),
                    frames: frames_for(t_out, fps),
                });
            }
        }

        let total_frames = segments.iter().map(Segment::frames).fold(0, u64::saturating_add);

        Self {
            fps,
            segments,
            total_frames,
            warnings,
        }
    }

    pub fn main_segments(&self) -> usize {
        self.segments.iter().filter(|s| !s.is_transition()).count()
    }

    pub fn transition_segments(&self) -> usize {
        self.segments.iter().filter(|s| s.is_transition()).count()
    }

    /// Output duration in seconds
    pub fn duration(&self) -> f64 {
        if self.fps > 0.0 {
            self.total_frames as f64 / self.fps
        } else {
            0.0
        }
    }

    /// Index of the last segment that reads from each clip
    pub fn last_use(&self, clip_count: usize) -> Vec<Option<usize>> {
        let mut last = vec![None; clip_count];
        for (index, segment) in self.segments.iter().enumerate() {
            match *segment {
                Segment::Main { clip, .. } => {
                    if let Some(slot) = last.get_mut(clip) {
                        *slot = Some(index);
                    }
                }
                Segment::Transition { from, to, .. } => {
                    for clip in [from, to] {
                        if let Some(slot) = last.get_mut(clip) {
                            *slot = Some(index);
                        }
                    }
                }
            }
        }
        last
    }
}

/// Number of frames needed to cover `duration` seconds, never negative
pub fn frames_for(duration: f64, fps: f64) -> u64 {
    let raw = duration * fps;
    if !raw.is_finite() || raw <= 0.0 {
        return 0;
    }
    // (4 - 1 - 1) * 30 must be exactly 60, not 61
    ((raw * 1e9).round() / 1e9).ceil() as u64
}

/// Stable sort by `order`; ties keep the caller's sequence
pub fn sort_clips(clips: &[Clip]) -> Vec<Clip> {
    let mut sorted = clips.to_vec();
    sorted.sort_by_key(|clip| clip.order);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clips_with_fades(count: usize, duration: f64) -> Vec<Clip> {
        (0..count)
            .map(|i| Clip::new(format!("clip{}.mp4", i), format!("Clip {}", i), i as u32)
                .with_transition(TransitionType::Fade, duration))
            .collect()
    }

    #[test]
    fn test_three_clip_reel_is_420_frames() {
        let clips = clips_with_fades(3, 1.0);
        let plan = TimelinePlan::build(&clips, &[5.0, 4.0, 6.0], 30.0);

        let frames: Vec<u64> = plan.segments.iter().map(Segment::frames).collect();
        assert_eq!(frames, vec![120, 30, 60, 30, 180]);
        assert_eq!(plan.total_frames, 420);
        assert!(plan.warnings.is_empty());
        assert_eq!(plan.duration(), 14.0);
    }

    #[test]
    fn test_no_transitions_means_main_segments_only() {
        let clips: Vec<Clip> = (0..4).map(|i| Clip::new("a.mp4", "a", i)).collect();
        let plan = TimelinePlan::build(&clips, &[1.0, 2.0, 3.0, 4.0], 30.0);

        assert_eq!(plan.main_segments(), 4);
        assert_eq!(plan.transition_segments(), 0);
        assert_eq!(plan.total_frames, 300);
    }

    #[test]
    fn test_last_clip_transition_is_ignored() {
        let mut clips = clips_with_fades(3, 0.5);
        clips[2].transition.kind = TransitionType::WipeRight;
        clips[2].transition.duration = 3.0;

        let plan = TimelinePlan::build(&clips, &[2.0, 2.0, 2.0], 30.0);
        assert_eq!(plan.transition_segments(), 2);
        assert!(matches!(
            plan.segments.last(),
            Some(Segment::Main { clip: 2, start, frames: 60 }) if *start == 0.0
        ));
    }

    #[test]
    fn test_first_clip_frames_follow_outgoing_transition() {
        let clips = clips_with_fades(2, 0.4);
        let plan = TimelinePlan::build(&clips, &[2.5, 3.0], 24.0);

        // ceil((2.5 - 0.4) * 24) = ceil(50.4)
        assert_eq!(plan.segments[0].frames(), 51);
        assert!(matches!(
            plan.segments[1],
            Segment::Transition { from: 0, to: 1, outgoing_start, frames: 10, .. }
                if (outgoing_start - 2.1).abs() < 1e-9
        ));
    }

    #[test]
    fn test_long_transition_is_clamped_with_warning() {
        let clips = clips_with_fades(2, 2.0);
        let plan = TimelinePlan::build(&clips, &[0.5, 1.0], 30.0);

        assert_eq!(plan.warnings.len(), 1);
        assert_eq!(plan.warnings[0].applied, 0.5);
        assert!(plan.warnings[0].to_string().contains("shortened"));

        let frames: Vec<u64> = plan.segments.iter().map(Segment::frames).collect();
        assert_eq!(frames, vec![0, 15, 30]);
    }

    #[test]
    fn test_zero_duration_transition_is_a_hard_cut() {
        let clips = clips_with_fades(2, 0.0);
        let plan = TimelinePlan::build(&clips, &[1.0, 1.0], 30.0);
        assert_eq!(plan.transition_segments(), 0);
        assert_eq!(plan.total_frames, 60);
    }

    #[test]
    fn test_frames_for_is_never_negative() {
        assert_eq!(frames_for(-1.0, 30.0), 0);
        assert_eq!(frames_for(f64::NAN, 30.0), 0);
        assert_eq!(frames_for(2.0, 30.0), 60);
        assert_eq!(frames_for(0.1, 30.0), 3);
        assert_eq!(frames_for((4.0 - 1.0 - 1.0), 30.0), 60);
    }

    #[test]
    fn test_huge_durations_saturate() {
        let clips: Vec<Clip> = (0..3).map(|i| Clip::new("a.mp4", "a", i)).collect();
        let plan = TimelinePlan::build(&clips, &[1e300, 1e300, 1e300], 30.0);
        assert_eq!(plan.total_frames, u64::MAX);
    }

    #[test]
    fn test_last_use_tracks_transitions() {
        let clips = clips_with_fades(3, 1.0);
        let plan = TimelinePlan::build(&clips, &[5.0, 4.0, 6.0], 30.0);
        assert_eq!(plan.last_use(3), vec![Some(1), Some(3), Some(4)]);
    }

    #[test]
    fn test_sort_is_stable() {
        let clips = vec![
            Clip::new("c.mp4", "c", 2),
            Clip::new("a.mp4", "a", 0),
            Clip::new("b1.mp4", "b1", 1),
            Clip::new("b2.mp4", "b2", 1),
        ];
        let names: Vec<String> = sort_clips(&clips).into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["a", "b1", "b2", "c"]);
    }
}
