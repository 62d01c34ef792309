//! Playback speed and direction.
//!
//! GIFs change speed by dropping frames (speed above 1) or stretching delays
//! (speed below 1). Videos change speed by scaling presentation timestamps in
//! the encoder, then stretching the result once more so the encoded duration
//! matches the requested one.

use std::time::Duration;

/// Frame stride applied when decomposing an animated GIF.
///
/// Returns `ceil(total / (total / speed))` for speeds above 1, otherwise 1.
///
/// ```
/// assert_eq!(batchscale::timing::subsample_stride(20, 2.0), 2);
/// assert_eq!(batchscale::timing::subsample_stride(20, 0.5), 1);
/// ```
pub fn subsample_stride(total_frames: usize, speed: f64) -> usize {
    if speed <= 1.0 || total_frames == 0 {
        return 1;
    }
    let total = total_frames as f64;
    ((total / (total / speed)).ceil() as usize).max(1)
}

/// Frame order and delays of an animated GIF, kept index-aligned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimationTiming<T> {
    frames: Vec<T>,
    delays: Vec<u16>,
}

impl<T> AnimationTiming<T> {
    /// Pair frames with their delays.
    ///
    /// Returns `None` when the two sequences differ in length.
    pub fn new(frames: Vec<T>, delays: Vec<u16>) -> Option<Self> {
        (frames.len() == delays.len()).then_some(Self { frames, delays })
    }

    /// Stretch every delay by `1 / speed` when slowing down.
    ///
    /// Speeds of 1 or more leave delays untouched; speeding up is done by
    /// [`subsample_stride`] instead.
    pub fn slow_down(&mut self, speed: f64) {
        if speed >= 1.0 || speed <= 0.0 {
            return;
        }
        for delay in &mut self.delays {
            let stretched = (f64::from(*delay) / speed).round();
            *delay = stretched.min(f64::from(u16::MAX)) as u16;
        }
    }

    /// Reverse frames and delays together.
    pub fn reverse(&mut self) {
        self.frames.reverse();
        self.delays.reverse();
    }

    pub fn frames(&self) -> &[T] {
        &self.frames
    }

    pub fn delays(&self) -> &[u16] {
        &self.delays
    }

    pub fn into_parts(self) -> (Vec<T>, Vec<u16>) {
        (self.frames, self.delays)
    }
}

/// Smallest and largest tempo a single ffmpeg `atempo` stage accepts.
const ATEMPO_MIN: f64 = 0.5;
const ATEMPO_MAX: f64 = 2.0;

/// Speed and direction applied to a video at encode time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoTiming {
    pub speed: f64,
    pub reverse: bool,
}

impl VideoTiming {
    pub fn new(speed: f64, reverse: bool) -> Self {
        Self { speed, reverse }
    }

    /// Presentation-timestamp multiplier, `1 / speed`.
    pub fn pts_scale(&self) -> f64 {
        1.0 / self.speed
    }

    /// Whether the two-pass duration correction must run.
    pub fn needs_correction(&self) -> bool {
        self.speed != 1.0 || self.reverse
    }

    /// Video filter for the first encode pass, if any.
    pub fn video_filter(&self) -> Option<String> {
        let mut filters = Vec::new();
        if self.speed != 1.0 {
            filters.push(setpts_filter(self.pts_scale()));
        }
        if self.reverse {
            filters.push("reverse".to_string());
        }
        (!filters.is_empty()).then(|| filters.join(","))
    }

    /// Audio filter matching [`video_filter`](VideoTiming::video_filter).
    pub fn audio_filter(&self) -> Option<String> {
        let mut filters: Vec<String> = atempo_chain(self.speed)
            .into_iter()
            .map(|tempo| format!("atempo={tempo}"))
            .collect();
        if self.reverse {
            filters.push("areverse".to_string());
        }
        (!filters.is_empty()).then(|| filters.join(","))
    }
}

/// `setpts` filter scaling presentation timestamps by `scale`.
pub fn setpts_filter(scale: f64) -> String {
    format!("setpts={scale}*PTS")
}

/// Multiplier that stretches `measured` to `original / speed`.
///
/// Returns 1 when `measured` is zero or `speed` is not positive.
pub fn correction_factor(original: Duration, speed: f64, measured: Duration) -> f64 {
    if measured.is_zero() || speed <= 0.0 {
        return 1.0;
    }
    original.as_secs_f64() / speed / measured.as_secs_f64()
}

/// Split a tempo into `atempo` stages that each stay within 0.5..=2.0.
///
/// A tempo of 1 yields no stages.
pub fn atempo_chain(speed: f64) -> Vec<f64> {
    let mut stages = Vec::new();
    if !speed.is_finite() || speed <= 0.0 || speed == 1.0 {
        return stages;
    }
    let mut remaining = speed;
    while remaining > ATEMPO_MAX {
        stages.push(ATEMPO_MAX);
        remaining /= ATEMPO_MAX;
    }
    while remaining < ATEMPO_MIN {
        stages.push(ATEMPO_MIN);
        remaining /= ATEMPO_MIN;
    }
    if (remaining - 1.0).abs() > f64::EPSILON {
        stages.push(remaining);
    }
    stages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_for_double_speed() {
        assert_eq!(subsample_stride(20, 2.0), 2);
        assert_eq!(subsample_stride(10, 3.0), 3);
        assert_eq!(subsample_stride(10, 1.5), 2);
        assert_eq!(subsample_stride(0, 4.0), 1);
    }

    #[test]
    fn slow_down_stretches_delays() {
        let mut timing = AnimationTiming::new(vec!['a', 'b'], vec![10, 7]).unwrap();
        timing.slow_down(0.5);
        assert_eq!(timing.delays(), &[20, 14]);
    }

    #[test]
    fn speed_up_leaves_delays() {
        let mut timing = AnimationTiming::new(vec![1, 2], vec![10, 10]).unwrap();
        timing.slow_down(2.0);
        assert_eq!(timing.delays(), &[10, 10]);
    }

    #[test]
    fn reverse_is_an_involution() {
        let original = AnimationTiming::new(vec![0, 1, 2, 3], vec![5, 6, 7, 8]).unwrap();
        let mut timing = original.clone();
        timing.reverse();
        assert_eq!(timing.frames(), &[3, 2, 1, 0]);
        assert_eq!(timing.delays(), &[8, 7, 6, 5]);
        timing.reverse();
        assert_eq!(timing, original);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        assert!(AnimationTiming::new(vec![1, 2, 3], vec![1]).is_none());
    }

    #[test]
    fn video_filters() {
        let timing = VideoTiming::new(2.0, true);
        assert_eq!(timing.video_filter().as_deref(), Some("setpts=0.5*PTS,reverse"));
        assert_eq!(timing.audio_filter().as_deref(), Some("atempo=2,areverse"));
        assert!(timing.needs_correction());

        let identity = VideoTiming::new(1.0, false);
        assert!(identity.video_filter().is_none());
        assert!(identity.audio_filter().is_none());
        assert!(!identity.needs_correction());
    }

    #[test]
    fn atempo_chain_stays_in_range() {
        assert_eq!(atempo_chain(4.0), vec![2.0, 2.0]);
        assert_eq!(atempo_chain(0.25), vec![0.5, 0.5]);
        assert_eq!(atempo_chain(1.0), Vec::<f64>::new());
        let product: f64 = atempo_chain(5.0).iter().product();
        assert!((product - 5.0).abs() < 1e-9);
    }

    #[test]
    fn correction_matches_target_duration() {
        let original = Duration::from_secs(10);
        let measured = Duration::from_secs_f64(4.8);
        let factor = correction_factor(original, 2.0, measured);
        assert!((measured.as_secs_f64() * factor - 5.0).abs() < 1e-9);
        assert_eq!(correction_factor(original, 2.0, Duration::ZERO), 1.0);
    }

    #[test]
    fn speed_round_trip_restores_duration() {
        let original = Duration::from_secs(12);
        let fast = VideoTiming::new(3.0, false);
        let slow = VideoTiming::new(1.0 / 3.0, false);
        let after = original.as_secs_f64() * fast.pts_scale() * slow.pts_scale();
        assert!((after - original.as_secs_f64()).abs() < 1e-9);
    }
}
