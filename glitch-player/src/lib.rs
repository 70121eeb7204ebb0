//! Melody playback: frame rendering and the audio output stream
//!
//! The [`Renderer`] walks a monotonic sample counter through a melody's
//! VM and packs the results into fixed-size frames; [`Output`] feeds
//! those frames to the default audio device. Pacing is pull-based: a new
//! frame is rendered only when the output reports it has room, so the
//! device's playback clock is the only clock in the system.
#![warn(missing_docs)]

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use glitch::{Melody, MelodyError, Vm};
use log::warn;

mod stream;
pub use stream::Output;

/// Output sample rate in Hz
pub const SAMPLE_RATE: u32 = 8000;

/// Samples per frame, the unit handed to the audio sink
pub const FRAME_SIZE: usize = 256;

/// Wall-clock playback time of one frame (32 ms)
pub const FRAME_DURATION: Duration =
    Duration::from_millis(FRAME_SIZE as u64 * 1000 / SAMPLE_RATE as u64);

/// One frame of unsigned 8-bit mono samples
#[derive(Copy, Clone, Debug)]
pub struct Frame {
    /// Sample bytes, in sample-index order
    pub samples: [u8; FRAME_SIZE],

    /// Set when rendering took longer than the frame plays for
    ///
    /// A visual collaborator may skip drawing such a frame; the audio in
    /// it is complete and must still be played.
    pub dropped: bool,
}

/// Drives a melody's VM across sample indices to produce [`Frame`]s
pub struct Renderer {
    melody: Melody,
    vm: Vm,

    /// Next sample index to compute; wraps at 2^32
    t: u32,

    /// Whether the previous frame overran its time budget
    overrun: bool,
}

impl Renderer {
    /// Builds a renderer starting at sample index 0 with a zeroed VM
    pub fn new(melody: Melody) -> Self {
        Self {
            melody,
            vm: Vm::new(),
            t: 0,
            overrun: false,
        }
    }

    /// The melody being played
    pub fn melody(&self) -> &Melody {
        &self.melody
    }

    /// The next sample index to be computed
    pub fn t(&self) -> u32 {
        self.t
    }

    /// Renders the next frame, advancing the sample counter
    ///
    /// Samples are computed strictly in index order with no gaps; VM
    /// state carries over from one frame to the next. The frame comes
    /// back flagged `dropped` if computing it took longer than the
    /// [`FRAME_DURATION`] it represents.
    pub fn next_frame(&mut self) -> Frame {
        let start = Instant::now();
        let mut samples = [0; FRAME_SIZE];
        for sample in samples.iter_mut() {
            *sample = self.vm.compute(self.melody.tokens(), self.t);
            self.t = self.t.wrapping_add(1);
        }
        let dropped = start.elapsed() > FRAME_DURATION;
        if dropped && !self.overrun {
            warn!("dropped frame; your system may be too slow");
        }
        self.overrun = dropped;
        Frame { samples, dropped }
    }

    /// Restarts playback: the sample counter returns to 0 and the VM is
    /// zeroed
    pub fn rewind(&mut self) {
        self.t = 0;
        self.vm.reset();
    }

    /// Edits one character of the melody grid
    ///
    /// Tokens rebuild and the VM resets, but the sample counter keeps
    /// running so the voice stays in phase with its own past.
    pub fn edit_char(&mut self, row: usize, col: usize, c: char) -> Result<(), MelodyError> {
        self.melody.edit_char(row, col, c)?;
        self.vm.reset();
        Ok(())
    }

    /// Replaces the melody's mute set; tokens rebuild and the VM resets
    /// while the sample counter keeps running
    pub fn set_muted(&mut self, muted: BTreeSet<usize>) {
        self.melody.set_muted(muted);
        self.vm.reset();
    }

    /// Read-only copy of the VM stack for visualizers, top first
    pub fn stack_snapshot(&self) -> [u32; 256] {
        self.vm.stack().snapshot()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn renderer(text: &str) -> Renderer {
        let mut melody = Melody::new(text).unwrap();
        melody.expand();
        Renderer::new(melody)
    }

    #[test]
    fn frames_are_consecutive_samples() {
        // `a` pushes t, so every sample is its own index's low byte
        let mut r = renderer("!a");
        let first = r.next_frame();
        let second = r.next_frame();
        for (i, &s) in first.samples.iter().enumerate() {
            assert_eq!(usize::from(s), i);
        }
        for (i, &s) in second.samples.iter().enumerate() {
            assert_eq!(usize::from(s), (FRAME_SIZE + i) & 0xFF);
        }
        assert_eq!(r.t(), 2 * FRAME_SIZE as u32);
    }

    #[test]
    fn edit_resets_vm_but_not_t() {
        // `a8k` emits t >> 8, which distinguishes a reset counter from a
        // running one
        let mut r = renderer("!a8k");
        r.next_frame();
        assert_eq!(r.t(), FRAME_SIZE as u32);
        r.edit_char(1, 0, '.').unwrap();
        assert_eq!(r.stack_snapshot(), [0; 256]);
        assert_eq!(r.t(), FRAME_SIZE as u32);
        let frame = r.next_frame();
        assert_eq!(frame.samples[0], (FRAME_SIZE >> 8) as u8);
    }

    #[test]
    fn set_muted_resets_vm_but_not_t() {
        let mut r = renderer("!a");
        r.next_frame();
        r.set_muted(BTreeSet::from([0]));
        assert_eq!(r.t(), FRAME_SIZE as u32);
        assert_eq!(r.stack_snapshot(), [0; 256]);
        assert!(r.melody().tokens().is_empty());
    }

    #[test]
    fn rewind_resets_both() {
        let mut r = renderer("!a");
        r.next_frame();
        r.rewind();
        assert_eq!(r.t(), 0);
        assert_eq!(r.stack_snapshot(), [0; 256]);
        let frame = r.next_frame();
        assert_eq!(frame.samples[0], 0);
        assert_eq!(frame.samples[255], 255);
    }

    #[test]
    fn frame_duration_matches_rate() {
        assert_eq!(FRAME_DURATION, Duration::from_millis(32));
    }
}
