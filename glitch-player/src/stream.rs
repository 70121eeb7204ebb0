use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::{Frame, FRAME_SIZE, SAMPLE_RATE};

/// Samples waiting to be played, shared with the audio callback
struct StreamData {
    queue: VecDeque<u8>,
    channels: usize,
}

impl StreamData {
    /// Fills a device buffer from the queue, going silent on underrun
    fn next(&mut self, data: &mut [f32]) {
        for out in data.chunks_mut(self.channels) {
            let v = match self.queue.pop_front() {
                Some(s) => (f32::from(s) - 128.0) / 512.0,
                None => 0.0,
            };
            out.fill(v);
        }
    }
}

/// Audio output stream playing 8-bit mono frames at [`SAMPLE_RATE`]
///
/// The device stream owns its own thread; frames are handed over by
/// value through a mutex-guarded queue and never touched again. The
/// queue is also the backpressure boundary: [`Output::ready`] gates the
/// renderer so at most one frame sits queued behind the one playing.
pub struct Output {
    _stream: cpal::Stream,
    data: Arc<Mutex<StreamData>>,
}

impl Output {
    /// Opens the default output device at the melody sample rate
    pub fn new() -> Self {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .expect("no output device available");
        let mut supported_configs_range = device
            .supported_output_configs()
            .expect("error while querying configs");

        let supported_config = supported_configs_range
            .find_map(|c| c.try_with_sample_rate(SAMPLE_RATE))
            .expect("no supported config?");
        let config = supported_config.config();

        let data = Arc::new(Mutex::new(StreamData {
            queue: VecDeque::with_capacity(2 * FRAME_SIZE),
            channels: usize::from(config.channels),
        }));
        let d = data.clone();
        let stream = device
            .build_output_stream(
                &config,
                move |out: &mut [f32], _opt: &cpal::OutputCallbackInfo| {
                    d.lock().unwrap().next(out);
                },
                move |err| {
                    panic!("{err}");
                },
                None,
            )
            .expect("could not build stream");
        stream.play().unwrap();

        Output {
            _stream: stream,
            data,
        }
    }

    /// True when the queued frame has drained and another may be pushed
    pub fn ready(&self) -> bool {
        self.data.lock().unwrap().queue.len() < FRAME_SIZE
    }

    /// Queues a frame for playback
    pub fn push(&self, frame: &Frame) {
        self.data.lock().unwrap().queue.extend(frame.samples);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn callback_drains_and_centers_samples() {
        let mut data = StreamData {
            queue: VecDeque::from([0, 128, 255]),
            channels: 2,
        };
        let mut out = [1.0f32; 8];
        data.next(&mut out);
        assert!(data.queue.is_empty());
        // Mono sample duplicated across both channels
        assert_eq!(out[0], out[1]);
        assert_eq!(out[2], 0.0);
        assert!(out[0] < 0.0 && out[4] > 0.0);
        // Underrun past the queue is silence
        assert_eq!(out[6], 0.0);
    }
}
