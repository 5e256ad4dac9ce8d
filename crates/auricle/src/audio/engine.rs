//! Audio engine
//!
//! Runs playback on a dedicated thread, accepting commands and emitting
//! events over crossbeam channels. Every registered track gets its own
//! sink on the shared output mixer, which is what makes sync-group
//! playback and instant solo switching possible. Clips are decoded to PCM
//! at load time, so starting a track is a slice plus an append.

use std::collections::HashMap;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStreamBuilder, Sink};

use crate::config::tuning::{
    COMMAND_CHANNEL_CAPACITY, ENGINE_POLL_MS, EVENT_CHANNEL_CAPACITY, POSITION_TICK_MS,
};
use crate::error::{Result, SessionError};

use super::decoder::{self, DecodedClip};
use super::types::{AudioCommand, AudioEvent, TrackId};

/// Playback state for one registered track
struct TrackSlot {
    sink: Sink,
    clip: DecodedClip,
    /// Offset of the currently appended slice within the clip
    base_offset: Duration,
    /// True from a start until the slice ends or the track is paused
    running: bool,
}

/// Audio engine handle; playback runs on a dedicated thread
pub struct AudioEngine {
    cmd_tx: Sender<AudioCommand>,
    event_rx: Receiver<AudioEvent>,
    thread: Option<JoinHandle<()>>,
}

impl AudioEngine {
    /// Create a new audio engine, spawning the engine thread.
    ///
    /// Blocks until the audio output stream is initialized (or fails).
    pub fn new() -> Result<Self> {
        let (cmd_tx, cmd_rx) = bounded::<AudioCommand>(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = bounded::<AudioEvent>(EVENT_CHANNEL_CAPACITY);
        let (init_tx, init_rx) = bounded::<std::result::Result<(), String>>(1);

        let thread = thread::Builder::new()
            .name("audio-engine".to_string())
            .spawn(move || {
                run(cmd_rx, event_tx, init_tx);
            })
            .map_err(|e| SessionError::AudioDevice(format!("Failed to spawn audio thread: {e}")))?;

        // Wait for initialization
        let init_result = init_rx.recv().map_err(|_| {
            SessionError::AudioDevice("Audio thread terminated during init".to_string())
        })?;
        init_result.map_err(SessionError::AudioDevice)?;

        Ok(Self {
            cmd_tx,
            event_rx,
            thread: Some(thread),
        })
    }

    /// Send a command to the engine
    pub fn send(&self, cmd: AudioCommand) {
        let _ = self.cmd_tx.send(cmd);
    }

    /// Clone of the command sender, for wiring into an `AudioTrackSet`
    pub fn command_sender(&self) -> Sender<AudioCommand> {
        self.cmd_tx.clone()
    }

    /// Non-blocking poll for the next event
    pub fn try_recv_event(&self) -> Option<AudioEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Event receiver, for wiring into a session pump
    pub fn event_receiver(&self) -> &Receiver<AudioEvent> {
        &self.event_rx
    }

    /// Graceful shutdown (consumes self)
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        let _ = self.cmd_tx.send(AudioCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

/// The engine's main loop, running on the dedicated thread
fn run(
    cmd_rx: Receiver<AudioCommand>,
    event_tx: Sender<AudioEvent>,
    init_tx: Sender<std::result::Result<(), String>>,
) {
    // Create audio output on this thread (cpal streams may be !Send)
    let mut stream = match OutputStreamBuilder::open_default_stream() {
        Ok(s) => s,
        Err(e) => {
            let _ = init_tx.send(Err(format!("Failed to open audio output: {e}")));
            return;
        }
    };
    stream.log_on_drop(false);

    let _ = init_tx.send(Ok(()));

    // `slots` is declared after `stream` so sinks drop before the stream
    let mut slots: HashMap<TrackId, TrackSlot> = HashMap::new();
    let mut last_tick = Instant::now();

    loop {
        match cmd_rx.recv_timeout(Duration::from_millis(ENGINE_POLL_MS)) {
            Ok(AudioCommand::Load { id, path }) => match decoder::decode_file(&path) {
                Ok(clip) => {
                    let info = clip.info();
                    let sink = Sink::connect_new(stream.mixer());
                    sink.pause();
                    tracing::debug!(track = %id, %info, "loaded clip");
                    slots.insert(
                        id.clone(),
                        TrackSlot {
                            sink,
                            clip,
                            base_offset: Duration::ZERO,
                            running: false,
                        },
                    );
                    let _ = event_tx.send(AudioEvent::Loaded { id, info });
                }
                Err(e) => {
                    tracing::warn!(track = %id, error = %e, "load failed");
                    let _ = event_tx.send(AudioEvent::LoadFailed {
                        id,
                        message: e.to_string(),
                    });
                }
            },
            Ok(AudioCommand::Start { id, offset }) => {
                start_slot(&mut slots, &event_tx, id, offset, None);
            }
            Ok(AudioCommand::StartRange { id, start, end }) => {
                start_slot(&mut slots, &event_tx, id, start, Some(end));
            }
            Ok(AudioCommand::Pause { id }) => {
                if let Some(slot) = slots.get_mut(&id) {
                    slot.sink.pause();
                    slot.running = false;
                }
            }
            Ok(AudioCommand::SetVolume { id, volume }) => {
                if let Some(slot) = slots.get(&id) {
                    slot.sink.set_volume(volume.max(0.0));
                }
            }
            Ok(AudioCommand::Shutdown) => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        // Position and ended reporting for running tracks
        if last_tick.elapsed() >= Duration::from_millis(POSITION_TICK_MS) {
            last_tick = Instant::now();
            for (id, slot) in slots.iter_mut() {
                if !slot.running {
                    continue;
                }
                if slot.sink.empty() {
                    slot.running = false;
                    let _ = event_tx.send(AudioEvent::Ended { id: id.clone() });
                } else if !slot.sink.is_paused() {
                    let _ = event_tx.send(AudioEvent::Position {
                        id: id.clone(),
                        elapsed: slot.base_offset + slot.sink.get_pos(),
                        duration: slot.clip.duration(),
                    });
                }
            }
        }
    }
}

fn start_slot(
    slots: &mut HashMap<TrackId, TrackSlot>,
    event_tx: &Sender<AudioEvent>,
    id: TrackId,
    offset: Duration,
    end: Option<Duration>,
) {
    let Some(slot) = slots.get_mut(&id) else {
        // Start for a track that never loaded; the session cannot trust
        // its transport state any more.
        let _ = event_tx.send(AudioEvent::Failed {
            message: format!("start for unregistered track {id}"),
        });
        return;
    };

    slot.sink.stop();

    let samples = slot.clip.slice(offset, end);
    if samples.is_empty() {
        // Zero-length range; report it over immediately
        slot.running = false;
        let _ = event_tx.send(AudioEvent::Ended { id });
        return;
    }

    slot.base_offset = if offset >= slot.clip.duration() {
        Duration::ZERO
    } else {
        offset
    };
    slot.sink.append(SamplesBuffer::new(
        slot.clip.channels(),
        slot.clip.sample_rate(),
        samples,
    ));
    slot.sink.play();
    slot.running = true;
}
