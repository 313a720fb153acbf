use super::*;
use crate::backend::CapturedAudio;
use crate::error::NotificationLevel;
use crate::fx_graph::FxNode;
use crate::recorder::STOP_GRACE_SECS;
use crate::testutil::{FakeBackend, FakeCapture, StartFailure};

const SR: u32 = 1000;

type TestController = LoopController<FakeBackend, FakeCapture>;

fn controller() -> TestController {
    LoopController::new(
        FakeBackend::new(SR),
        FakeCapture::new(),
        ControllerConfig::default(),
    )
}

/// Records a take of `secs` seconds on `track`, running the clock through the grace window.
fn record(c: &mut TestController, track: usize, secs: f64, value: f32) {
    c.capture_mut().script_take(secs, SR, value);
    assert!(c.start_recording(track).unwrap());
    c.backend_mut().advance(secs);
    c.stop_recording();
    c.backend_mut().advance(0.125);
    c.poll();
}

fn buffer_of(c: &TestController, track: usize) -> Option<SharedBuffer> {
    c.state().tracks.get(track).unwrap().buffer().cloned()
}

#[test]
fn first_take_defines_the_loop_in_whole_measures() {
    let mut c = controller();
    record(&mut c, 0, 3.0, 0.5);
    // 120 BPM 4/4: 3s rounds up to two 2s measures.
    assert_eq!(c.state().transport.loop_length(), Some(4.0));
    let buf = buffer_of(&c, 0).unwrap();
    assert_eq!(buf.len(), 4000);
    assert_eq!(buf.mono()[1000], 0.5);
    assert_eq!(buf.mono()[3500], 0.0);
    assert!(!c.state().recorder.is_busy());
    assert_eq!(c.capture().stops, 1);
}

#[test]
fn grace_window_audio_does_not_add_a_measure() {
    let mut c = controller();
    // The device keeps delivering input through the grace window after the stop.
    c.capture_mut().script_take(4.0 + STOP_GRACE_SECS, SR, 0.5);
    assert!(c.start_recording(0).unwrap());
    c.backend_mut().advance(4.0);
    c.stop_recording();
    c.backend_mut().advance(0.125);
    c.poll();

    assert_eq!(c.state().transport.loop_length(), Some(4.0));
    let buf = buffer_of(&c, 0).unwrap();
    assert_eq!(buf.len(), 4000);
    assert_eq!(buf.mono()[2000], 0.5);
}

#[test]
fn undo_and_redo_walk_through_record_and_clear() {
    let mut c = controller();
    record(&mut c, 0, 3.0, 0.5);
    let recorded = buffer_of(&c, 0).unwrap();

    c.clear_track(0).unwrap();
    assert!(buffer_of(&c, 0).is_none());
    assert_eq!(c.state().transport.loop_length(), None);

    assert!(c.undo(0).unwrap());
    let restored = buffer_of(&c, 0).unwrap();
    assert!(Arc::ptr_eq(&restored, &recorded));
    assert_eq!(c.state().transport.loop_length(), Some(4.0));

    assert!(c.undo(0).unwrap());
    assert!(buffer_of(&c, 0).is_none());
    assert_eq!(c.state().transport.loop_length(), None);
    assert!(!c.undo(0).unwrap());

    assert!(c.redo(0).unwrap());
    assert!(buffer_of(&c, 0).is_some());
    assert!(c.redo(0).unwrap());
    assert!(buffer_of(&c, 0).is_none());
    assert!(!c.redo(0).unwrap());
}

#[test]
fn stop_all_is_idempotent() {
    let mut c = controller();
    record(&mut c, 0, 2.0, 0.5);
    c.set_metronome_enabled(true);
    c.start_all();
    assert!(c.state().transport.is_playing());
    assert_eq!(c.backend().active.len(), 1);

    c.stop_all();
    let stopped = c.backend().stopped.len();
    c.stop_all();
    assert_eq!(c.backend().stopped.len(), stopped);
    assert!(c.backend().active.is_empty());
    assert!(!c.state().transport.is_playing());
    assert!(!c.state().metronome.is_running());
}

#[test]
fn start_all_without_a_loop_uses_the_default_measures() {
    let mut c = controller();
    c.start_all();
    assert_eq!(c.state().transport.loop_length(), Some(8.0));
    assert!(c.backend().active.is_empty());
}

#[test]
fn overdub_wraps_around_the_loop_end() {
    let mut c = controller();
    record(&mut c, 0, 3.0, 0.5);
    c.start_all();
    let loop_start = c.state().transport.loop_start();

    c.backend_mut().advance(3.5);
    record(&mut c, 1, 1.0, 0.25);

    let buf = buffer_of(&c, 1).unwrap();
    let data = buf.mono();
    assert_eq!(data.len(), 4000);
    assert_eq!(data[3600], 0.25);
    assert_eq!(data[200], 0.25);
    assert_eq!(data[1000], 0.0);
    assert_eq!(data[3000], 0.0);

    // The new source joins at the current phase.
    let now = c.backend().now;
    let source = c.backend().active_source_for(1).unwrap();
    assert!((source.offset - (now - loop_start).rem_euclid(4.0)).abs() < 1e-9);
    assert_eq!(c.state().transport.loop_start(), loop_start);
}

#[test]
fn input_latency_moves_the_overdub_earlier() {
    let mut c = LoopController::new(
        FakeBackend::new(SR),
        FakeCapture::new(),
        ControllerConfig {
            input_latency_secs: 0.25,
            ..ControllerConfig::default()
        },
    );
    record(&mut c, 0, 3.0, 0.5);
    c.start_all();
    c.backend_mut().advance(1.0);
    record(&mut c, 1, 0.5, 0.25);
    let buf = buffer_of(&c, 1).unwrap();
    assert_eq!(buf.mono()[800], 0.25);
    assert_eq!(buf.mono()[1300], 0.0);
}

#[test]
fn recorder_is_busy_until_the_take_is_finished() {
    let mut c = controller();
    c.capture_mut().script_take(1.0, SR, 0.5);
    assert!(c.start_recording(0).unwrap());
    assert!(!c.start_recording(1).unwrap());
    assert_eq!(c.capture().starts, 1);

    c.stop_recording();
    c.stop_recording();
    assert!(c.state().recorder.is_stopping());
    c.backend_mut().advance(0.05);
    c.poll();
    assert!(c.state().recorder.is_busy());
    assert!(!c.start_recording(1).unwrap());

    c.backend_mut().advance(0.05);
    c.poll();
    assert!(!c.state().recorder.is_busy());
    assert!(buffer_of(&c, 0).is_some());
}

#[test]
fn permission_failure_changes_nothing() {
    let mut c = controller();
    c.capture_mut().fail_start = Some(StartFailure::Permission);
    let result = c.start_recording(0);
    assert!(matches!(result, Err(LooperError::PermissionDenied(_))));
    assert!(!c.state().recorder.is_busy());
    assert!(buffer_of(&c, 0).is_none());

    let notes = c.take_notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, NotificationLevel::Error);
    assert_eq!(
        notes[0].message,
        "Mic blocked. Allow microphone access and retry."
    );
    assert!(c.take_notifications().is_empty());
}

#[test]
fn recorder_start_failure_is_reported() {
    let mut c = controller();
    c.capture_mut().fail_start = Some(StartFailure::Recorder);
    assert!(c.start_recording(0).is_err());
    assert_eq!(c.take_notifications()[0].message, "Recorder failed.");
}

#[test]
fn decode_failure_leaves_the_track_alone() {
    let mut c = controller();
    record(&mut c, 0, 2.0, 0.5);
    let before = buffer_of(&c, 0).unwrap();
    let history_len = c.state().tracks.get(0).unwrap().history.len();
    c.take_notifications();

    c.capture_mut().next_capture = Some(CapturedAudio::Encoded(vec![1, 2, 3, 4]));
    c.start_recording(0).unwrap();
    c.stop_recording();
    c.backend_mut().advance(0.1);
    c.poll();

    assert!(Arc::ptr_eq(&buffer_of(&c, 0).unwrap(), &before));
    assert_eq!(c.state().tracks.get(0).unwrap().history.len(), history_len);
    let notes = c.take_notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].message, "Decode failed.");
    assert!(!c.state().recorder.is_busy());
}

#[test]
fn take_is_discarded_when_the_track_changes_mid_recording() {
    let mut c = controller();
    record(&mut c, 0, 2.0, 0.5);
    c.take_notifications();

    c.capture_mut().script_take(1.0, SR, 0.25);
    c.start_recording(0).unwrap();
    c.clear_track(0).unwrap();
    c.stop_recording();
    c.backend_mut().advance(0.1);
    c.poll();

    assert!(buffer_of(&c, 0).is_none());
    let notes = c.take_notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].level, NotificationLevel::Warning);
}

#[test]
fn clearing_the_last_track_forgets_the_loop() {
    let mut c = controller();
    record(&mut c, 0, 2.0, 0.5);
    record(&mut c, 1, 1.0, 0.5);
    assert_eq!(buffer_of(&c, 1).unwrap().len(), 2000);

    c.clear_track(0).unwrap();
    assert_eq!(c.state().transport.loop_length(), Some(2.0));
    c.clear_track(1).unwrap();
    assert_eq!(c.state().transport.loop_length(), None);
}

#[test]
fn start_track_joins_in_phase() {
    let mut c = controller();
    record(&mut c, 0, 4.0, 0.5);
    record(&mut c, 1, 4.0, 0.25);
    c.start_all();
    let loop_start = c.state().transport.loop_start();
    c.stop_track(1).unwrap();
    assert!(c.state().transport.is_playing());

    c.backend_mut().advance(1.5);
    c.start_track(1).unwrap();
    let source = c.backend().active_source_for(1).unwrap();
    assert_eq!(source.offset, 1.5);
    assert_eq!(source.when, loop_start + 1.5);
    assert_eq!(c.state().transport.loop_start(), loop_start);
}

#[test]
fn stopping_the_last_track_stops_the_transport() {
    let mut c = controller();
    record(&mut c, 0, 2.0, 0.5);
    c.set_metronome_enabled(true);
    c.start_track(0).unwrap();
    assert!(c.state().transport.is_playing());
    assert!(c.state().metronome.is_running());
    c.stop_track(0).unwrap();
    assert!(!c.state().transport.is_playing());
    assert!(!c.state().metronome.is_running());
}

#[test]
fn tempo_change_resnaps_and_conforms_every_track() {
    let mut c = controller();
    record(&mut c, 0, 3.0, 0.5);
    c.set_bpm(90.0);
    // 4s at 90 BPM is 1.5 measures of 2.667s, which rounds to two.
    let len = c.state().transport.loop_length().unwrap();
    assert!((len - 16.0 / 3.0).abs() < 1e-9);
    let buf = buffer_of(&c, 0).unwrap();
    assert!((buf.duration() - len).abs() < 2e-3);

    assert!(c.undo(0).unwrap());
    let previous = buffer_of(&c, 0).unwrap();
    assert!((previous.duration() - len).abs() < 2e-3);
}

#[test]
fn stretch_mode_conforms_by_time_scaling() {
    let mut c = controller();
    c.set_fit_mode(FitMode::Stretch);
    record(&mut c, 0, 2.0, 0.5);
    c.set_loop_measures(2);
    let buf = buffer_of(&c, 0).unwrap();
    assert_eq!(buf.len(), 4000);
    assert!((buf.mono()[3000] - 0.5).abs() < 1e-6);
}

#[test]
fn applying_loop_measures_without_audio_only_sets_the_length() {
    let mut c = controller();
    c.set_loop_measures(3);
    assert_eq!(c.state().transport.loop_length(), Some(6.0));
    assert_eq!(c.state().transport.loop_measures(), 3);
    assert!(c.backend().started.is_empty());
}

#[test]
fn metronome_restarts_on_a_tempo_change() {
    let mut c = controller();
    c.set_metronome_enabled(true);
    c.backend_mut().now = 1.95;
    assert_eq!(c.metronome_tick(), 1);
    assert_eq!(c.backend().clicks[0].time, 2.0);
    assert!(c.backend().clicks[0].accent);

    // Stopped transport: the new grid is counted from the moment of the change.
    c.set_bpm(60.0);
    c.backend_mut().now = 5.9;
    assert_eq!(c.metronome_tick(), 1);
    let last = c.backend().clicks.last().copied().unwrap();
    assert!((last.time - 5.95).abs() < 1e-9);
    assert!(last.accent);
}

#[test]
fn metronome_follows_the_loop_start_while_playing() {
    let mut c = controller();
    record(&mut c, 0, 2.0, 0.5);
    c.backend_mut().advance(0.3);
    c.start_all();
    let loop_start = c.state().transport.loop_start();
    c.set_metronome_enabled(true);
    c.backend_mut().advance(1.95);
    c.metronome_tick();
    assert_eq!(c.backend().clicks[0].time, loop_start + 2.0);
}

#[test]
fn metronome_volume_is_clamped_and_ramped() {
    let mut c = controller();
    assert_eq!(c.backend().metronome_gain, 0.4);
    c.set_metronome_volume(3.0);
    assert_eq!(c.backend().metronome_gain, 1.0);
    assert_eq!(c.state().metronome_volume, 1.0);
}

#[test]
fn solo_and_mute_drive_the_track_gains() {
    let mut c = controller();
    assert_eq!(c.backend().track_gains[&0], 0.9);
    c.set_solo(2, true).unwrap();
    assert_eq!(c.backend().track_gains[&2], 0.9);
    assert_eq!(c.backend().track_gains[&0], 0.0);

    assert!(c.toggle_mute(2).unwrap());
    assert_eq!(c.backend().track_gains[&2], 0.0);
    c.set_solo(2, false).unwrap();
    c.set_volume(0, 0.5).unwrap();
    assert_eq!(c.backend().track_gains[&0], 0.5);
    assert_eq!(c.backend().track_gains[&2], 0.0);
}

#[test]
fn unknown_tracks_are_rejected_with_a_notification() {
    let mut c = controller();
    assert!(matches!(c.set_mute(8, true), Err(LooperError::InvalidTrack(8))));
    assert!(c.start_recording(99).is_err());
    assert!(!c.state().recorder.is_busy());
    assert_eq!(c.take_notifications().len(), 2);
}

#[test]
fn enabling_fx_rebuilds_the_topology_but_params_only_ramp() {
    let mut c = controller();
    let connects = c.backend().connects;
    assert!(c.backend().topologies[&0].is_bypassed());

    c.set_fx_enabled(0, FxModule::Delay, true).unwrap();
    assert_eq!(c.backend().connects, connects + 1);
    assert!(c.backend().topologies[&0].in_signal_path(FxNode::Delay));
    assert_eq!(c.state().fx_graph.rebuild_count(0), 2);

    c.set_fx_enabled(0, FxModule::Delay, true).unwrap();
    assert_eq!(c.backend().connects, connects + 1);

    let stored = c.set_fx_param(0, FxParam::DelayTime, 5.0).unwrap();
    assert_eq!(stored, 1.0);
    assert_eq!(
        c.backend().fx_ramps.last().copied(),
        Some((0, FxParam::DelayTime, 1.0, RAMP_TIME_CONSTANT))
    );
    assert_eq!(c.backend().connects, connects + 1);

    c.set_fx_enabled(0, FxModule::Delay, false).unwrap();
    assert!(c.backend().topologies[&0].is_bypassed());
    assert_eq!(c.fx(0).unwrap().delay.time, 1.0);
}

#[test]
fn position_reports_the_led_cell() {
    let mut c = controller();
    assert!(c.position().is_none());
    record(&mut c, 0, 4.0, 0.5);
    c.start_all();
    c.backend_mut().advance(5.0);
    let pos = c.position().unwrap();
    assert_eq!(pos.loop_length, 4.0);
    assert!((pos.fraction - 0.25).abs() < 1e-9);
    assert_eq!(pos.led, 8);
}

#[test]
fn track_status_reflects_the_slot() {
    let mut c = controller();
    assert_eq!(c.track_status(0).unwrap().state, TrackState::Empty);
    c.capture_mut().script_take(2.0, SR, 0.5);
    c.start_recording(0).unwrap();
    assert_eq!(c.track_status(0).unwrap().state, TrackState::Recording);
    c.backend_mut().advance(2.0);
    c.stop_recording();
    c.backend_mut().advance(0.1);
    c.poll();

    let status = c.track_status(0).unwrap();
    assert_eq!(status.state, TrackState::Ready);
    assert_eq!(status.duration, Some(2.0));
    assert!(status.can_undo);
    assert!(!status.can_redo);
    assert!(status.fx.is_empty());

    c.start_all();
    assert_eq!(c.track_status(0).unwrap().state, TrackState::Playing);
}

#[test]
fn sessions_survive_a_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let mut c = controller();
    c.set_tempo(100.0, 3, 4);
    record(&mut c, 0, 1.5, 0.5);
    c.set_solo(0, true).unwrap();
    c.set_fx_enabled(0, FxModule::Reverb, true).unwrap();
    c.set_swing(30.0);
    let saved = c.save_session(Some(dir.path())).unwrap();
    assert_eq!(saved, dir.path());

    let mut fresh = controller();
    record(&mut fresh, 3, 2.0, 0.1);
    fresh.load_session(dir.path()).unwrap();

    let transport = &fresh.state().transport;
    assert_eq!(transport.bpm(), 100.0);
    assert_eq!(transport.time_signature(), (3, 4));
    assert_eq!(transport.swing_percent(), 30.0);
    assert_eq!(transport.loop_length(), c.state().transport.loop_length());
    assert!(!transport.is_playing());

    let t0 = fresh.state().tracks.get(0).unwrap();
    assert!(t0.has_audio());
    assert!(t0.mix.is_soloed);
    assert!(t0.fx.reverb.on);
    assert!(t0.history.can_undo());
    assert!(!fresh.state().tracks.get(3).unwrap().has_audio());
    assert!(fresh.backend().topologies[&0].in_signal_path(FxNode::Reverb));
    assert_eq!(fresh.backend().track_gains[&3], 0.0);
    assert_eq!(fresh.backend().track_gains[&0], 0.9);
}

#[test]
fn failed_load_keeps_the_running_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut c = controller();
    record(&mut c, 0, 2.0, 0.5);
    c.start_all();
    assert!(c.load_session(dir.path()).is_err());
    assert!(c.state().transport.is_playing());
    assert!(buffer_of(&c, 0).is_some());
    assert_eq!(c.take_notifications().len(), 1);
}

#[test]
fn saving_needs_a_sessions_root() {
    let mut c = controller();
    assert!(matches!(
        c.save_session(None),
        Err(LooperError::Session(_))
    ));

    let root = tempfile::tempdir().unwrap();
    let mut c = LoopController::new(
        FakeBackend::new(SR),
        FakeCapture::new(),
        ControllerConfig {
            sessions_root: Some(root.path().to_path_buf()),
            ..ControllerConfig::default()
        },
    );
    let saved = c.save_session(None).unwrap();
    assert!(saved.starts_with(root.path()));
    assert_eq!(c.list_sessions(), vec![saved]);
}

#[test]
fn monitor_is_muted_for_the_take_and_restored_after() {
    let mut c = controller();
    c.set_monitoring(true).unwrap();
    assert!(c.capture().monitoring);
    assert_eq!(c.backend().monitor_gain, DEFAULT_MONITOR_LEVEL);

    c.capture_mut().script_take(1.0, SR, 0.5);
    c.start_recording(0).unwrap();
    assert_eq!(c.backend().monitor_gain, 0.0);
    c.backend_mut().advance(1.0);
    c.stop_recording();
    c.backend_mut().advance(0.125);
    c.poll();
    assert!(buffer_of(&c, 0).is_some());
    assert_eq!(c.backend().monitor_gain, DEFAULT_MONITOR_LEVEL);
}

#[test]
fn monitor_switched_off_mid_take_stays_off() {
    let mut c = controller();
    c.set_monitoring(true).unwrap();
    c.capture_mut().script_take(1.0, SR, 0.5);
    c.start_recording(0).unwrap();
    c.set_monitoring(false).unwrap();
    c.set_monitor_level(0.5);
    assert_eq!(c.backend().monitor_gain, 0.0);

    c.backend_mut().advance(1.0);
    c.stop_recording();
    c.backend_mut().advance(0.125);
    c.poll();
    assert_eq!(c.backend().monitor_gain, 0.0);

    c.set_monitoring(true).unwrap();
    assert_eq!(c.backend().monitor_gain, 0.5);
}

#[test]
fn failed_take_still_restores_the_monitor() {
    let mut c = controller();
    c.set_monitoring(true).unwrap();
    c.capture_mut().next_capture = Some(CapturedAudio::Encoded(vec![1, 2, 3, 4]));
    c.start_recording(0).unwrap();
    c.backend_mut().advance(1.0);
    c.stop_recording();
    c.backend_mut().advance(0.125);
    c.poll();
    assert!(buffer_of(&c, 0).is_none());
    assert_eq!(c.backend().monitor_gain, DEFAULT_MONITOR_LEVEL);
}

#[test]
fn monitoring_needs_the_input() {
    let mut c = controller();
    c.capture_mut().fail_start = Some(StartFailure::Permission);
    assert!(c.set_monitoring(true).is_err());
    assert!(!c.state().monitor.enabled);
    assert_eq!(c.backend().monitor_gain, 0.0);
    assert_eq!(c.take_notifications().len(), 1);
}

#[test]
fn mix_export_applies_volume_and_the_mute_solo_gate() {
    let dir = tempfile::tempdir().unwrap();
    let mut c = controller();
    record(&mut c, 0, 3.0, 0.5);
    record(&mut c, 1, 2.0, 0.25);
    c.set_volume(1, 0.5).unwrap();

    let path = c.export_mix(dir.path()).unwrap();
    assert_eq!(path, dir.path().join("octoloop_mix_4.00s.wav"));
    let mix = codec::read_wav_file(&path).unwrap();
    assert_eq!(mix.len(), 4000);
    assert!((mix.mono()[1000] - (0.5 * 0.9 + 0.25 * 0.5)).abs() < 1e-3);
    assert!((mix.mono()[2500] - 0.45).abs() < 1e-3);

    c.set_solo(1, true).unwrap();
    let mix = codec::read_wav_file(&c.export_mix(dir.path()).unwrap()).unwrap();
    assert!((mix.mono()[1000] - 0.125).abs() < 1e-3);
    assert!(mix.mono()[2500].abs() < 1e-3);
}

#[test]
fn stems_are_written_per_recorded_track() {
    let dir = tempfile::tempdir().unwrap();
    let mut c = controller();
    record(&mut c, 0, 3.0, 0.5);
    record(&mut c, 2, 2.0, 0.25);
    c.set_mute(0, true).unwrap();

    let paths = c.export_stems(dir.path()).unwrap();
    assert_eq!(
        paths,
        vec![
            dir.path().join("octoloop_t1_4.00s.wav"),
            dir.path().join("octoloop_t3_4.00s.wav"),
        ]
    );
    let stem = codec::read_wav_file(&paths[0]).unwrap();
    assert_eq!(stem.len(), 4000);
    // Stems ignore the mixer.
    assert!((stem.mono()[1000] - 0.5).abs() < 1e-3);
}

#[test]
fn export_without_audio_asks_for_a_recording() {
    let dir = tempfile::tempdir().unwrap();
    let mut c = controller();
    c.set_loop_measures(2);
    assert!(matches!(
        c.export_mix(dir.path()),
        Err(LooperError::NothingRecorded)
    ));
    assert!(c.export_stems(dir.path()).is_err());
    let notes = c.take_notifications();
    assert_eq!(notes.len(), 2);
    assert_eq!(notes[0].message, "Record something first.");
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}
