// src/shell.rs

//! Line commands for the headless host.
//!
//! Track numbers are 1-based on the command line, matching the track labels.

use crate::backend::{AudioBackend, CaptureDevice};
use crate::controller::LoopController;
use crate::error::Result;
use crate::fx::{FxModule, FxParam};
use crate::looper::NUM_TRACKS;
use crate::transport::Subdivision;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::str::FromStr;

pub const HELP: &str = "\
rec N | stoprec | play [N] | stop [N] | clear N | undo N | redo N
bpm X | sig T B | swing P | subdiv N | measures N | metro on|off | metrovol V
mute N | solo N | vol N V | fx N MODULE on|off | fxp N MODULE.PARAM V
monitor on|off | monlevel V | export mix|stems DIR
save [DIR] | load DIR | sessions | status | help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    Record(usize),
    StopRecording,
    PlayAll,
    StopAll,
    PlayTrack(usize),
    StopTrack(usize),
    Clear(usize),
    Undo(usize),
    Redo(usize),
    Bpm(f64),
    Signature(u32, u32),
    Swing(f64),
    Subdivision(Subdivision),
    Measures(u32),
    Metronome(bool),
    MetronomeVolume(f32),
    Mute(usize),
    Solo(usize),
    Volume(usize, f32),
    FxEnable(usize, FxModule, bool),
    FxValue(usize, FxParam, f32),
    Monitor(bool),
    MonitorLevel(f32),
    ExportMix(PathBuf),
    ExportStems(PathBuf),
    Save(Option<PathBuf>),
    Load(PathBuf),
    Sessions,
    Status,
    Help,
    Quit,
}

fn arg<'a>(args: &[&'a str], i: usize) -> std::result::Result<&'a str, String> {
    args.get(i)
        .copied()
        .ok_or_else(|| format!("Missing argument {}", i + 1))
}

fn number<T: FromStr>(args: &[&str], i: usize) -> std::result::Result<T, String> {
    let raw = arg(args, i)?;
    raw.parse()
        .map_err(|_| format!("Not a number: {}", raw))
}

/// Reads a 1-based track number and returns the slot index.
fn track(args: &[&str], i: usize) -> std::result::Result<usize, String> {
    let n: usize = number(args, i)?;
    if n == 0 || n > NUM_TRACKS {
        return Err(format!("Track must be 1..{}", NUM_TRACKS));
    }
    Ok(n - 1)
}

fn on_off(args: &[&str], i: usize) -> std::result::Result<bool, String> {
    match arg(args, i)? {
        "on" => Ok(true),
        "off" => Ok(false),
        other => Err(format!("Expected on|off, got: {}", other)),
    }
}

impl FromStr for ShellCommand {
    type Err = String;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&name, args)) = words.split_first() else {
            return Err("Empty command".to_string());
        };
        let command = match name.to_ascii_lowercase().as_str() {
            "rec" => ShellCommand::Record(track(args, 0)?),
            "stoprec" => ShellCommand::StopRecording,
            "play" if args.is_empty() => ShellCommand::PlayAll,
            "play" => ShellCommand::PlayTrack(track(args, 0)?),
            "stop" if args.is_empty() => ShellCommand::StopAll,
            "stop" => ShellCommand::StopTrack(track(args, 0)?),
            "clear" => ShellCommand::Clear(track(args, 0)?),
            "undo" => ShellCommand::Undo(track(args, 0)?),
            "redo" => ShellCommand::Redo(track(args, 0)?),
            "bpm" => ShellCommand::Bpm(number(args, 0)?),
            "sig" => ShellCommand::Signature(number(args, 0)?, number(args, 1)?),
            "swing" => ShellCommand::Swing(number(args, 0)?),
            "subdiv" => ShellCommand::Subdivision(Subdivision::from_pulses(number(args, 0)?)),
            "measures" => ShellCommand::Measures(number(args, 0)?),
            "metro" => ShellCommand::Metronome(on_off(args, 0)?),
            "metrovol" => ShellCommand::MetronomeVolume(number(args, 0)?),
            "mute" => ShellCommand::Mute(track(args, 0)?),
            "solo" => ShellCommand::Solo(track(args, 0)?),
            "vol" => ShellCommand::Volume(track(args, 0)?, number(args, 1)?),
            "fx" => ShellCommand::FxEnable(
                track(args, 0)?,
                arg(args, 1)?.parse()?,
                on_off(args, 2)?,
            ),
            "fxp" => ShellCommand::FxValue(track(args, 0)?, arg(args, 1)?.parse()?, number(args, 2)?),
            "monitor" => ShellCommand::Monitor(on_off(args, 0)?),
            "monlevel" => ShellCommand::MonitorLevel(number(args, 0)?),
            "export" => match arg(args, 0)? {
                "mix" => ShellCommand::ExportMix(PathBuf::from(arg(args, 1)?)),
                "stems" => ShellCommand::ExportStems(PathBuf::from(arg(args, 1)?)),
                other => return Err(format!("Expected mix|stems, got: {}", other)),
            },
            "save" => ShellCommand::Save(args.first().map(PathBuf::from)),
            "load" => ShellCommand::Load(PathBuf::from(arg(args, 0)?)),
            "sessions" => ShellCommand::Sessions,
            "status" => ShellCommand::Status,
            "help" | "?" => ShellCommand::Help,
            "quit" | "exit" => ShellCommand::Quit,
            other => return Err(format!("Unknown command: {} (try help)", other)),
        };
        Ok(command)
    }
}

/// Runs one command and returns the text to show the user. Failures have already been
/// queued as notifications by the controller.
pub fn execute<B: AudioBackend, C: CaptureDevice>(
    controller: &mut LoopController<B, C>,
    command: ShellCommand,
) -> Result<String> {
    let reply = match command {
        ShellCommand::Record(t) => {
            if controller.start_recording(t)? {
                format!("Recording track {}", t + 1)
            } else {
                "Recorder busy".to_string()
            }
        }
        ShellCommand::StopRecording => {
            controller.stop_recording();
            String::new()
        }
        ShellCommand::PlayAll => {
            controller.start_all();
            String::new()
        }
        ShellCommand::StopAll => {
            controller.stop_all();
            String::new()
        }
        ShellCommand::PlayTrack(t) => {
            controller.start_track(t)?;
            String::new()
        }
        ShellCommand::StopTrack(t) => {
            controller.stop_track(t)?;
            String::new()
        }
        ShellCommand::Clear(t) => {
            controller.clear_track(t)?;
            String::new()
        }
        ShellCommand::Undo(t) => {
            if controller.undo(t)? {
                String::new()
            } else {
                "Nothing to undo".to_string()
            }
        }
        ShellCommand::Redo(t) => {
            if controller.redo(t)? {
                String::new()
            } else {
                "Nothing to redo".to_string()
            }
        }
        ShellCommand::Bpm(bpm) => {
            controller.set_bpm(bpm);
            format!("{:.1} BPM", controller.state().transport.bpm())
        }
        ShellCommand::Signature(top, bottom) => {
            controller.set_time_signature(top, bottom);
            let (top, bottom) = controller.state().transport.time_signature();
            format!("{}/{}", top, bottom)
        }
        ShellCommand::Swing(p) => {
            controller.set_swing(p);
            String::new()
        }
        ShellCommand::Subdivision(s) => {
            controller.set_subdivision(s);
            String::new()
        }
        ShellCommand::Measures(n) => {
            controller.set_loop_measures(n);
            loop_line(controller)
        }
        ShellCommand::Metronome(on) => {
            controller.set_metronome_enabled(on);
            String::new()
        }
        ShellCommand::MetronomeVolume(v) => {
            controller.set_metronome_volume(v);
            String::new()
        }
        ShellCommand::Mute(t) => {
            let muted = controller.toggle_mute(t)?;
            format!("Track {} {}", t + 1, if muted { "muted" } else { "unmuted" })
        }
        ShellCommand::Solo(t) => {
            let soloed = controller.toggle_solo(t)?;
            format!("Track {} solo {}", t + 1, if soloed { "on" } else { "off" })
        }
        ShellCommand::Volume(t, v) => {
            controller.set_volume(t, v)?;
            String::new()
        }
        ShellCommand::FxEnable(t, module, on) => {
            controller.set_fx_enabled(t, module, on)?;
            String::new()
        }
        ShellCommand::FxValue(t, param, v) => {
            let stored = controller.set_fx_param(t, param, v)?;
            format!("{} = {}", param, stored)
        }
        ShellCommand::Monitor(on) => {
            controller.set_monitoring(on)?;
            String::new()
        }
        ShellCommand::MonitorLevel(v) => {
            controller.set_monitor_level(v);
            String::new()
        }
        ShellCommand::ExportMix(dir) => controller.export_mix(&dir)?.display().to_string(),
        ShellCommand::ExportStems(dir) => controller
            .export_stems(&dir)?
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join("\n"),
        ShellCommand::Save(dir) => {
            let path = controller.save_session(dir.as_deref())?;
            path.display().to_string()
        }
        ShellCommand::Load(dir) => {
            controller.load_session(&dir)?;
            status(controller)
        }
        ShellCommand::Sessions => controller
            .list_sessions()
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join("\n"),
        ShellCommand::Status => status(controller),
        ShellCommand::Help => HELP.to_string(),
        ShellCommand::Quit => String::new(),
    };
    Ok(reply)
}

fn loop_line<B: AudioBackend, C: CaptureDevice>(controller: &LoopController<B, C>) -> String {
    match controller.state().transport.loop_length() {
        Some(len) => format!(
            "Loop {:.3}s ({} measures)",
            len,
            controller.state().transport.loop_measures()
        ),
        None => "No loop".to_string(),
    }
}

pub fn status<B: AudioBackend, C: CaptureDevice>(controller: &LoopController<B, C>) -> String {
    let state = controller.state();
    let transport = &state.transport;
    let (top, bottom) = transport.time_signature();
    let mut out = format!(
        "{:.1} BPM {}/{} swing {:.0}% {:?} | {} | {}",
        transport.bpm(),
        top,
        bottom,
        transport.swing_percent(),
        transport.subdivision(),
        loop_line(controller),
        if transport.is_playing() { "playing" } else { "stopped" },
    );
    if state.monitor.enabled {
        let _ = write!(out, " | monitor {:.2}", state.monitor.level);
    }
    if let Some(pos) = controller.position() {
        let _ = write!(out, " | {:>2}/32", pos.led + 1);
    }
    for i in 0..state.tracks.len() {
        let Ok(track) = controller.track_status(i) else {
            continue;
        };
        let _ = write!(
            out,
            "\n  {}: {:?} vol {:.2}{}{}",
            i + 1,
            track.state,
            track.mix.volume,
            if track.mix.is_muted { " M" } else { "" },
            if track.mix.is_soloed { " S" } else { "" },
        );
        if let Some(d) = track.duration {
            let _ = write!(out, " {:.3}s", d);
        }
        if !track.fx.is_empty() {
            let fx: Vec<&str> = track.fx.iter().map(|m| m.key()).collect();
            let _ = write!(out, " fx[{}]", fx.join(","));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControllerConfig;
    use crate::looper::TrackState;
    use crate::testutil::{FakeBackend, FakeCapture};

    fn controller() -> LoopController<FakeBackend, FakeCapture> {
        LoopController::new(
            FakeBackend::new(1000),
            FakeCapture::new(),
            ControllerConfig::default(),
        )
    }

    fn run(c: &mut LoopController<FakeBackend, FakeCapture>, line: &str) -> Result<String> {
        let command: ShellCommand = line.parse().map_err(crate::error::LooperError::Session)?;
        execute(c, command)
    }

    #[test]
    fn parses_the_command_set() {
        assert_eq!("rec 1".parse(), Ok(ShellCommand::Record(0)));
        assert_eq!("play".parse(), Ok(ShellCommand::PlayAll));
        assert_eq!("play 3".parse(), Ok(ShellCommand::PlayTrack(2)));
        assert_eq!("sig 7 8".parse(), Ok(ShellCommand::Signature(7, 8)));
        assert_eq!("subdiv 4".parse(), Ok(ShellCommand::Subdivision(Subdivision::Sixteenth)));
        assert_eq!(
            "fx 2 delay on".parse(),
            Ok(ShellCommand::FxEnable(1, FxModule::Delay, true))
        );
        assert_eq!(
            "fxp 1 reverb.mix 0.2".parse(),
            Ok(ShellCommand::FxValue(0, FxParam::ReverbMix, 0.2))
        );
        assert_eq!("save".parse(), Ok(ShellCommand::Save(None)));
        assert_eq!("monitor on".parse(), Ok(ShellCommand::Monitor(true)));
        assert_eq!(
            "export stems out".parse(),
            Ok(ShellCommand::ExportStems(PathBuf::from("out")))
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!("rec 0".parse::<ShellCommand>().is_err());
        assert!("rec 9".parse::<ShellCommand>().is_err());
        assert!("bpm fast".parse::<ShellCommand>().is_err());
        assert!("metro maybe".parse::<ShellCommand>().is_err());
        assert!("fx 1 chorus on".parse::<ShellCommand>().is_err());
        assert!("export wav out".parse::<ShellCommand>().is_err());
        assert!("export mix".parse::<ShellCommand>().is_err());
        assert!("dance".parse::<ShellCommand>().is_err());
        assert!("   ".parse::<ShellCommand>().is_err());
    }

    #[test]
    fn commands_drive_the_controller() {
        let mut c = controller();
        assert_eq!(run(&mut c, "bpm 90").unwrap(), "90.0 BPM");
        run(&mut c, "measures 2").unwrap();
        assert!(c.state().transport.loop_length().is_some());
        assert_eq!(run(&mut c, "mute 2").unwrap(), "Track 2 muted");
        assert_eq!(run(&mut c, "fxp 1 delay.feedback 3").unwrap(), "delay.feedback = 0.9");
        run(&mut c, "fx 1 eq on").unwrap();
        assert_eq!(c.track_status(0).unwrap().fx, vec![FxModule::Eq]);
        run(&mut c, "play").unwrap();
        assert!(c.state().transport.is_playing());
        run(&mut c, "stop").unwrap();
        assert!(!c.state().transport.is_playing());
        assert_eq!(c.track_status(0).unwrap().state, TrackState::Empty);
    }

    #[test]
    fn monitor_and_export_commands() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = controller();
        run(&mut c, "monitor on").unwrap();
        run(&mut c, "monlevel 0.3").unwrap();
        assert_eq!(c.backend().monitor_gain, 0.3);
        run(&mut c, "monitor off").unwrap();
        assert_eq!(c.backend().monitor_gain, 0.0);

        let line = format!("export mix {}", dir.path().display());
        assert!(run(&mut c, &line).is_err());
    }

    #[test]
    fn status_lists_every_track() {
        let c = controller();
        let text = status(&c);
        assert!(text.starts_with("120.0 BPM 4/4"));
        assert_eq!(text.lines().count(), 1 + NUM_TRACKS);
    }
}
