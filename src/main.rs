//! playsync demo
//!
//! Drives a threaded orchestrator over three simulated streams from stdin
//! commands. Set `RUST_LOG=debug` to watch the synchronizer at work.
//!
//! Usage: `playsync [config.json]`

use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use playsync::backend::{SimulatedStream, SimulatedStreamConfig};
use playsync::{ClockEvent, Driver, JogStride, PlaybackOrchestrator, StreamId, SyncConfig};

const HELP: &str = "\
commands:
  play | pause | stop | toggle        transport
  ff | rw                             fastest forward / reverse
  sf | sb                             shuttle forward / back one ladder step
  jf [frames] | jb [frames]           jog (1, 5 or 10 frames)
  back <ms>                           go back
  seek <ms> | jump <ms>               move the needle
  roi <start> <end> | roi clear       region of interest
  fps <rate> | fps clear              jog frame rate override
  offset <stream> <ms>                move a stream on the timeline
  status                              clock and stream state
  help | quit";

fn load_config() -> Result<SyncConfig> {
    match env::args().nth(1) {
        Some(path) => {
            SyncConfig::from_json_file(&path).with_context(|| format!("loading {}", path))
        }
        None => Ok(SyncConfig::default()),
    }
}

fn attach_demo_streams(orchestrator: &PlaybackOrchestrator) -> Result<Vec<(String, StreamId)>> {
    let camera = SimulatedStreamConfig::video("camera-a", 60_000, 30.0);
    let mut drifting = SimulatedStreamConfig::video("camera-b", 50_000, 25.0);
    drifting.offset = 5_000;
    drifting.drift_factor = 1.03;
    let mut audio = SimulatedStreamConfig::audio("room-mic", 65_000);
    audio.drift_factor = 0.99;

    let mut ids = Vec::new();
    for config in [camera, drifting, audio] {
        let name = config.name.clone();
        let id = orchestrator.attach_stream(Box::new(SimulatedStream::new(config)))?;
        ids.push((name, id));
    }
    Ok(ids)
}

fn parse_ms(arg: Option<&str>) -> Result<i64> {
    let Some(arg) = arg else {
        bail!("missing milliseconds argument");
    };
    arg.parse::<i64>().with_context(|| format!("not a number of milliseconds: {}", arg))
}

fn stride(arg: Option<&str>) -> Result<JogStride> {
    Ok(match arg {
        None | Some("1") => JogStride::Frame,
        Some("5") => JogStride::Coarse,
        Some("10") => JogStride::ExtraCoarse,
        Some(other) => bail!("jog stride must be 1, 5 or 10, got {}", other),
    })
}

fn print_status(orchestrator: &PlaybackOrchestrator, streams: &[(String, StreamId)]) {
    let (min, max) = orchestrator.region();
    println!(
        "time {:>9.1} ms  rate {:>7}  {:?}  region [{}, {}]  jog step {:?} ms",
        orchestrator.current_time(),
        orchestrator.rate(),
        orchestrator.transport_state(),
        min,
        if max == i64::MAX { "inf".to_string() } else { max.to_string() },
        orchestrator.jog_step_ms()
    );
    for (name, id) in streams {
        let line = orchestrator.with_binding(*id, |binding| {
            format!(
                "  {:<9} {}  offset {:>6}  local {:>6} ms  playing {:<5}  {:?}  {:?}",
                name,
                id,
                binding.offset(),
                binding.stream().current_time(),
                binding.is_playing(),
                binding.mode(),
                binding.stats()
            )
        });
        if let Some(line) = line {
            println!("{}", line);
        }
    }
}

fn run_command(
    orchestrator: &PlaybackOrchestrator,
    streams: &[(String, StreamId)],
    line: &str,
) -> Result<bool> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(true);
    };
    let arg = words.next();

    match command {
        "play" => orchestrator.play(),
        "pause" => orchestrator.pause(),
        "stop" => orchestrator.stop(),
        "toggle" => orchestrator.toggle(),
        "ff" => orchestrator.fast_forward(),
        "rw" => orchestrator.rewind(),
        "sf" => orchestrator.shuttle_forward(),
        "sb" => orchestrator.shuttle_back(),
        "jf" => {
            orchestrator.jog_forward_by(stride(arg)?);
        }
        "jb" => {
            orchestrator.jog_back_by(stride(arg)?);
        }
        "back" => orchestrator.go_back(parse_ms(arg)?),
        "seek" => orchestrator.seek(parse_ms(arg)?),
        "jump" => orchestrator.jump_to(parse_ms(arg)?),
        "roi" => match arg {
            Some("clear") => orchestrator.clear_region_of_interest(),
            _ => orchestrator.set_region_of_interest(parse_ms(arg)?, parse_ms(words.next())?),
        },
        "fps" => match arg {
            Some("clear") => orchestrator.clear_frame_rate_override(),
            Some(rate) => {
                let fps = rate.parse().with_context(|| format!("not a frame rate: {}", rate))?;
                if !orchestrator.set_frame_rate_override(fps) {
                    bail!("frame rate must be a non-negative number, got {}", rate);
                }
            }
            None => bail!("fps needs a rate or 'clear'"),
        },
        "offset" => {
            let index = parse_ms(arg)? as usize;
            let Some((_, id)) = streams.get(index) else {
                bail!("no stream #{} (0..{})", index, streams.len());
            };
            orchestrator.set_stream_offset(*id, parse_ms(words.next())?)?;
        }
        "status" => print_status(orchestrator, streams),
        "help" => println!("{}", HELP),
        "quit" | "exit" => return Ok(false),
        other => bail!("unknown command '{}', try 'help'", other),
    }
    Ok(true)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = load_config()?;
    let orchestrator = PlaybackOrchestrator::new(config, Driver::Threaded)?;
    orchestrator.add_listener(Arc::new(|event: ClockEvent| match event {
        ClockEvent::Started(t) => println!("> started at {:.0} ms", t),
        ClockEvent::Stopped(t) => println!("> stopped at {:.0} ms", t),
        ClockEvent::RateChanged(r) => println!("> rate {}", r),
        _ => {}
    }));

    let streams = attach_demo_streams(&orchestrator)?;
    println!("{}", HELP);

    let stdin = io::stdin();
    loop {
        print!("playsync> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        match run_command(&orchestrator, &streams, line.trim()) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => eprintln!("error: {:#}", e),
        }
    }

    orchestrator.shutdown();
    Ok(())
}
