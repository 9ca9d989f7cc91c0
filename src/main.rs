mod config;
mod core;
mod input;
mod pipeline;
mod playback;
mod viewer;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use config::RunSettings;
use input::{FrameSource, SyntheticSequence};
use pipeline::{PipelineFactory, SimulatedPipeline};
use playback::control::spawn_stdin_listener;
use playback::{join_contexts, run_session, ControlSurface};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use viewer::{ConsoleViewer, Viewer};

fn cli() -> Command {
    Command::new("vo-replay")
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(Arg::new("config").long("config").value_name("FILE").value_parser(value_parser!(PathBuf))
            .help("Settings file (defaults to <config dir>/vo-replay/settings.json)"))
        .arg(Arg::new("save-config").long("save-config").value_name("FILE").value_parser(value_parser!(PathBuf))
            .help("Write the effective settings to FILE and continue"))
        .arg(Arg::new("start").long("start").value_parser(value_parser!(i64))
            .help("First dataset index to play"))
        .arg(Arg::new("end").long("end").value_parser(value_parser!(i64))
            .help("Dataset index to stop before"))
        .arg(Arg::new("reverse").long("reverse").action(ArgAction::SetTrue)
            .help("Play the range back to front"))
        .arg(Arg::new("speed").long("speed").value_parser(value_parser!(f64))
            .help("Factor on recorded time; 0 plays as fast as possible"))
        .arg(Arg::new("preset").long("preset").value_parser(value_parser!(u8))
            .help("Benchmark preset 0-3"))
        .arg(Arg::new("output").long("output").value_name("FILE").value_parser(value_parser!(PathBuf))
            .help("Trajectory output"))
        .arg(Arg::new("map").long("map").value_name("FILE").value_parser(value_parser!(PathBuf))
            .help("Map output"))
        .arg(Arg::new("timing-log").long("timing-log").value_name("FILE").value_parser(value_parser!(PathBuf))
            .help("Append the benchmark figures to this CSV file"))
        .arg(Arg::new("nogui").long("nogui").action(ArgAction::SetTrue)
            .help("Run without a viewer"))
        .arg(Arg::new("quiet").long("quiet").short('q').action(ArgAction::SetTrue)
            .help("Only log warnings"))
        .arg(Arg::new("nomt").long("nomt").action(ArgAction::SetTrue)
            .help("Disable multi-threaded mapping"))
        .arg(Arg::new("no-loop-closing").long("no-loop-closing").action(ArgAction::SetTrue)
            .help("Disable late trajectory correction"))
        .arg(Arg::new("interactive").long("interactive").short('i').action(ArgAction::SetTrue)
            .help("Read p (pause/resume) and r (reset) commands from stdin"))
        .arg(Arg::new("frames").long("frames").value_parser(value_parser!(usize)).default_value("1000")
            .help("Length of the synthetic sequence"))
        .arg(Arg::new("rate").long("rate").value_parser(value_parser!(f64)).default_value("20")
            .help("Frame rate of the synthetic sequence in Hz"))
        .arg(Arg::new("fail-init").long("fail-init").value_parser(value_parser!(usize)).default_value("0")
            .help("Number of simulated pipelines that fail to initialize"))
        .arg(Arg::new("lose-at").long("lose-at").value_parser(value_parser!(usize))
            .help("Dataset index at which the simulated pipeline loses tracking"))
}

/// File settings, preset, then explicit flags, in that order
fn resolve_settings(matches: &ArgMatches) -> Result<RunSettings> {
    let mut settings = RunSettings::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))
        .context("Failed to load settings")?;

    if let Some(&preset) = matches.get_one::<u8>("preset") {
        settings.preset = Some(preset);
    }
    if let Some(preset) = settings.preset {
        settings.apply_preset(preset)?;
    }

    if let Some(&start) = matches.get_one::<i64>("start") {
        settings.start = start;
    }
    if let Some(&end) = matches.get_one::<i64>("end") {
        settings.end = end;
    }
    if let Some(&speed) = matches.get_one::<f64>("speed") {
        settings.speed = speed;
    }
    if let Some(output) = matches.get_one::<PathBuf>("output") {
        settings.output = output.clone();
    }
    if let Some(map) = matches.get_one::<PathBuf>("map") {
        settings.map_output = map.clone();
    }
    if let Some(log) = matches.get_one::<PathBuf>("timing-log") {
        settings.timing_log = Some(log.clone());
    }
    settings.reverse |= matches.get_flag("reverse");
    settings.disable_viewer |= matches.get_flag("nogui");
    settings.quiet |= matches.get_flag("quiet");
    settings.interactive |= matches.get_flag("interactive");
    if matches.get_flag("nomt") {
        settings.tuning.multi_threading = false;
    }
    if matches.get_flag("no-loop-closing") {
        settings.tuning.loop_closing = false;
    }

    settings.validate()?;
    Ok(settings)
}

fn init_logging(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let matches = cli().get_matches();
    let settings = resolve_settings(&matches)?;
    init_logging(settings.quiet);

    if let Some(path) = matches.get_one::<PathBuf>("save-config") {
        settings.save(path)?;
        info!("Saved settings to {}", path.display());
    }

    let frames = *matches.get_one::<usize>("frames").context("missing --frames")?;
    let rate = *matches.get_one::<f64>("rate").context("missing --rate")?;
    let mut source = SyntheticSequence::new("synthetic", frames, rate).with_linear_gamma();
    if let Some((width, height)) = settings.tuning.image_size {
        source = source.with_resolution(width, height);
    }
    let source: Arc<dyn FrameSource> = Arc::new(source);

    let mut script = settings.tuning.simulation_script();
    script.failing_instances = *matches.get_one::<usize>("fail-init").context("missing --fail-init")?;
    script.lose_at_frame = matches.get_one::<usize>("lose-at").copied();
    let factory: Arc<dyn PipelineFactory> =
        Arc::new(SimulatedPipeline::factory(script, SimulatedPipeline::journal()));

    let viewer: Option<Arc<dyn Viewer>> = if settings.disable_viewer {
        None
    } else {
        Some(Arc::new(ConsoleViewer::new(source.name(), 100)))
    };

    info!(
        "Replaying {} frames from {} (speed {}, preset {:?})",
        source.len(),
        source.name(),
        settings.speed,
        settings.preset
    );

    let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let control = ControlSurface::new();
    let _listener = if settings.interactive {
        let _guard = rt.enter();
        Some(spawn_stdin_listener(control.clone()))
    } else {
        None
    };

    let session = settings.session(source.len());
    let processing = rt.spawn(run_session(source, factory, viewer.clone(), control, session));
    let result = join_contexts(&rt, processing, viewer);

    // the stdin reader never completes on its own
    rt.shutdown_background();

    match result {
        Ok(report) => {
            if settings.quiet {
                println!("{}", report);
            }
            Ok(())
        }
        Err(e) => {
            warn!("Replay failed: {}", e);
            Err(e.into())
        }
    }
}
