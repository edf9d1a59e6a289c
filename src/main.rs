use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info, warn};

use camctl::config::{CameraConfig, SelectionConfig, TriggerSettings};
use camctl::{
    capture_all, discover, run_capture, run_software_triggered, CamctlConfig, CameraHandle,
    CameraHandleBuilder, CloseSignal, FrameLogSink, FrameSink, PixelFormat, Roi, SimulatedBackend,
};

#[derive(Parser, Debug)]
#[command(name = "camctl")]
#[command(about = "Inspect, configure and grab frames from GenICam-style cameras")]
#[command(version)]
#[command(long_about = "Typed control of industrial cameras: list attached devices, dump and \
change their properties, set a region of interest and grab free-running or triggered frames \
to PNG files. Devices come from the [simulator] section of the configuration file.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "camctl.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, global = true, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, global = true, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, global = true, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, global = true, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List attached cameras
    List {
        #[arg(long, help = "Print as JSON")]
        json: bool,
    },

    /// Dump every property with its value and description
    Info {
        #[command(flatten)]
        select: Select,

        #[arg(long, help = "Print as JSON")]
        json: bool,
    },

    /// Read one or more properties
    Get {
        #[command(flatten)]
        select: Select,

        #[arg(required = true, value_name = "NAME")]
        names: Vec<String>,
    },

    /// Write one or more properties, in the order given
    Set {
        #[command(flatten)]
        select: Select,

        #[arg(required = true, value_name = "NAME=VALUE", value_parser = parse_assignment)]
        assignments: Vec<(String, String)>,
    },

    /// Grab free-running frames
    Grab(GrabArgs),

    /// Grab frames on a hardware or software trigger
    Trigger {
        #[command(flatten)]
        grab: GrabArgs,

        #[arg(long, help = "Issue software triggers instead of waiting on a line")]
        software: bool,

        #[arg(long, default_value = "Line1", help = "Trigger input line")]
        source: String,

        #[arg(long, default_value = "FrameStart", help = "Trigger selector")]
        selector: String,
    },

    /// Print default configuration in TOML format and exit
    PrintConfig,

    /// Validate configuration file and exit
    ValidateConfig,
}

#[derive(clap::Args, Debug, Clone)]
struct Select {
    #[arg(long, help = "Camera serial number")]
    serial: Option<String>,

    #[arg(long, conflicts_with = "serial", help = "Camera index in the list")]
    index: Option<usize>,
}

#[derive(clap::Args, Debug, Clone)]
struct GrabArgs {
    #[command(flatten)]
    select: Select,

    #[arg(short = 'n', long, help = "Number of frames, 0 to stream until interrupted")]
    count: Option<u32>,

    #[arg(long, value_name = "WxH+X+Y", help = "Region of interest")]
    roi: Option<Roi>,

    #[arg(long, conflicts_with = "roi", help = "Half-size ROI in the sensor centre")]
    centered: bool,

    #[arg(long, value_name = "MICROSECONDS", help = "Exposure time")]
    exposure: Option<f64>,

    #[arg(long, help = "Pixel format, e.g. Mono8 or Mono12")]
    pixel_format: Option<PixelFormat>,

    #[arg(short, long, help = "Directory for saved frames")]
    output: Option<PathBuf>,

    #[arg(long, help = "Log frames instead of saving them")]
    no_save: bool,

    #[arg(long, conflicts_with_all = ["serial", "index"], help = "Grab from every attached camera at once")]
    all: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Handle special modes that don't require full initialization
    if let Command::PrintConfig = args.command {
        return print_default_config();
    }

    init_logging(&args)?;

    info!("Starting camctl v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match CamctlConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Command::ValidateConfig = args.command {
        match config.validate() {
            Ok(()) => {
                info!("Configuration validation successful");
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                error!("Configuration validation failed: {}", e);
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    config.validate().context("Invalid configuration")?;
    let backend = SimulatedBackend::new(config.simulator.devices.clone());

    match &args.command {
        Command::List { json } => list(&backend, *json),
        Command::Info { select, json } => {
            let camera = open(&backend, &config, select, CameraConfig::default())?;
            info_dump(&camera, *json)
        }
        Command::Get { select, names } => {
            let camera = open(&backend, &config, select, CameraConfig::default())?;
            for name in names {
                println!("{} = {}", name, camera.get_property(name)?);
            }
            Ok(())
        }
        Command::Set { select, assignments } => {
            let mut camera = open(&backend, &config, select, CameraConfig::default())?;
            for (name, value) in assignments {
                camera.set_property_str(name, value)?;
                println!("{} = {}", name, camera.get_property(name)?);
            }
            Ok(())
        }
        Command::Grab(grab) => run_grab(&backend, &config, grab, None, false),
        Command::Trigger {
            grab,
            software,
            source,
            selector,
        } => {
            let trigger = TriggerSettings {
                selector: selector.clone(),
                source: if *software {
                    "Software".to_string()
                } else {
                    source.clone()
                },
            };
            run_grab(&backend, &config, grab, Some(trigger), *software)
        }
        Command::PrintConfig | Command::ValidateConfig => Ok(()),
    }
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    // Determine log level based on flags
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("camctl={}", log_level)));

    // Logs go to stderr so property dumps on stdout stay parseable
    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# camctl configuration file");
    println!("# Every option with its default value. Environment variables such as");
    println!("# CAMCTL_ACQUISITION__FRAME_COUNT=10 override file values.");
    println!();
    print!("{}", CamctlConfig::default_toml()?);
    Ok(())
}

fn parse_assignment(raw: &str) -> std::result::Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing property name in '{}'", raw));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn selection(config: &CamctlConfig, select: &Select) -> SelectionConfig {
    if select.serial.is_some() || select.index.is_some() {
        SelectionConfig {
            serial: select.serial.clone(),
            index: select.index,
        }
    } else {
        config.selection.clone()
    }
}

fn open(
    backend: &SimulatedBackend,
    config: &CamctlConfig,
    select: &Select,
    settings: CameraConfig,
) -> Result<CameraHandle> {
    let camera = CameraHandleBuilder::new()
        .backend(backend)
        .selection(selection(config, select))
        .settings(settings)
        .grab_options(config.acquisition.grab_options())
        .open()?;
    Ok(camera)
}

fn list(backend: &SimulatedBackend, json: bool) -> Result<()> {
    let devices = discover(backend)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    for (index, device) in devices.iter().enumerate() {
        println!(
            "{:>3}  {:<16} {:<20} {:<16} {}",
            index, device.serial, device.model, device.vendor, device.transport
        );
    }
    Ok(())
}

fn info_dump(camera: &CameraHandle, json: bool) -> Result<()> {
    let snapshot = camera.property_snapshot()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("{}", camera.descriptor());
    for entry in &snapshot {
        println!("  {}", entry);
        if !entry.description.is_empty() {
            println!("      {}", entry.description);
        }
    }
    Ok(())
}

/// Configured camera settings with command-line overrides applied
fn grab_settings(config: &CamctlConfig, grab: &GrabArgs, trigger: Option<TriggerSettings>) -> CameraConfig {
    let mut settings = config.camera.clone();

    if let Some(format) = grab.pixel_format {
        settings.pixel_format = Some(format);
    }
    if let Some(exposure) = grab.exposure {
        settings.exposure_time = Some(exposure);
    }
    if let Some(roi) = grab.roi {
        settings.roi = Some(roi);
        settings.centered_roi = false;
    } else if grab.centered {
        settings.centered_roi = true;
    }
    if trigger.is_some() {
        settings.trigger = trigger;
    }

    settings
}

fn frame_sink(config: &CamctlConfig, grab: &GrabArgs) -> Result<Box<dyn FrameSink>> {
    if grab.no_save {
        return Ok(Box::new(FrameLogSink::new()));
    }

    #[cfg(feature = "image_output")]
    {
        let directory = grab
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.output.directory));
        let sink = camctl::ImageFileSink::new(directory, config.output.prefix.clone())?;
        Ok(Box::new(sink))
    }

    #[cfg(not(feature = "image_output"))]
    {
        let _ = config;
        warn!("Built without image output, logging frames instead of saving them");
        Ok(Box::new(FrameLogSink::new()))
    }
}

fn run_grab(
    backend: &SimulatedBackend,
    config: &CamctlConfig,
    grab: &GrabArgs,
    trigger: Option<TriggerSettings>,
    software: bool,
) -> Result<()> {
    let count = grab.count.unwrap_or(config.acquisition.frame_count);
    let settings = grab_settings(config, grab, trigger);
    let mut sink = frame_sink(config, grab)?;

    if count == 0 {
        warn!("Streaming until interrupted");
    }

    let stop = CloseSignal::new();
    install_interrupt_handler(stop.clone());

    if grab.all {
        if software {
            anyhow::bail!("--software cannot be combined with --all");
        }

        let devices = discover(backend)?;
        let captures = capture_all(
            backend,
            &devices,
            &settings,
            config.acquisition.grab_options(),
            count,
            &stop,
            sink.as_mut(),
        )?;

        let mut failed = 0;
        for capture in &captures {
            match &capture.outcome {
                Ok(summary) => println!(
                    "{}: {} frame(s), {} bytes in {:.2?}",
                    capture.serial, summary.frames, summary.bytes, summary.elapsed
                ),
                Err(e) => {
                    failed += 1;
                    eprintln!("{}: {}", capture.serial, e);
                }
            }
        }
        if failed > 0 {
            anyhow::bail!("{} of {} camera(s) failed", failed, captures.len());
        }
        return Ok(());
    }

    let mut camera = open(backend, config, &grab.select, settings)?.with_close_signal(stop);
    let summary = if software {
        run_software_triggered(&mut camera, count, sink.as_mut())?
    } else {
        run_capture(&mut camera, count, sink.as_mut())?
    };

    println!(
        "{}: {} frame(s), {} bytes in {:.2?} ({:.1} fps)",
        camera.descriptor().serial,
        summary.frames,
        summary.bytes,
        summary.elapsed,
        summary.frame_rate()
    );
    Ok(())
}

/// Turn Ctrl-C and SIGTERM into a close request so the devices are released
fn install_interrupt_handler(stop: CloseSignal) {
    let result = ctrlc::set_handler(move || {
        info!("Interrupt received, closing camera(s)");
        stop.request();
    });
    if let Err(e) = result {
        warn!("Could not install interrupt handler: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("ExposureTime=10000").unwrap(),
            ("ExposureTime".to_string(), "10000".to_string())
        );
        assert_eq!(
            parse_assignment(" TriggerMode = On ").unwrap(),
            ("TriggerMode".to_string(), "On".to_string())
        );
        assert!(parse_assignment("Width").is_err());
        assert!(parse_assignment("=5").is_err());
    }

    #[test]
    fn test_cli_parses_grab() {
        let args = Args::try_parse_from([
            "camctl", "--debug", "grab", "-n", "3", "--roi", "2048x1500+1024+750", "--pixel-format", "mono12",
        ])
        .unwrap();

        let Command::Grab(grab) = args.command else {
            panic!("expected grab command");
        };
        assert!(args.debug);
        assert_eq!(grab.count, Some(3));
        assert_eq!(grab.roi, Some(Roi::new(1024, 750, 2048, 1500)));
        assert_eq!(grab.pixel_format, Some(PixelFormat::Mono12));
    }

    #[test]
    fn test_grab_overrides_config() {
        let config = CamctlConfig::default();
        let args = Args::try_parse_from(["camctl", "trigger", "--software", "--centered", "--exposure", "500"]).unwrap();

        let Command::Trigger { grab, .. } = args.command else {
            panic!("expected trigger command");
        };
        let settings = grab_settings(&config, &grab, Some(TriggerSettings::software()));
        assert!(settings.centered_roi);
        assert_eq!(settings.exposure_time, Some(500.0));
        assert!(settings.trigger.unwrap().is_software());
    }

    #[test]
    fn test_all_conflicts_with_serial() {
        assert!(Args::try_parse_from(["camctl", "grab", "--all", "--serial", "X"]).is_err());
    }
}
