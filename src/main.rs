//! Fujitsu Halcyon controller CLI
//!
//! A command-line interface (CLI) application that joins the wired remote
//! controller bus of Fujitsu Halcyon indoor units through a serial adapter.
//!
//! This tool allows users to:
//! - Run as a controller and print every state change of the indoor unit.
//! - Monitor and decode the bus traffic without transmitting.
//! - Decode a single captured frame.
//! - Validate a YAML configuration file.
//! - Apply one change (power, mode, zones, function registers, ...) and wait
//!   for the indoor unit to confirm it.
//!
//! The CLI leverages the `halcyon_lib` crate for the protocol and controller logic.

use anyhow::{Context, Result, bail};
use clap::Parser;
use dialoguer::Confirm;
use flexi_logger::{Logger, LoggerHandle};
use halcyon_lib::{
    capture::LogCapture,
    config::FileConfig,
    controller::{ControllerConfig, TemperatureUnit},
    driver::Driver,
    entities::EntityEvent,
    protocol::{self as proto, Frame},
    scheduler::Command,
    serial::SerialPortLine,
    transport::Transport,
};
use log::*;
use std::io::{Write, stdout};
use std::panic;
use std::time::{Duration, Instant};

mod commandline;

const SET_TICK: Duration = Duration::from_millis(10);

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown_file>", 0, 0));

        let cause_str = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            *s
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.as_str()
        } else {
            "<unknown_panic_cause>"
        };

        error!(
            target: "panic",
            "Thread '{}' panicked at '{}': {}:{} - Cause: {}",
            std::thread::current().name().unwrap_or("<unnamed>"),
            filename,
            line,
            column,
            cause_str
        );
    }));
    log_handle
}

fn load_config(args: &commandline::CliArgs) -> Result<FileConfig> {
    let mut config = match &args.config {
        Some(path) => FileConfig::load(path)
            .with_context(|| format!("Cannot load configuration from {}", path.display()))?,
        None => FileConfig::default(),
    };
    if let Some(address) = args.address {
        config.controller_address = *address;
    }
    if let Some(device) = &args.device {
        config.port = Some(device.clone());
    }
    Ok(config)
}

fn open_transport(config: &FileConfig) -> Result<Transport<SerialPortLine>> {
    let device = config
        .port
        .clone()
        .unwrap_or_else(commandline::default_device_name);
    info!("Opening serial port {device}");
    let line = SerialPortLine::open(&device)
        .with_context(|| format!("Cannot open serial port {device}"))?;
    Ok(Transport::new(line).with_capture(LogCapture))
}

fn print_event(event: &EntityEvent) {
    match event {
        EntityEvent::State { entity, value } => println!("{entity}: {value}"),
        EntityEvent::Visible { entity } => println!("{entity}: available"),
    }
}

fn handle_run(
    config: &FileConfig,
    controller_config: ControllerConfig,
    tick: Duration,
    temperature: Option<f32>,
) -> Result<()> {
    let mut driver = Driver::new(open_transport(config)?, controller_config);
    driver.controller_mut().subscribe(print_event);
    if let Some(temperature) = temperature {
        driver
            .controller_mut()
            .set_current_temperature(temperature, TemperatureUnit::Celsius);
    }
    info!("Running as {}", driver.controller().config().addresses.own_endpoint());
    loop {
        driver.poll(Instant::now()).context("Serial line failed")?;
        std::thread::sleep(tick);
    }
}

fn handle_monitor(config: &FileConfig, tick: Duration) -> Result<()> {
    let mut transport = open_transport(config)?;
    loop {
        transport
            .poll(Instant::now())
            .context("Serial line failed")?;
        while let Some(received) = transport.poll_frame() {
            match received.decode() {
                Ok(frame) => println!("{frame}"),
                Err(error) => warn!("Discarding frame: {error}"),
            }
        }
        std::thread::sleep(tick);
    }
}

fn handle_decode(bytes: &[u8], wire: bool) -> Result<()> {
    let decoded = if wire {
        Frame::from_bytes(bytes)
    } else {
        let logical: &[u8; proto::FRAME_SIZE] = bytes
            .try_into()
            .with_context(|| format!("Expected {} bytes", proto::FRAME_SIZE))?;
        Frame::from_logical(logical)
    };
    let frame =
        decoded.with_context(|| format!("Cannot decode {}", proto::format_hex(bytes)))?;
    println!("{frame}");
    println!("{:#?}", frame.payload);
    Ok(())
}

fn handle_check_config(config: &FileConfig) -> Result<()> {
    let controller_config = config.validate().context("Invalid configuration")?;
    println!("Configuration OK");
    println!(
        "  Controller: {}",
        controller_config.addresses.own_endpoint()
    );
    println!(
        "  Temperature controller: {}",
        controller_config.addresses.temperature_controller
    );
    println!("  Ignore lock: {}", controller_config.ignore_lock);
    println!("  Timing: {:?}", controller_config.timing);
    for (entity, settings) in &controller_config.entities {
        println!("  Entity {entity}: {settings:?}");
    }
    Ok(())
}

fn confirm_function_write(command: &Command) -> Result<bool> {
    println!("WARNING: Installer function registers change how the indoor unit operates.");
    println!("Only continue if you know the correct value for your unit.");
    Confirm::new()
        .with_prompt(format!("Do you want to {command}?"))
        .default(false)
        .show_default(true)
        .interact()
        .context("Failed to get user confirmation.")
}

/// Polls `driver` until `done` holds or `deadline` passes.
fn poll_until(
    driver: &mut Driver<SerialPortLine>,
    deadline: Instant,
    mut done: impl FnMut(&Driver<SerialPortLine>) -> bool,
) -> Result<bool> {
    loop {
        let now = Instant::now();
        driver.poll(now).context("Serial line failed")?;
        if done(driver) {
            return Ok(true);
        }
        if now >= deadline {
            return Ok(false);
        }
        std::thread::sleep(SET_TICK);
    }
}

fn handle_set(
    config: &FileConfig,
    controller_config: ControllerConfig,
    command: Command,
    timeout: Duration,
) -> Result<()> {
    if matches!(command, Command::WriteFunction { .. }) && !confirm_function_write(&command)? {
        info!("Function write aborted by user.");
        return Ok(());
    }

    let deadline = Instant::now() + timeout;
    let mut driver = Driver::new(open_transport(config)?, controller_config);

    print!("Waiting for the indoor unit ... ");
    stdout().flush().context("Failed to flush stdout")?;
    if !poll_until(&mut driver, deadline, |driver| {
        driver.controller().is_initialized()
    })? {
        println!("failed.");
        bail!("Controller not initialized within {timeout:?}, is the indoor unit connected?");
    }
    println!("ready.");

    driver
        .controller_mut()
        .issue(command, Instant::now())
        .with_context(|| format!("Cannot {command}"))?;

    if !poll_until(&mut driver, deadline, |driver| {
        driver.controller().scheduler().is_empty()
    })? {
        bail!("No answer to '{command}' within {timeout:?}");
    }
    if let Some(reason) = driver.controller().state().last_failure {
        bail!("'{command}' failed: {reason}");
    }
    println!("Done: {command}.");

    if let Command::ReadFunction { function, unit } = command {
        let state = driver.controller().state();
        println!(
            "Function {function} of unit {unit} = {}",
            state.function_value
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = commandline::CliArgs::parse();

    // 1. Initialize logging as early as possible
    let _log_handle = logging_init(args.verbose.log_level_filter());
    info!(
        "Halcyon CLI started. Log level: {}",
        args.verbose.log_level_filter()
    );

    // 2. Decoding works without a configuration or serial port
    if let commandline::CliCommands::Decode { bytes, wire } = &args.command {
        return handle_decode(bytes, *wire);
    }

    // 3. Load and validate the configuration
    let config = load_config(&args)?;
    if args.command == commandline::CliCommands::CheckConfig {
        return handle_check_config(&config);
    }
    let controller_config = config.validate().context("Invalid configuration")?;

    // 4. Execute the command
    match &args.command {
        commandline::CliCommands::Run { tick, temperature } => {
            handle_run(&config, controller_config, *tick, *temperature)
        }
        commandline::CliCommands::Monitor { tick } => handle_monitor(&config, *tick),
        commandline::CliCommands::Set { timeout, action } => {
            handle_set(&config, controller_config, Command::from(action), *timeout)
        }
        commandline::CliCommands::Decode { .. } | commandline::CliCommands::CheckConfig => {
            unreachable!("Handled before opening the bus.")
        }
    }
}
