use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use gcodestream::{
    init_logging, list_ports, CommandSource, ConnectionDriver, ControllerConfig, ControllerListener,
    ControllerStatus, FirmwareType, GcodeCommand, MessageLevel, StreamingController,
    StringStreamReader,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "gcodestream", version, about = "Stream G-code to a CNC controller.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List serial ports that look like CNC controllers
    Ports,
    /// Stream a program file
    Send {
        /// Serial port (defaults to the configured port)
        #[arg(short, long)]
        port: Option<String>,
        /// Baud rate (defaults to the configured rate)
        #[arg(short, long)]
        baud: Option<u32>,
        /// Firmware protocol: g2core or grbl
        #[arg(short, long, default_value = "g2core")]
        firmware: FirmwareType,
        /// Path to a TOML or JSON config file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// G-code program to send
        file: PathBuf,
    },
}

enum Outcome {
    Ready,
    Finished(Duration),
    Canceled,
}

/// Prints stream progress and reports how the stream ended
struct ProgressPrinter {
    total: usize,
    completed: AtomicUsize,
    saw_status: AtomicBool,
    outcome: mpsc::Sender<Outcome>,
}

impl ProgressPrinter {
    fn report(&self, outcome: Outcome) {
        // The receiver is gone once `send` has returned.
        if self.outcome.send(outcome).is_err() {
            tracing::debug!("Dropping stream outcome, nobody is waiting");
        }
    }
}

impl ControllerListener for ProgressPrinter {
    fn on_status_changed(&self, _status: &ControllerStatus) {
        if !self.saw_status.swap(true, Ordering::SeqCst) {
            self.report(Outcome::Ready);
        }
    }

    fn on_command_complete(&self, command: &GcodeCommand) {
        if command.is_generated() {
            return;
        }
        let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        println!("[{}/{}] {}", done, self.total, command.command());
    }

    fn on_message(&self, level: MessageLevel, message: &str) {
        if level != MessageLevel::Info {
            eprintln!("{}: {}", level, message);
        }
    }

    fn on_stream_complete(&self, duration: Duration) {
        self.report(Outcome::Finished(duration));
    }

    fn on_stream_canceled(&self) {
        self.report(Outcome::Canceled);
    }
}

fn print_ports() -> anyhow::Result<()> {
    let ports = list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}\t{}", port.port_name, port.description);
    }
    Ok(())
}

fn send(
    port: Option<String>,
    baud: Option<u32>,
    firmware: FirmwareType,
    config: Option<PathBuf>,
    file: PathBuf,
) -> anyhow::Result<()> {
    let config = match config {
        Some(path) => ControllerConfig::load(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ControllerConfig::default(),
    };
    let Some(port) = port.or_else(|| config.connection.port.clone()) else {
        bail!("no port given and none configured");
    };
    let baud = baud.unwrap_or(config.connection.baud_rate);

    let program = std::fs::read_to_string(&file)
        .with_context(|| format!("reading {}", file.display()))?;
    let source = StringStreamReader::new(&program);

    let (tx, rx) = mpsc::channel();
    let printer = Arc::new(ProgressPrinter {
        total: source.size(),
        completed: AtomicUsize::new(0),
        saw_status: AtomicBool::new(false),
        outcome: tx,
    });

    let controller = StreamingController::for_firmware(firmware, ConnectionDriver::Serial, config);
    controller.add_listener(printer);
    controller.open_comm_port(ConnectionDriver::Serial, &port, baud)?;

    // Give the firmware a moment to boot and report in.
    match rx.recv_timeout(Duration::from_secs(2)) {
        Ok(Outcome::Ready) => {}
        _ => tracing::warn!("No status from {} yet, streaming anyway", port),
    }

    controller.queue_stream(Box::new(source))?;
    controller.begin_streaming()?;

    let result = loop {
        match rx.recv() {
            Ok(Outcome::Ready) => continue,
            Ok(Outcome::Finished(duration)) => {
                println!("Finished in {:.1}s", duration.as_secs_f64());
                break Ok(());
            }
            Ok(Outcome::Canceled) => break Err(anyhow::anyhow!("stream was cancelled")),
            Err(_) => break Err(anyhow::anyhow!("controller went away")),
        }
    };

    controller.close_comm_port()?;
    result
}

fn main() -> anyhow::Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Ports => print_ports(),
        Commands::Send {
            port,
            baud,
            firmware,
            config,
            file,
        } => send(port, baud, firmware, config, file),
    }
}
