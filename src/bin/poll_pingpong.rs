//! Loopback ping-pong driven by the poll-set aggregation core.
//!
//! Mirrors the classic fabric poll example: post sends, then block on one
//! poll set covering the configured completion sources until both sides
//! finish.
//!
//! Run with:
//! ```bash
//! cargo run --bin poll_pingpong -- -t counter -s 4096 -i 100
//! ```

use clap::{Parser, ValueEnum};

use pollset::loopback::LoopbackFabric;
use pollset::{CompletionMode, Session, SessionConfig};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Completion reporting mechanism for a direction.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompletionType {
    /// Discrete completion queue entries.
    Queue,
    /// Monotonically increasing counter.
    Counter,
    /// No completion reporting.
    Off,
}

impl From<CompletionType> for CompletionMode {
    fn from(t: CompletionType) -> Self {
        match t {
            CompletionType::Queue => CompletionMode::Queue,
            CompletionType::Counter => CompletionMode::Counter,
            CompletionType::Off => CompletionMode::Disabled,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "poll_pingpong")]
#[command(about = "Loopback send/recv exchange driven by a poll set")]
struct Args {
    /// Completion type for both directions
    #[arg(short = 't', long, value_enum, default_value = "queue")]
    comp_type: CompletionType,

    /// Receive-side completion type (defaults to the send-side type)
    #[arg(long, value_enum)]
    recv_comp_type: Option<CompletionType>,

    /// Transfer size in bytes
    #[arg(short = 's', long, default_value = "1024")]
    size: usize,

    /// Expected completions per direction
    #[arg(short = 'i', long, default_value = "1")]
    iterations: u64,

    /// Number of sessions to run
    #[arg(short = 'r', long, default_value = "1")]
    runs: usize,
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let send_mode = CompletionMode::from(args.comp_type);
    let recv_mode = args
        .recv_comp_type
        .map(CompletionMode::from)
        .unwrap_or(send_mode);

    let config = SessionConfig::new()
        .with_send_mode(send_mode)
        .with_recv_mode(recv_mode)
        .with_transfer_size(args.size)
        .with_send_target(args.iterations)
        .with_recv_target(args.iterations);

    let mut fabric = LoopbackFabric::new();
    for run in 0..args.runs {
        match Session::run(&mut fabric, &config) {
            Ok(()) => println!("run {}: complete", run),
            Err(e) => {
                eprintln!("run {}: {}", run, e);
                std::process::exit(e.exit_code());
            }
        }
    }
}
