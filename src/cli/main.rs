use clap::Parser;
use log::{info, warn, LevelFilter};
use simplelog::{Config, WriteLogger};
use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use iobridge::{host_dispatcher, Direction, HostDispatcher, MediaMonitor, Opcode};

/// Bench console for the expansion-bus I/O subsystem. Wires the virtual
/// devices to a directory standing in for the SD card and lets bus accesses
/// be issued interactively, one opcode at a time.
#[derive(Parser)]
#[command(version, about, max_term_width = 100)]
struct Args {
    /// Directory acting as the SD card root.
    #[arg(value_name = "SD_ROOT", default_value = ".")]
    sd_root: PathBuf,

    /// Disk set selecting the DS<set>Nxx.DSK image family.
    #[arg(short, long, default_value_t = 0)]
    disk_set: u8,

    /// If set, a debug log will be written to the given path.
    #[arg(short, long, value_name = "LOG_PATH")]
    log: Option<PathBuf>,

    /// Set the log level. Has no effect without specifying --log as well.
    #[arg(short = 'L', long, default_value = "debug")]
    log_level: LevelFilter,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Some(log_path) = &args.log {
        let log_file = match File::create(log_path) {
            Ok(file) => file,
            Err(e) => {
                eprintln!("Failed to create log file '{}': {}", log_path.display(), e);
                return ExitCode::FAILURE;
            }
        };
        WriteLogger::init(args.log_level, Config::default(), log_file)
            .expect("logger was already initialised");
    }

    if args.disk_set > 9 {
        eprintln!("Disk set must be in the range 0-9.");
        return ExitCode::FAILURE;
    }

    let media = match MediaMonitor::new(&args.sd_root) {
        Ok(monitor) => Some(monitor),
        Err(e) => {
            warn!("Media monitoring unavailable: {}.", e);
            None
        }
    };
    let mut bus = host_dispatcher(
        &args.sd_root,
        args.disk_set,
        media.as_ref().map(|m| m.state()),
    );

    info!(
        "Subsystem up over '{}', disk set {}.",
        args.sd_root.display(),
        args.disk_set
    );
    println!("iobridge console; 'help' lists commands.");
    match console(&mut bus) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Console I/O failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn console(bus: &mut HostDispatcher) -> io::Result<()> {
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(());
        }
        let mut words = line.split_whitespace();
        match words.next() {
            None => {}
            Some("q") | Some("quit") | Some("exit") => return Ok(()),
            Some("help") => print_help(),
            Some("r") => read_command(bus, &mut words),
            Some("w") => write_command(bus, &mut words),
            Some(other) => println!("Unknown command '{}'; try 'help'.", other),
        }
    }
}

fn print_help() {
    println!("Commands (all numbers hexadecimal):");
    println!("  r <opcode> [count]     issue <count> read accesses (default 1)");
    println!("  w <opcode> <byte>...   issue one write access per data byte");
    println!("  q                      quit");
    println!("Example: 'w 0A 25' then 'w 0A 00' selects track 0x25.");
}

fn read_command<'a>(bus: &mut HostDispatcher, words: &mut impl Iterator<Item = &'a str>) {
    let Some(opcode) = words.next().and_then(parse_hex) else {
        println!("Usage: r <opcode> [count]");
        return;
    };
    let count = match words.next() {
        Some(word) => match usize::from_str_radix(word, 16) {
            Ok(count) => count,
            Err(_) => {
                println!("Bad count '{}'.", word);
                return;
            }
        },
        None => 1,
    };

    let mut continuation = Opcode::NoOp;
    let mut bytes = Vec::with_capacity(count);
    for _ in 0..count {
        let mut byte = 0;
        continuation = bus.handle(opcode, Direction::Read, &mut byte);
        bytes.push(byte);
    }
    let rendered: Vec<String> = bytes.iter().map(|b| format!("{:02X}", b)).collect();
    println!("{}  {}", rendered.join(" "), describe(continuation));
}

fn write_command<'a>(bus: &mut HostDispatcher, words: &mut impl Iterator<Item = &'a str>) {
    let Some(opcode) = words.next().and_then(parse_hex) else {
        println!("Usage: w <opcode> <byte>...");
        return;
    };
    let mut continuation = Opcode::NoOp;
    let mut any = false;
    for word in words {
        let Some(mut byte) = parse_hex(word) else {
            println!("Bad data byte '{}'.", word);
            return;
        };
        any = true;
        continuation = bus.handle(opcode, Direction::Write, &mut byte);
    }
    if !any {
        println!("Usage: w <opcode> <byte>...");
        return;
    }
    println!("{}", describe(continuation));
}

fn describe(continuation: Opcode) -> String {
    match continuation {
        Opcode::NoOp => "[idle]".to_string(),
        pending => format!("[0x{:02X} pending]", pending as u8),
    }
}

fn parse_hex(word: &str) -> Option<u8> {
    let trimmed = word.trim_start_matches("0x").trim_start_matches("0X");
    u8::from_str_radix(trimmed, 16).ok()
}
