//! xdna-trace: decode AMD XDNA NPU hardware trace captures into
//! visualizer-consumable trace-event JSON.

use std::env;
use std::fmt::Write as _;
use std::fs;

use anyhow::{bail, Context, Result};

use xdna_trace::buffers::TraceBuffers;
use xdna_trace::frames::{decode_frames, frame_occurrence_count};
use xdna_trace::packet::parse_packets;
use xdna_trace::perfetto::generate_trace_events;
use xdna_trace::timeline::{construct_timeline, trim_trailing_stalls};
use xdna_trace::words::parse_trace_words;

/// Parsed command-line options.
struct Options {
    input: String,
    json: String,
    events: Vec<String>,
    stall_label: String,
    debug: bool,
}

fn print_usage() {
    println!("Usage: xdna-trace --input <file> [options]");
    println!();
    println!("Options:");
    println!("  --input <file>         Text file with one trace word per token");
    println!("  --events <l1> <l2> ..  Event labels in hardware slot order, e.g.");
    println!("                         INSTR_VECTOR KERNEL_START KERNEL_DONE");
    println!("                         PORT_RUNNING_0 PORT_RUNNING_1 LOCK_STALL");
    println!("                         LOCK_ACQUIRE LOCK_RELEASE");
    println!("  --json <file>          Output trace-event JSON file (default trace.json)");
    println!("  --stall-label <label>  Label treated as idle padding at the end of");
    println!("                         a timeline (default LOCK_STALL)");
    println!("  --debug                Print frame statistics and write per-source");
    println!("                         timeline logs");
}

fn parse_args(args: &[String]) -> Result<Options> {
    let mut input = None;
    let mut json = String::from("trace.json");
    let mut stall_label = String::from("LOCK_STALL");
    let mut events = Vec::new();
    let mut debug = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--input" => {
                i += 1;
                input = Some(
                    args.get(i)
                        .cloned()
                        .context("--input requires a file name")?,
                );
            }
            "--json" => {
                i += 1;
                json = args
                    .get(i)
                    .cloned()
                    .context("--json requires a file name")?;
            }
            "--stall-label" => {
                i += 1;
                stall_label = args
                    .get(i)
                    .cloned()
                    .context("--stall-label requires a label")?;
            }
            "--events" => {
                while i + 1 < args.len() && !args[i + 1].starts_with("--") {
                    i += 1;
                    events.push(args[i].clone());
                }
            }
            "--debug" => debug = true,
            other => bail!("unknown argument: {other}"),
        }
        i += 1;
    }

    let input = input.context("--input is required")?;
    Ok(Options {
        input,
        json,
        events,
        stall_label,
        debug,
    })
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        return Ok(());
    }
    let options = parse_args(&args)?;

    let text = fs::read_to_string(&options.input)
        .with_context(|| format!("reading trace file {}", options.input))?;
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let trace_words = parse_trace_words(&tokens)?;
    let packets = parse_packets(&trace_words)?;
    log::info!(
        "parsed {} packets from {} trace words",
        packets.len(),
        trace_words.len()
    );

    let mut buffers = TraceBuffers::new();
    for packet in &packets {
        buffers.add(packet);
    }

    if options.debug {
        println!("Processing tracefile: {}", options.input);
        println!("Event list {:?}", options.events);
        dump_debug_logs(&buffers, &options)?;
    }

    let records = generate_trace_events(&buffers, &options.events, &options.stall_label)?;
    let json = serde_json::to_string_pretty(&records)?;
    fs::write(&options.json, json)
        .with_context(|| format!("writing trace events to {}", options.json))?;
    println!(
        "Wrote {} trace events from {} sources to {}",
        records.len(),
        buffers.len(),
        options.json
    );

    Ok(())
}

/// Per-source debug side channel: frame statistics on stdout, frame
/// listing and timeline dump in `<pid>_timeline.log`.
fn dump_debug_logs(buffers: &TraceBuffers, options: &Options) -> Result<()> {
    for (ident, source_words) in buffers.iter() {
        println!("Trace found for {ident}");

        let frames = match decode_frames(source_words, &options.events) {
            Ok(frames) => frames,
            Err(err) => {
                println!("  decode failed: {err}");
                continue;
            }
        };
        for (name, count) in frame_occurrence_count(&frames) {
            println!("{name}: {count}");
        }

        let mut dump = String::new();
        for frame in &frames {
            writeln!(dump, "{frame:?}")?;
        }
        dump.push_str("\n\n");

        let mut timeline = construct_timeline(&frames);
        trim_trailing_stalls(&mut timeline, &options.stall_label);
        for interval in &timeline {
            let labels: Vec<String> = interval.labels.iter().map(ToString::to_string).collect();
            writeln!(dump, "{labels:?} [{}, {}]", interval.start, interval.end)?;
        }

        let log_path = format!("{}_timeline.log", ident.derived_pid());
        fs::write(&log_path, dump)
            .with_context(|| format!("writing timeline log {log_path}"))?;
        println!("Wrote frame listing and timeline to {log_path}");
    }
    Ok(())
}
