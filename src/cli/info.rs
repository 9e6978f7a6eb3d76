use std::collections::HashMap;

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::Level;
use serde::Serialize;

use super::command::{Cli, InfoArgs};
use crate::input::InputReader;
use dvdspu::process::{assemble::Assembler, parse::SpuParser};
use dvdspu::utils::errors::AssembleError;
use dvdspu::utils::timing::{Mtime, srt_time};

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing SPU stream: {}", args.input.display());

    let summary = analyze_stream(&args.input, cli, multi)?;

    if summary.packets == 0 {
        println!("No SPU packets found in the file.");
        println!("This doesn't appear to be a valid SPU stream.");
        return Ok(());
    }

    if args.yaml {
        print!("{}", serde_yaml_ng::to_string(&summary)?);
    } else {
        display_summary(&summary);
    }

    Ok(())
}

#[derive(Debug, Default, Serialize)]
struct StreamSummary {
    packets: usize,
    bytes: usize,
    decode_errors: usize,
    forced: usize,
    ephemeral: usize,
    first_start: Option<String>,
    last_stop: Option<String>,
    /// Most common subpicture dimensions, largest packet count first.
    dimensions: Vec<DimensionCount>,
}

#[derive(Debug, Serialize)]
struct DimensionCount {
    width: usize,
    height: usize,
    packets: usize,
}

fn analyze_stream(
    input_path: &std::path::Path,
    cli: &Cli,
    multi: Option<&MultiProgress>,
) -> Result<StreamSummary> {
    let mut input_reader = InputReader::new(input_path)?;
    let mut assembler = Assembler::default();
    let mut parser = SpuParser::default();

    // Configure fail level based on strict mode
    let fail_level = if cli.strict {
        Level::Warn
    } else {
        Level::Error
    };
    parser.set_fail_level(fail_level);

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            pb.set_message("Analyzing packets...");
            Some(pb)
        }
        None => None,
    };

    let mut summary = StreamSummary::default();
    let mut first_start: Option<Mtime> = None;
    let mut last_stop: Option<Mtime> = None;
    let mut dimensions: HashMap<(usize, usize), usize> = HashMap::new();

    input_reader.process_chunks(64 * 1024, |chunk| {
        summary.bytes += chunk.len();
        assembler.push_fragment(chunk, None);

        for packet_result in assembler.by_ref() {
            let packet = match packet_result {
                Ok(packet) => packet,
                Err(AssembleError::InsufficientData) => break,
                Err(e) => {
                    if cli.strict {
                        return Err(e.into());
                    }
                    summary.decode_errors += 1;
                    continue;
                }
            };

            summary.packets += 1;

            match parser.parse(&packet) {
                Ok(subpicture) => {
                    if subpicture.forced {
                        summary.forced += 1;
                    }
                    if subpicture.ephemeral {
                        summary.ephemeral += 1;
                    }
                    first_start.get_or_insert(subpicture.start_time);
                    last_stop = Some(last_stop.unwrap_or(Mtime::MIN).max(subpicture.stop_time));

                    let region = &subpicture.region;
                    *dimensions.entry((region.width, region.height)).or_default() += 1;
                }
                Err(e) => {
                    if cli.strict {
                        return Err(e);
                    }
                    summary.decode_errors += 1;
                    log::warn!("Parse error at packet {}: {e}", summary.packets);
                }
            }

            if summary.packets.is_multiple_of(100) {
                if let Some(ref pb) = pb {
                    pb.set_message(format!("Analyzing packets...       {}", summary.packets));
                    pb.tick();
                }
            }
        }

        Ok(true)
    })?;

    if let Some(ref pb) = pb {
        pb.finish_and_clear();
    }

    summary.first_start = first_start.map(srt_time);
    summary.last_stop = last_stop.map(srt_time);

    let mut counts: Vec<_> = dimensions.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    summary.dimensions = counts
        .into_iter()
        .take(5)
        .map(|((width, height), packets)| DimensionCount {
            width,
            height,
            packets,
        })
        .collect();

    Ok(summary)
}

fn display_summary(summary: &StreamSummary) {
    println!();
    println!("SPU Stream Information");
    println!("======================");
    println!();

    println!("Stream Information");
    println!("  Packets                   {}", summary.packets);

    let size_mb = summary.bytes as f64 / 1_000_000.0;
    println!(
        "  Size                      {size_mb:.2} MB ({} bytes)",
        summary.bytes
    );
    println!("  Decode errors             {}", summary.decode_errors);
    println!("  Forced subpictures        {}", summary.forced);
    println!("  Ephemeral subpictures     {}", summary.ephemeral);

    if let (Some(first), Some(last)) = (&summary.first_start, &summary.last_stop) {
        println!("  Time span                 {first} --> {last}");
    }
    println!();

    if !summary.dimensions.is_empty() {
        println!("Subpicture Dimensions");
        for entry in &summary.dimensions {
            println!(
                "  {:>4} x {:<4}               {} packets",
                entry.width, entry.height, entry.packets
            );
        }
        println!();
    }
}
