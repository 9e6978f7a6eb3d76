use std::path::PathBuf;

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::Level;

use super::command::{Cli, ExtractArgs};
use crate::input::InputReader;
use dvdspu::filter::dump::SubtitleLog;
use dvdspu::filter::ocr::TextExtractor;
use dvdspu::filter::words::WordFilter;
use dvdspu::process::{assemble::Assembler, parse::SpuParser};
use dvdspu::utils::errors::AssembleError;
use dvdspu::utils::timing::srt_time;

pub fn cmd_extract(args: &ExtractArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Extracting subtitles from: {}", args.input.display());

    let output_path = args
        .output_path
        .clone()
        .unwrap_or_else(|| srt_path(&args.input));
    let mut subtitle_log = SubtitleLog::create(&output_path)?;

    let words = args
        .words
        .as_deref()
        .map(WordFilter::load)
        .unwrap_or_default();

    let mut input_reader = InputReader::new(&args.input)?;
    let mut assembler = Assembler::default();
    let mut parser = SpuParser::default();
    // No recognizer is wired in by default; dump entries then carry
    // the no-text sentinel and only the timing is useful.
    let mut extractor = TextExtractor::default();

    let fail_level = if cli.strict {
        Level::Warn
    } else {
        Level::Error
    };
    parser.set_fail_level(fail_level);
    if args.disable_transparency {
        parser.set_disable_transparency(true);
    }

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            pb.set_message("Extracting subtitles...");
            Some(pb)
        }
        None => None,
    };

    let mut subtitles = 0usize;
    let mut decode_errors = 0usize;
    let mut deny_hits = 0usize;

    input_reader.process_chunks(64 * 1024, |chunk| {
        assembler.push_fragment(chunk, None);

        for packet_result in assembler.by_ref() {
            let packet = match packet_result {
                Ok(packet) => packet,
                Err(AssembleError::InsufficientData) => break,
                Err(e) => {
                    if cli.strict {
                        return Err(e.into());
                    }
                    decode_errors += 1;
                    continue;
                }
            };

            let subpicture = match parser.parse(&packet) {
                Ok(subpicture) => subpicture,
                Err(e) => {
                    if cli.strict {
                        return Err(e);
                    }
                    decode_errors += 1;
                    log::warn!("Parse error: {e}");
                    continue;
                }
            };

            let text = extractor.extract(&subpicture.region);
            subtitle_log.append(&subpicture, &text)?;
            subtitles += 1;

            if words.contains_banned(&text) {
                deny_hits += 1;
                log::info!(
                    "deny-list match at {} --> {}: {text}",
                    srt_time(subpicture.start_time),
                    srt_time(subpicture.stop_time),
                );
            }

            if subtitles.is_multiple_of(100) {
                if let Some(ref pb) = pb {
                    pb.set_message(format!("Extracting subtitles...   {subtitles}"));
                    pb.tick();
                }
            }
        }

        Ok(true)
    })?;

    if let Some(ref pb) = pb {
        pb.finish_and_clear();
    }

    println!("Extraction Summary");
    println!("  Subtitles written         {subtitles}");
    println!("  Decode errors             {decode_errors}");
    if !words.is_empty() {
        println!("  Deny-list matches         {deny_hits}");
    }
    println!("  Output                    {}", output_path.display());
    println!();

    Ok(())
}

fn srt_path(input: &std::path::Path) -> PathBuf {
    let mut path = input.to_path_buf();
    path.set_extension("srt");
    path
}
