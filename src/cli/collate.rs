use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use lpcm::process::collate::CollatedFrame;
use lpcm::process::parse::ParsedFrame;

use super::command::{Cli, CollateArgs};
use super::stream::StreamPipeline;
use crate::index::FrameIndex;
use crate::input::InputReader;
use crate::timestamp::time_str;

fn create_path_with_extension(base_path: &Path, expected_ext: &str) -> PathBuf {
    match base_path.extension() {
        Some(existing_ext) if existing_ext == expected_ext => base_path.to_path_buf(),
        Some(_) => {
            let mut name = base_path.as_os_str().to_owned();
            name.push(".");
            name.push(expected_ext);
            PathBuf::from(name)
        }
        None => base_path.with_extension(expected_ext),
    }
}

fn create_output_paths(args: &CollateArgs) -> Result<(PathBuf, PathBuf)> {
    let is_pipe = args.input.to_string_lossy() == "-";

    let base_path = match &args.output_path {
        Some(base_path) => {
            log::info!("Output path specified: {}", base_path.display());
            base_path.clone()
        }
        None if is_pipe => bail!("--output-path is required when reading from stdin"),
        None => args.input.with_extension(""),
    };

    let data_path = create_path_with_extension(&base_path, "lpcm");
    let index_path = create_path_with_extension(&base_path, "yaml");

    if data_path == args.input || index_path == args.input {
        bail!("Output would overwrite the input file {}", args.input.display());
    }

    Ok((data_path, index_path))
}

pub fn cmd_collate(args: &CollateArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!(
        "Collating LPCM stream: {} (strict mode: {})",
        args.input.display(),
        cli.strict
    );

    let (data_path, index_path) = create_output_paths(args)?;

    let mut input_reader = InputReader::new(&args.input)?;
    let mut pipeline = StreamPipeline::new(&args.stream, cli);

    let mut writer = BufWriter::new(File::create(&data_path)?);
    let mut index = FrameIndex::new(pipeline.variant(), &data_path);
    let mut offset = 0u64;
    let mut last_time = 0u64;

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            pb.set_message("Collating frames...");
            Some(pb)
        }
        None => None,
    };

    let mut write_frame = |frame: &CollatedFrame, parsed: &ParsedFrame| -> Result<()> {
        if parsed.stream_parameters_changed {
            log::info!(
                "Frame {}: {} Hz, {}, {} channels",
                parsed.display_frame_index,
                parsed.sample_rate,
                parsed.header.word_size_1,
                parsed.header.channel_count
            );
        }

        writer.write_all(frame.as_ref())?;
        index.push(offset, frame, parsed);
        offset += frame.data.len() as u64;
        last_time = parsed.playback_time;

        if (parsed.display_frame_index + 1).is_multiple_of(100) {
            if let Some(ref pb) = pb {
                pb.set_message(format!(
                    "Collating frames...       {} ({})",
                    parsed.display_frame_index + 1,
                    time_str(parsed.playback_time as f64 / 1_000_000.0)
                ));
            }
        }

        Ok(())
    };

    input_reader.process_chunks(64 * 1024, |chunk| {
        pipeline.push_bytes(chunk, &mut write_frame)?;
        Ok(true)
    })?;
    pipeline.finish(&mut write_frame)?;

    writer.flush()?;

    if let Some(ref pb) = pb {
        pb.finish_and_clear();
    }

    std::fs::write(&index_path, index.serialize_index()?)?;

    log::info!(
        "Wrote {} frames ({offset} bytes, last frame at {}) to {}",
        index.frame_count(),
        time_str(last_time as f64 / 1_000_000.0),
        data_path.display()
    );
    log::info!("Frame index written to {}", index_path.display());

    if pipeline.invalid_private_data() > 0 {
        log::warn!(
            "{} packets carried an invalid private data area",
            pipeline.invalid_private_data()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_extensions() {
        assert_eq!(
            create_path_with_extension(Path::new("out/movie"), "lpcm"),
            PathBuf::from("out/movie.lpcm")
        );
        assert_eq!(
            create_path_with_extension(Path::new("movie.lpcm"), "lpcm"),
            PathBuf::from("movie.lpcm")
        );
        assert_eq!(
            create_path_with_extension(Path::new("movie.lpcm"), "yaml"),
            PathBuf::from("movie.lpcm.yaml")
        );
    }
}
