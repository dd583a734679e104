use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use lpcm::process::collate::CollatedFrame;
use lpcm::process::parse::ParsedFrame;
use lpcm::structs::header::ParsedFrameHeader;
use lpcm::structs::variant::{StreamVariant, WordSize};
use lpcm::utils::timing::samples_to_us;

use super::command::{Cli, InfoArgs};
use super::stream::StreamPipeline;
use crate::input::InputReader;
use crate::timestamp::time_str;

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing LPCM stream: {}", args.input.display());

    let mut input_reader = InputReader::new(&args.input)?;
    let mut pipeline = StreamPipeline::new(&args.stream, cli);
    let mut context = AnalysisContext::new(multi)?;

    input_reader.process_chunks(64 * 1024, |chunk| {
        pipeline.push_bytes(chunk, |frame, parsed| context.process_frame(frame, parsed))?;
        Ok(true)
    })?;
    pipeline.finish(|frame, parsed| context.process_frame(frame, parsed))?;

    context.finish();
    context.total_bytes = input_reader.bytes_read();

    if context.frames == 0 {
        println!("No {} frames found in the input.", pipeline.variant());
        println!(
            "{} PES packets matched the stream selection.",
            pipeline.packets()
        );
        return Ok(());
    }

    display_summary(&context, &pipeline);

    Ok(())
}

#[derive(Default)]
struct AnalysisContext {
    pb: Option<ProgressBar>,
    total_bytes: u64,
    frames: usize,
    access_units: u64,
    samples: u64,
    audio_bytes: u64,
    duration_us: u64,
    parameter_sets: usize,
    first_time: Option<u64>,
}

impl AnalysisContext {
    fn new(multi: Option<&MultiProgress>) -> Result<Self> {
        let mut context = Self::default();

        // Create progress bar for frame counting if enabled
        if let Some(multi) = multi {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            pb.set_message("Analyzing frames...");
            context.pb = Some(pb);
        }

        Ok(context)
    }

    fn process_frame(&mut self, frame: &CollatedFrame, parsed: &ParsedFrame) -> Result<()> {
        if parsed.stream_parameters_changed {
            self.parameter_sets += 1;
            self.suspend(|| display_parameters(parsed));
        }

        self.first_time.get_or_insert(parsed.playback_time);
        self.frames += 1;
        self.access_units += frame.access_units as u64;
        self.samples += parsed.sample_count as u64;
        self.audio_bytes += parsed.header.frame_length_bytes as u64;
        self.duration_us += samples_to_us(parsed.sample_count as u64, parsed.sample_rate);

        if self.frames.is_multiple_of(100) {
            if let Some(ref pb) = self.pb {
                pb.set_message(format!("Analyzing frames...       {}", self.frames));
                pb.tick();
            }
        }

        Ok(())
    }

    /// Temporarily pause progress bar for clean output
    fn suspend<F: FnOnce()>(&self, f: F) {
        match self.pb {
            Some(ref pb) => pb.suspend(f),
            None => f(),
        }
    }

    fn finish(&self) {
        if let Some(ref pb) = self.pb {
            pb.finish_and_clear();
        }
    }
}

fn display_parameters(parsed: &ParsedFrame) {
    let header = &parsed.header;

    println!();
    println!(
        "{} Stream Parameters (frame {}, {})",
        header.variant,
        parsed.display_frame_index,
        time_str(parsed.playback_time as f64 / 1_000_000.0)
    );
    println!("==========================================");

    if header.variant != StreamVariant::BdHdmv && header.variant != StreamVariant::SpdifIn {
        println!("  Sub-stream id             {:#04X}", header.sub_stream_id);
    }
    println!("  Sampling rate             {} Hz", parsed.sample_rate);
    println!("  Word size                 {}", header.word_size_1);
    println!("  Channels                  {}", header.channel_count);
    println!("  Channel assignment        {}", header.channel_assignment);

    if header.variant == StreamVariant::DvdAudio && header.word_size_2 != WordSize::None {
        display_group_2(header);
    }

    match header.variant {
        StreamVariant::DvdVideo | StreamVariant::DvdAudio | StreamVariant::HdDvd => {
            println!("  Emphasis                  {}", header.emphasis_flag);
            println!("  Mute                      {}", header.mute_flag);
            println!("  Dynamic range control     {:#04X}", header.drc_code);
        }
        StreamVariant::BdHdmv | StreamVariant::SpdifIn => {}
    }

    println!(
        "  Access unit               {} samples, {} bytes",
        header.access_unit_samples, header.access_unit_size_bytes
    );

    if let Some(spdif) = &header.spdifin {
        println!("  Channel allocation        {:#04X}", spdif.organisation);
        println!("  Layout                    {}", spdif.layout);
        println!("  Down-mix inhibit          {}", spdif.down_mix_inhibit);
        println!("  Level shift               {} dB", spdif.level_shift);
        println!("  LFE playback level        {}", spdif.lfe_playback_level);
    }

    println!();
}

fn display_group_2(header: &ParsedFrameHeader) {
    println!("  Group 2 word size         {}", header.word_size_2);
    println!("  Group 2 sampling rate     {}", header.sampling_freq_2);
    println!("  Group 2 bit shift         {}", header.bit_shift_channel_2);
}

fn display_summary(context: &AnalysisContext, pipeline: &StreamPipeline) {
    println!("Analysis Summary");
    println!("  PES packets               {}", pipeline.packets());
    println!("  Frames collated           {}", context.frames);
    println!("  Access units              {}", context.access_units);
    println!("  Samples per channel       {}", context.samples);
    println!("  Parameter sets            {}", context.parameter_sets);

    // Format file size
    let size_mb = context.total_bytes as f64 / 1_000_000.0;
    println!(
        "  Size                      {size_mb:.2} MB ({} bytes)",
        context.total_bytes
    );

    let duration_secs = context.duration_us as f64 / 1_000_000.0;
    println!("  Duration                  {}", time_str(duration_secs));

    if let Some(start) = context.first_time {
        let start_secs = start as f64 / 1_000_000.0;
        println!("  Start time                {}", time_str(start_secs));
    }

    // Calculate average data rate
    if duration_secs > 0.0 {
        let avg_data_rate_kbps = (context.audio_bytes as f64 * 8.0) / (duration_secs * 1000.0);
        println!("  Average data rate         {avg_data_rate_kbps:.1} kbps");
    }

    println!("  Invalid private data      {}", pipeline.invalid_private_data());
    if pipeline.dropped_frames() > 0 {
        println!("  Dropped frames            {}", pipeline.dropped_frames());
    }
    if pipeline.bytes_skipped() > 0 {
        println!("  Bytes skipped             {}", pipeline.bytes_skipped());
    }

    println!();
}
