//! Offline segmentation tool: run the detection core over a WAV file and
//! write each extracted utterance out as its own WAV, plus a JSON report.
//!
//! Useful for tuning thresholds against recorded material without a
//! microphone in the loop.

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "auris_core=info".parse().unwrap()),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("segment failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    use auris_core::{
        audio::resample::RateAdapter,
        buffering::frame::FrameSlicer,
        monitor::detector::{DetectorOutcome, SpeechDetector},
        vad::VadEngine,
        EndReason, EnergyVad, MonitorConfig,
    };
    use serde::Serialize;
    use std::path::{Path, PathBuf};

    #[derive(Debug)]
    struct Args {
        input: PathBuf,
        out_dir: PathBuf,
        threshold: f32,
        report: Option<PathBuf>,
    }

    #[derive(Debug, Clone, Serialize)]
    struct SegmentRow {
        index: usize,
        file: String,
        samples: usize,
        duration_secs: f64,
        reason: EndReason,
    }

    #[derive(Debug, Serialize)]
    struct Report {
        input: String,
        input_sample_rate: u32,
        input_duration_secs: f64,
        engine_rate: u32,
        segments_emitted: usize,
        segments_discarded: usize,
        segments: Vec<SegmentRow>,
    }

    fn parse_args() -> Result<Args, String> {
        let mut input: Option<PathBuf> = None;
        let mut out_dir = PathBuf::from("segments");
        let mut threshold = auris_core::vad::energy::DEFAULT_THRESHOLD;
        let mut report: Option<PathBuf> = None;

        let mut it = std::env::args().skip(1);
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--input" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --input".into());
                    };
                    input = Some(PathBuf::from(v));
                }
                "--out-dir" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --out-dir".into());
                    };
                    out_dir = PathBuf::from(v);
                }
                "--threshold" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --threshold".into());
                    };
                    threshold = v
                        .parse::<f32>()
                        .map_err(|_| "invalid value for --threshold".to_string())?
                        .clamp(0.0, 1.0);
                }
                "--report" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --report".into());
                    };
                    report = Some(PathBuf::from(v));
                }
                "--help" | "-h" => {
                    println!(
                        "Usage: cargo run -p auris-core --bin segment -- \\
  --input <file.wav> [--out-dir <dir>] [--threshold <0..1>] [--report <file.json>]"
                    );
                    std::process::exit(0);
                }
                other => {
                    return Err(format!("unknown argument: {other}"));
                }
            }
        }

        let Some(input) = input else {
            return Err("--input <file.wav> is required".into());
        };
        Ok(Args {
            input,
            out_dir,
            threshold,
            report,
        })
    }

    fn read_wav_mono_f32(path: &Path) -> Result<(Vec<f32>, u32), String> {
        let mut reader = hound::WavReader::open(path).map_err(|e| e.to_string())?;
        let spec = reader.spec();
        let channels = usize::from(spec.channels.max(1));

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .map(|s| s.map_err(|e| e.to_string()))
                .collect::<Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => {
                if spec.bits_per_sample <= 16 {
                    reader
                        .samples::<i16>()
                        .map(|s| {
                            s.map(|v| (v as f32) / (i16::MAX as f32))
                                .map_err(|e| e.to_string())
                        })
                        .collect::<Result<Vec<_>, _>>()?
                } else {
                    let max = ((1_i64 << (spec.bits_per_sample - 1)) - 1) as f32;
                    reader
                        .samples::<i32>()
                        .map(|s| s.map(|v| (v as f32) / max).map_err(|e| e.to_string()))
                        .collect::<Result<Vec<_>, _>>()?
                }
            }
        };

        if channels == 1 {
            return Ok((interleaved, spec.sample_rate));
        }

        let mut mono = Vec::with_capacity(interleaved.len() / channels);
        for frame in interleaved.chunks(channels) {
            let sum = frame.iter().copied().sum::<f32>();
            mono.push(sum / channels as f32);
        }
        Ok((mono, spec.sample_rate))
    }

    fn write_wav(path: &Path, samples: &[i16], sample_rate: u32) -> Result<(), String> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).map_err(|e| e.to_string())?;
        for &sample in samples {
            writer.write_sample(sample).map_err(|e| e.to_string())?;
        }
        writer.finalize().map_err(|e| e.to_string())
    }

    const FEED_CHUNK: usize = 960;

    let args = parse_args()?;
    let (input_samples, input_rate) = read_wav_mono_f32(&args.input)?;
    if input_samples.is_empty() {
        return Err(format!("no samples in {}", args.input.display()));
    }
    let input_duration_secs = input_samples.len() as f64 / f64::from(input_rate);

    let mut engine = EnergyVad::new(args.threshold);
    let frame_length = engine.frame_length();
    let engine_rate = engine.sample_rate();
    let config = MonitorConfig::default();
    let mut detector = SpeechDetector::new(&config);
    let mut resampler =
        RateAdapter::new(input_rate, engine_rate, FEED_CHUNK).map_err(|e| e.to_string())?;
    let mut slicer = FrameSlicer::new(frame_length, engine_rate);

    println!(
        "Segmenting {} ({:.1} s at {} Hz, threshold {})",
        args.input.display(),
        input_duration_secs,
        input_rate,
        args.threshold
    );

    std::fs::create_dir_all(&args.out_dir).map_err(|e| e.to_string())?;

    let mut emitted: Vec<(Vec<i16>, EndReason)> = Vec::new();
    let mut discarded = 0usize;

    let mut handle = |outcome: DetectorOutcome| match outcome {
        DetectorOutcome::SegmentReady { samples, reason } => emitted.push((samples, reason)),
        DetectorOutcome::SegmentDiscarded { .. } => discarded += 1,
        DetectorOutcome::Quiet | DetectorOutcome::SpeechStarted => {}
    };

    for chunk in input_samples.chunks(FEED_CHUNK) {
        let resampled = resampler.process(chunk);
        if resampled.is_empty() {
            continue;
        }
        for frame in slicer.push(&resampled) {
            let raw_speech = engine
                .process(&frame)
                .map_err(|e| format!("engine error: {e}"))?;
            handle(detector.advance(&frame, raw_speech));
        }
    }

    // End of stream counts as an explicit stop for an open episode.
    if let Some(outcome) = detector.force_end(EndReason::Manual) {
        handle(outcome);
    }

    let mut rows = Vec::new();
    for (index, (samples, reason)) in emitted.iter().enumerate() {
        let file = args.out_dir.join(format!("segment-{index:03}.wav"));
        write_wav(&file, samples, engine_rate)?;
        let duration_secs = samples.len() as f64 / f64::from(engine_rate);
        println!(
            "  segment-{index:03}.wav  {:.2} s  ({reason:?})",
            duration_secs
        );
        rows.push(SegmentRow {
            index,
            file: file.display().to_string(),
            samples: samples.len(),
            duration_secs,
            reason: *reason,
        });
    }

    let report = Report {
        input: args.input.display().to_string(),
        input_sample_rate: input_rate,
        input_duration_secs,
        engine_rate,
        segments_emitted: rows.len(),
        segments_discarded: discarded,
        segments: rows,
    };

    println!(
        "Done. emitted={} discarded={}",
        report.segments_emitted, report.segments_discarded
    );

    let json = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
    if let Some(out) = args.report {
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        std::fs::write(&out, json).map_err(|e| e.to_string())?;
        println!("Wrote segmentation report: {}", out.display());
    } else {
        println!("{json}");
    }

    Ok(())
}
