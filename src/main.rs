use std::io::BufRead;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use rusty_spectrometer::acquisition::{ImageSequenceSource, MeasurementConfig, MeasurementOutcome, Spectrometer};
use rusty_spectrometer::data::export::{write_spectrum1d, ExportOutcome};
use rusty_spectrometer::data::loader;
use rusty_spectrometer::data::reduce::{ChannelOrder, ReduceConfig, Roi};
use rusty_spectrometer::hardware::{find_serial_device, Emitter, SerialLightSource};
use rusty_spectrometer::{Spectrum, SpectrumKind};

/// Parse a ROI given as "row,col,height,width".
fn parse_roi(s: &str) -> Result<Roi, String> {
    let parts: Vec<usize> = s
        .split(',')
        .map(|p| p.trim().parse::<usize>())
        .collect::<Result<_, _>>()
        .map_err(|_| "ROI values must be non-negative integers".to_string())?;
    match parts.as_slice() {
        &[row, col, height, width] => Ok(Roi::new(row, col, height, width)),
        _ => Err("ROI must be in format 'row,col,height,width'".to_string()),
    }
}

fn parse_channel_order(s: &str) -> Result<ChannelOrder, String> {
    match s {
        "bgr" => Ok(ChannelOrder::Bgr),
        "rgb" => Ok(ChannelOrder::Rgb),
        other => Err(format!("unknown channel order '{other}' (bgr or rgb)")),
    }
}

#[derive(Parser, Debug)]
#[command(name = "rusty-spectrometer", about = "Webcam spectrometer acquisition and reduction")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Accumulate frames from a directory of captured images into a spectrum file
    Measure {
        /// Directory with frame images (.png/.jpg), read in name order
        #[arg(long)]
        frames_dir: PathBuf,

        /// background, spectrum or unspecified
        #[arg(long, default_value = "spectrum")]
        kind: String,

        /// Measurement settings as JSON; overrides the flags below
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, default_value_t = 10)]
        num_frames: usize,

        #[arg(long, default_value_t = 0)]
        num_dropped_frames: usize,

        #[arg(long, default_value = "spectrum")]
        name: String,

        /// Log every frame and abort when "q" is entered on stdin
        #[arg(long, default_value_t = false)]
        show: bool,

        /// Serial device of the light source ("auto" to probe /dev/ttyACM*)
        #[arg(long)]
        light: Option<String>,

        /// Output file (default: <name>.spectrum.json)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Reduce a spectrum or raw image to a 1D spectrum
    Process {
        input: PathBuf,

        #[arg(long, short)]
        threshold: u32,

        /// Region of interest "row,col,height,width"
        #[arg(long, value_parser = parse_roi)]
        roi: Option<Roi>,

        #[arg(long, default_value = "bgr", value_parser = parse_channel_order)]
        channel_order: ChannelOrder,

        /// 1D export target; format from extension (.csv, .xy, .dat, .parquet)
        #[arg(long)]
        export: Vec<PathBuf>,

        /// Save the processed spectrum
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Subtract a background spectrum or a constant
    Subtract {
        input: PathBuf,

        /// Spectrum file or number
        operand: String,

        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Divide the accumulated data by its frame count
    Average {
        input: PathBuf,

        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Print metadata and raw data statistics
    Info { input: PathBuf },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Measure {
            frames_dir,
            kind,
            config,
            num_frames,
            num_dropped_frames,
            name,
            show,
            light,
            output,
        } => {
            let kind: SpectrumKind = kind.parse()?;
            let config = match config {
                Some(path) => MeasurementConfig::from_json_file(&path)
                    .with_context(|| format!("reading measurement config {}", path.display()))?,
                None => MeasurementConfig::new(num_frames, num_dropped_frames, name)?.with_show(show),
            };
            measure(frames_dir, kind, &config, light.as_deref(), output.as_deref())
        }
        Command::Process {
            input,
            threshold,
            roi,
            channel_order,
            export,
            output,
        } => {
            let mut spectrum = open_spectrum(&input)?;
            let config = ReduceConfig { roi, channel_order };
            let columns = spectrum.process(threshold, &config)?.spectrum1d.len();
            info!(
                "Processed '{}': {columns} columns, threshold={threshold}",
                spectrum.name
            );
            let mut written = 0;
            for path in &export {
                if let ExportOutcome::Written(_) = write_spectrum1d(&spectrum, path)? {
                    written += 1;
                }
            }
            if written < export.len() {
                warn!("{} of {} exports skipped", export.len() - written, export.len());
            }
            if let Some(path) = output {
                loader::write(&spectrum, Some(path.as_path()))?;
            }
            Ok(())
        }
        Command::Subtract {
            input,
            operand,
            output,
        } => {
            let mut spectrum = open_spectrum(&input)?;
            match operand.parse::<f64>() {
                Ok(value) => spectrum.subtract(value)?,
                Err(_) => {
                    let other = open_spectrum(Path::new(&operand))?;
                    spectrum.subtract(&other)?;
                }
            }
            loader::write(&spectrum, output.as_deref())?;
            Ok(())
        }
        Command::Average { input, output } => {
            let mut spectrum = open_spectrum(&input)?;
            spectrum.average()?;
            loader::write(&spectrum, output.as_deref())?;
            Ok(())
        }
        Command::Info { input } => {
            let spectrum = open_spectrum(&input)?;
            println!("name:       {}", spectrum.name);
            println!("kind:       {}", spectrum.kind);
            println!(
                "num_frames: {}",
                spectrum
                    .num_frames()
                    .map_or_else(|| "unset".to_string(), |n| n.to_string())
            );
            println!("modified:   {}", spectrum.is_modified());
            println!("state:      {:?}", spectrum.state());
            println!("raw:        {}", spectrum.summary()?);
            if let Some(threshold) = spectrum.threshold() {
                println!("threshold:  {threshold}");
            }
            Ok(())
        }
    }
}

/// Open a whole-spectrum file, or wrap raw data (image / JSON array) in a new spectrum.
fn open_spectrum(path: &Path) -> Result<Spectrum> {
    if loader::is_spectrum_file(path) {
        return loader::load(path).with_context(|| format!("loading spectrum {}", path.display()));
    }
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("spectrum")
        .to_string();
    let mut spectrum = Spectrum::new(SpectrumKind::Unspecified, name);
    spectrum
        .load_raw(path)
        .with_context(|| format!("loading raw data {}", path.display()))?;
    Ok(spectrum)
}

fn measure(
    frames_dir: PathBuf,
    kind: SpectrumKind,
    config: &MeasurementConfig,
    light: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let mut spectrometer = Spectrometer::new(ImageSequenceSource::new(frames_dir));

    if let Some(device) = light {
        let device = match device {
            "auto" => find_serial_device().context("no serial light source found")?,
            path => PathBuf::from(path),
        };
        let light = SerialLightSource::open(&device, Emitter::Blue)
            .with_context(|| format!("opening serial device {}", device.display()))?;
        spectrometer = spectrometer.with_light(light);
    }

    if config.show {
        let token = spectrometer.cancel_token();
        std::thread::spawn(move || {
            for line in std::io::stdin().lock().lines().map_while(|l| l.ok()) {
                if line.trim() == "q" {
                    token.cancel();
                    break;
                }
            }
        });
    }

    match spectrometer.measure(kind, config)? {
        MeasurementOutcome::Completed(spectrum) => {
            loader::write(&spectrum, output)?;
            Ok(())
        }
        MeasurementOutcome::Aborted { frames_accumulated } => {
            bail!("measurement aborted after {frames_accumulated} frames; nothing written")
        }
    }
}
