//! Print codec motion vectors of a video, either raw or arranged into a grid.

use av_decoder::AvSource;
use clap::*;
use log::*;
use mvflow::grid::{GRID_STEP, MAX_GRID_SIZE};
use mvflow::prelude::v1::{Result, *};
use std::io::{BufWriter, Write};

const USAGE: &str = "Usage: mvflow-extract [--raw] videoPath

  Specify --raw flag to prevent motion vectors from being arranged in a matrix.
";

fn cli() -> Command<'static> {
    Command::new("mvflow-extract")
        .version(crate_version!())
        .about("Prints codec motion vectors of a video")
        .arg(
            Arg::new("raw")
                .long("raw")
                .help("Print motion vectors as they are, without arranging them in a grid"),
        )
        .arg(
            Arg::new("grid-step")
                .long("grid-step")
                .takes_value(true)
                .help("Grid cell size in pixels"),
        )
        .arg(
            Arg::new("max-grid-size")
                .long("max-grid-size")
                .takes_value(true)
                .help("Maximum number of grid rows and columns"),
        )
        .arg(
            Arg::new("input")
                .takes_value(true)
                .multiple_values(true)
                .help("Video to read, further inputs are ignored"),
        )
}

/// Turn parsed arguments into the input path and run settings.
///
/// Returns `Ok(None)` if no input was given.
fn parse_config(matches: &ArgMatches) -> Result<Option<(String, ExtractConfig)>> {
    let input = match matches.values_of("input").and_then(|mut v| v.next()) {
        Some(input) => input.to_string(),
        None => return Ok(None),
    };

    let mode = if matches.is_present("raw") {
        OutputMode::Raw
    } else {
        OutputMode::Arranged
    };

    let step = match matches.value_of("grid-step") {
        Some(v) => v.parse()?,
        None => GRID_STEP,
    };

    let max_size = match matches.value_of("max-grid-size") {
        Some(v) => v.parse()?,
        None => MAX_GRID_SIZE,
    };

    if step == 0 {
        return Err(anyhow!("Grid step must be positive"));
    }

    Ok(Some((
        input,
        ExtractConfig {
            mode,
            grid: GridConfig { step, max_size },
        },
    )))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let matches = cli().get_matches();

    let (input, config) = match parse_config(&matches)? {
        Some(v) => v,
        None => {
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    };

    let mut source = AvSource::open(&input)?;

    if log_enabled!(Level::Debug) {
        source.dump_format();
    }

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let stats = extract(source, &config, &mut out)?;
    out.flush()?;

    debug!("{:?}", stats);

    Ok(())
}
