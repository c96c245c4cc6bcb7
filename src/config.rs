//! Command-line configuration.

use std::path::PathBuf;

use crate::util::{Error, Result};

pub const DEFAULT_WIDTH: u32 = 480;
pub const DEFAULT_HEIGHT: u32 = 270;
pub const DEFAULT_SAMPLES: u32 = 20;

/// Everything the binary needs to set up a session.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    /// Set means batch mode: render offline and write this file
    pub output: Option<PathBuf>,
    /// Persistent display texture in the viewer
    pub display_interop: bool,
    /// Batch launches when no time limit is given
    pub samples: u32,
    /// Batch time budget in seconds
    pub time_limit: Option<f64>,
    /// Scene description; the built-in scene when unset
    pub scene: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            output: None,
            display_interop: true,
            samples: DEFAULT_SAMPLES,
            time_limit: None,
            scene: None,
        }
    }
}

impl RenderConfig {
    pub fn is_batch(&self) -> bool {
        self.output.is_some()
    }
}

/// Parsed command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Run(RenderConfig),
}

/// Parse arguments, excluding the program name.
pub fn parse_args<I, S>(args: I) -> Result<Command>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut config = RenderConfig::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let arg = arg.as_ref();
        let mut value = |flag: &str| -> Result<String> {
            args.next()
                .map(|v| v.as_ref().to_string())
                .ok_or_else(|| Error::config(format!("option {flag} requires a value")))
        };
        match arg {
            "-h" | "--help" => return Ok(Command::Help),
            "-f" | "--file" => {
                config.output = Some(PathBuf::from(value(arg)?));
                config.display_interop = false;
            }
            "-n" | "--nopbo" => config.display_interop = false,
            "-s" | "--sample" => config.samples = parse_number(arg, &value(arg)?)?,
            "-t" | "--time" => {
                let secs: f64 = parse_number(arg, &value(arg)?)?;
                if !secs.is_finite() || secs < 0.0 {
                    return Err(Error::config(format!("invalid time limit '{secs}'")));
                }
                config.time_limit = Some(secs);
            }
            "-W" | "--width" => config.width = parse_dimension(arg, &value(arg)?)?,
            "-H" | "--height" => config.height = parse_dimension(arg, &value(arg)?)?,
            "--scene" => config.scene = Some(PathBuf::from(value(arg)?)),
            other => return Err(Error::config(format!("unknown option '{other}'"))),
        }
    }
    Ok(Command::Run(config))
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::config(format!("invalid value '{value}' for {flag}")))
}

fn parse_dimension(flag: &str, value: &str) -> Result<u32> {
    match parse_number::<u32>(flag, value)? {
        0 => Err(Error::config(format!("{flag} must be positive"))),
        n => Ok(n),
    }
}

/// Usage text printed for `--help` and configuration errors.
pub fn usage(program: &str) -> String {
    format!(
        "\
redflash - progressive path tracer

USAGE:
    {program} [OPTIONS]

OPTIONS:
    -h, --help              Print this usage message and exit
    -f, --file <path>       Save image to file and exit (.png, .hdr or .exr)
    -n, --nopbo             Disable the persistent display texture
    -s, --sample <n>        Number of samples in batch mode (default {DEFAULT_SAMPLES})
    -t, --time <sec>        Time budget for batch mode, in seconds
    -W, --width <px>        Image width (default {DEFAULT_WIDTH})
    -H, --height <px>       Image height (default {DEFAULT_HEIGHT})
        --scene <file>      Scene description (JSON); built-in scene otherwise

ENVIRONMENT:
    REDFLASH_DATA_DIR       Installed data directory for scene assets
    REDFLASH_TRACE=1        Write a chrome trace to trace.json
    RUST_LOG                Log filter (default info)

VIEWER:
    Left drag orbits, right drag dollies, middle drag pans.
    Press 's' to save redflash.png, 'q' or Esc to quit.
"
    )
}
