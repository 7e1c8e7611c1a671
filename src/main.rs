use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use xfade_tilde::config::{self, Config};
use xfade_tilde::host::class;
use xfade_tilde::level_event::LevelEvent;
use xfade_tilde::render::{self, BlendEvent};
use xfade_tilde::{control, jack_host, Error};

#[derive(Parser, Debug)]
#[command(version, about = "Crossfade two audio signals")]
struct Args {
    /// Configuration file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run as a JACK client; control lines are read from stdin
    Run {
        /// Initial mixing factor
        #[arg(long, allow_negative_numbers = true)]
        blend: Option<f32>,

        /// JACK client name
        #[arg(long)]
        client_name: Option<String>,
    },
    /// Crossfade two WAV files offline
    Render {
        in_1: PathBuf,
        in_2: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, allow_negative_numbers = true)]
        blend: Option<f32>,

        #[arg(long)]
        block_size: Option<usize>,

        /// Blend change as FRAME=VALUE; may be repeated
        #[arg(long = "at", value_parser = parse_event)]
        events: Vec<BlendEvent>,
    },
    /// Write the effective configuration to the config file
    InitConfig,
    /// List registered classes
    Classes,
}

fn parse_event(text: &str) -> Result<BlendEvent, String> {
    text.parse().map_err(|error: render::Error| error.to_string())
}

fn run(args: Args) -> Result<(), Error> {
    let config_path = args.config.clone().unwrap_or_else(config::default_path);
    let config = Config::load(&config_path)?;

    xfade_tilde::setup();

    match args.command {
        Command::Run { blend, client_name } => {
            let mut config = config;
            if let Some(blend) = blend {
                config.unit.blend = blend;
            }
            if let Some(client_name) = client_name {
                config.jack.client_name = client_name;
            }

            let exit = LevelEvent::new();
            let (sender, receiver) = control::channel();
            // not joined: it may be blocked reading stdin when we exit
            let _reader = control::spawn_stdin_reader(sender, exit.clone());
            info!("Type a number to set the blend, 'quit' to exit");
            jack_host::main(config, receiver, exit)?;
        }
        Command::Render {
            in_1,
            in_2,
            output,
            blend,
            block_size,
            events,
        } => {
            let options = render::Options {
                blend: blend.unwrap_or(config.unit.blend),
                block_size: block_size.unwrap_or(config.render.block_size),
                events,
            };
            let summary = render::render(&in_1, &in_2, &output, &options)?;
            println!(
                "{}: {} frames, {} channels at {} Hz",
                output.display(),
                summary.frames,
                summary.channels,
                summary.sample_rate
            );
        }
        Command::InitConfig => {
            config.save(&config_path)?;
            println!("{}", config_path.display());
        }
        Command::Classes => {
            for name in class::registered() {
                println!("{}", name);
            }
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let what = match &args.command {
        Command::Render { output, .. } => format!("rendering {}", output.display()),
        Command::Run { .. } => String::from("running the JACK client"),
        Command::InitConfig => String::from("writing the configuration"),
        Command::Classes => String::from("listing classes"),
    };
    run(args).context(what)
}
