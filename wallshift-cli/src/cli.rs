use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use wallshift_engine::RotationSource;

#[derive(Parser)]
#[command(
    version,
    about = "Wallpaper rotation tool",
    long_about = "Resolves wallpaper identifiers through a remote catalog, downloads the\n\
                  image into a size-bounded local cache, and applies it as the desktop\n\
                  background. Can also rotate periodically through the catalog or through\n\
                  previously downloaded wallpapers."
)]
pub struct CliArgs {
    /// Path to the settings file
    #[arg(
        short,
        long,
        default_value = "wallshift.json",
        help = "Settings file (created with defaults if missing)"
    )]
    pub config: PathBuf,

    /// Command template used to apply a wallpaper, with {path} substituted
    #[arg(
        long,
        help = "Command run to apply a wallpaper, e.g. \"feh --bg-fill {path}\". When omitted the selected file is only reported."
    )]
    pub apply_cmd: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Set the wallpaper to a specific identifier
    Set {
        /// Identifier of the wallpaper to apply
        identifier: String,
    },
    /// Set the wallpaper to a random one from the catalog
    Random,
    /// Rotate once using the configured (or overridden) source
    Rotate {
        #[arg(long, value_enum, help = "Where to pick the next wallpaper from")]
        source: Option<SourceArg>,
    },
    /// Run the periodic scheduler until interrupted
    Watch,
    /// List cached wallpapers with sizes and access times
    History,
    /// Evict least-recently-used wallpapers down to the configured cache size
    Cleanup,
    /// Delete every cached wallpaper
    Clear,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SourceArg {
    History,
    Catalog,
}

impl From<SourceArg> for RotationSource {
    fn from(value: SourceArg) -> Self {
        match value {
            SourceArg::History => RotationSource::History,
            SourceArg::Catalog => RotationSource::Catalog,
        }
    }
}
