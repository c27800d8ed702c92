//! Clap derive structures for the `huestream` CLI.
//!
//! Defines the command tree, global flags, and shared value enums. Kept free
//! of workspace types so `build.rs` can compile it for man pages.

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// huestream -- real-time entertainment streaming for Hue bridges
#[derive(Debug, Parser)]
#[command(
    name = "huestream",
    version,
    about = "Stream real-time light colors to a Hue bridge",
    long_about = "Discover and pair with a Hue bridge, inspect its entertainment\n\
        configurations, and stream colors to them at a fixed frame rate.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Bridge profile to use
    #[arg(long, short = 'p', env = "HUESTREAM_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Bridge IP address (overrides profile)
    #[arg(long, short = 'b', env = "HUESTREAM_BRIDGE", global = true)]
    pub bridge: Option<String>,

    /// Application key issued at pairing
    #[arg(long, env = "HUESTREAM_APPLICATION_KEY", global = true, hide_env = true)]
    pub application_key: Option<String>,

    /// Hex client key issued at pairing
    #[arg(long, env = "HUESTREAM_CLIENT_KEY", global = true, hide_env = true)]
    pub client_key: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "HUESTREAM_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// REST request timeout in seconds
    #[arg(long, env = "HUESTREAM_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Value Enums ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProtocolArg {
    /// Legacy API, light ids on the wire
    V1,
    /// CLIP v2, channel ids plus configuration id
    V2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorSpaceArg {
    /// 16-bit RGB channels
    Rgb,
    /// CIE xy chromaticity plus brightness
    #[value(alias = "xyb")]
    Xy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KeepAliveArg {
    /// Resend the last frame unchanged
    Verbatim,
    /// Resend the last frame with the next sequence number
    Resequence,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Find bridges on the local network
    Discover(DiscoverArgs),

    /// Register with a bridge (press its link button first)
    Pair(PairArgs),

    /// Inspect entertainment configurations
    #[command(alias = "cfgs", alias = "areas")]
    Configs(ConfigsArgs),

    /// Stream colors to an entertainment configuration
    #[command(alias = "s")]
    Stream(StreamArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  DISCOVER / PAIR
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Discovery endpoint
    #[arg(long, hide = true, default_value = "https://discovery.meethue.com/")]
    pub endpoint: String,

    /// Seconds to browse the local network over mDNS
    #[arg(long, default_value_t = 3, value_name = "SECS")]
    pub mdns_timeout: u64,

    /// Skip the cloud discovery endpoint
    #[arg(long, conflicts_with = "no_mdns")]
    pub no_cloud: bool,

    /// Skip the local mDNS browse
    #[arg(long)]
    pub no_mdns: bool,
}

#[derive(Debug, Args)]
pub struct PairArgs {
    /// Device type reported to the bridge (`app#device`)
    #[arg(long, default_value = "huestream#cli")]
    pub device_type: String,

    /// Save the bridge and credentials to the active profile
    #[arg(long)]
    pub save: bool,

    /// With --save, write credentials to the config file instead of the keyring
    #[arg(long, requires = "save")]
    pub plaintext: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIGS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigsArgs {
    #[command(subcommand)]
    pub command: ConfigsCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigsCommand {
    /// List entertainment configurations
    #[command(alias = "ls")]
    List,

    /// Show one configuration and its channels
    Get {
        /// Configuration id (UUID)
        id: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  STREAM
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct StreamArgs {
    /// Entertainment configuration id (defaults to the profile's)
    #[arg(long, short = 'c')]
    pub config: Option<String>,

    /// Per-light color: `LIGHT=#RRGGBB` or `LIGHT=xy:X,Y,BRI`
    #[arg(long = "set", short = 's', value_name = "LIGHT=COLOR")]
    pub colors: Vec<String>,

    /// Color for every light in the configuration
    #[arg(long, value_name = "COLOR")]
    pub all: Option<String>,

    /// How long to stream before stopping (Ctrl-C stops early)
    #[arg(long, short = 'd', default_value = "10s", value_parser = humantime::parse_duration)]
    pub duration: Duration,

    /// Wire protocol version
    #[arg(long)]
    pub protocol: Option<ProtocolArg>,

    /// Frame color space
    #[arg(long)]
    pub color_space: Option<ColorSpaceArg>,

    /// Keep-alive resend policy
    #[arg(long)]
    pub keep_alive: Option<KeepAliveArg>,

    /// Tick period in milliseconds
    #[arg(long)]
    pub tick_ms: Option<u64>,

    /// Streaming port (bridges listen on 2100)
    #[arg(long)]
    pub port: Option<u16>,

    /// Send unencrypted UDP instead of DTLS (bridge emulators only)
    #[arg(long)]
    pub plaintext: bool,

    /// Skip the REST start/stop calls (configuration already active)
    #[arg(long)]
    pub no_activate: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG / COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration (secrets masked)
    Show,

    /// Print the config file path
    Path,

    /// Set a profile value
    Set {
        /// Profile key (e.g. bridge, entertainment_configuration, protocol)
        key: String,

        /// Value to set
        value: String,
    },

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
