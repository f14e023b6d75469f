//! File configuration and its merge with command-line arguments.
//!
//! The file lives at `$XDG_CONFIG_HOME/playlist-dl/config.toml` (falling back
//! to `$HOME/.config/playlist-dl/config.toml`) and holds `key = value` lines.
//! Values given on the command line always win over file values.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches};
use playlist_dl_core::Quality;
use playlist_dl_core::catalog::DEFAULT_API_BASE_URL;

use crate::cli::Args;

const DEFAULT_CATALOG_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CATALOG_READ_TIMEOUT_SECS: u64 = 30;

/// Values read from the config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FileConfig {
    pub(crate) output_dir: Option<PathBuf>,
    pub(crate) concurrency: Option<u8>,
    pub(crate) format: Option<String>,
    pub(crate) quality: Option<Quality>,
    pub(crate) retry_timeout_mins: Option<u64>,
    pub(crate) retry_times: Option<u32>,
    pub(crate) cookie: Option<PathBuf>,
    pub(crate) api_base_url: Option<String>,
    /// Catalog client connect timeout.
    pub(crate) connect_timeout_secs: Option<u64>,
    /// Catalog client read timeout.
    pub(crate) read_timeout_secs: Option<u64>,
}

impl FileConfig {
    fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(1..=100).contains(&concurrency)
        {
            bail!("Invalid config value for `concurrency`: {concurrency}. Expected range: 1..=100");
        }
        if let Some(mins) = self.retry_timeout_mins
            && !(1..=60).contains(&mins)
        {
            bail!("Invalid config value for `retry_timeout_mins`: {mins}. Expected range: 1..=60");
        }
        if let Some(times) = self.retry_times
            && !(1..=10).contains(&times)
        {
            bail!("Invalid config value for `retry_times`: {times}. Expected range: 1..=10");
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Which arguments were typed on the command line rather than defaulted.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CliValueSources {
    pub(crate) output_dir: bool,
    pub(crate) concurrency: bool,
    pub(crate) format: bool,
    pub(crate) quality: bool,
    pub(crate) retry_timeout: bool,
    pub(crate) retry_times: bool,
    pub(crate) cookie: bool,
}

pub(crate) fn parse_cli_with_sources() -> (Args, CliValueSources) {
    let matches = Args::command().get_matches();
    let args = Args::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());
    let sources = CliValueSources {
        output_dir: is_commandline_value(&matches, "output_dir"),
        concurrency: is_commandline_value(&matches, "concurrency"),
        format: is_commandline_value(&matches, "format"),
        quality: is_commandline_value(&matches, "quality"),
        retry_timeout: is_commandline_value(&matches, "retry_timeout"),
        retry_times: is_commandline_value(&matches, "retry_times"),
        cookie: is_commandline_value(&matches, "cookie"),
    };
    (args, sources)
}

fn is_commandline_value(matches: &ArgMatches, id: &str) -> bool {
    matches.value_source(id) == Some(ValueSource::CommandLine)
}

/// Effective settings for one run.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) args: Args,
    pub(crate) output_dir: PathBuf,
    pub(crate) api_base_url: String,
    pub(crate) catalog_connect_timeout: Duration,
    pub(crate) catalog_read_timeout: Duration,
}

impl Settings {
    pub(crate) fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.args.retry_timeout.saturating_mul(60))
    }
}

/// Fills arguments the user did not type from the file config.
pub(crate) fn apply_config_defaults(
    mut args: Args,
    sources: &CliValueSources,
    file_config: Option<&FileConfig>,
) -> Settings {
    let mut api_base_url = DEFAULT_API_BASE_URL.to_string();
    let mut connect_secs = DEFAULT_CATALOG_CONNECT_TIMEOUT_SECS;
    let mut read_secs = DEFAULT_CATALOG_READ_TIMEOUT_SECS;

    if let Some(file) = file_config {
        if !sources.output_dir
            && let Some(dir) = &file.output_dir
        {
            args.output_dir = Some(dir.clone());
        }
        if !sources.concurrency
            && let Some(concurrency) = file.concurrency
        {
            args.concurrency = concurrency;
        }
        if !sources.format
            && let Some(format) = &file.format
        {
            args.format.clone_from(format);
        }
        if !sources.quality
            && let Some(quality) = file.quality
        {
            args.quality = quality;
        }
        if !sources.retry_timeout
            && let Some(mins) = file.retry_timeout_mins
        {
            args.retry_timeout = mins;
        }
        if !sources.retry_times
            && let Some(times) = file.retry_times
        {
            args.retry_times = times;
        }
        if !sources.cookie
            && let Some(cookie) = &file.cookie
        {
            args.cookie.clone_from(cookie);
        }
        if let Some(url) = &file.api_base_url {
            api_base_url.clone_from(url);
        }
        connect_secs = file.connect_timeout_secs.unwrap_or(connect_secs);
        read_secs = file.read_timeout_secs.unwrap_or(read_secs);
    }

    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    Settings {
        args,
        output_dir,
        api_base_url,
        catalog_connect_timeout: Duration::from_secs(connect_secs),
        catalog_read_timeout: Duration::from_secs(read_secs),
    }
}

/// Resolves the config file path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/playlist-dl/config.toml`
/// 2. `$HOME/.config/playlist-dl/config.toml`
pub(crate) fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg).join("playlist-dl").join("config.toml"));
    }
    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("playlist-dl")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    env::var_os(name).filter(|value| !value.is_empty())
}

/// Loads the config file when one exists.
pub(crate) fn load_default_file_config() -> Result<Option<FileConfig>> {
    match resolve_default_config_path() {
        Some(path) if path.exists() => load_file_config(&path).map(Some),
        _ => Ok(None),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };
        let key = raw_key.trim();
        let value = raw_value.trim();
        let context = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "output_dir" => {
                cfg.output_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(context)?,
                ));
            }
            "concurrency" => {
                let parsed = parse_integer(value).with_context(context)?;
                cfg.concurrency =
                    Some(u8::try_from(parsed).map_err(|_| anyhow::anyhow!("out of range"))?);
            }
            "format" => cfg.format = Some(parse_string_literal(value).with_context(context)?),
            "quality" => {
                let parsed = parse_integer(value).with_context(context)?;
                let kbps = u32::try_from(parsed).map_err(|_| anyhow::anyhow!("out of range"))?;
                cfg.quality = Some(
                    Quality::try_from(kbps)
                        .map_err(|e| anyhow::anyhow!(e))
                        .with_context(context)?,
                );
            }
            "retry_timeout_mins" => {
                cfg.retry_timeout_mins = Some(parse_integer(value).with_context(context)?);
            }
            "retry_times" => {
                let parsed = parse_integer(value).with_context(context)?;
                cfg.retry_times =
                    Some(u32::try_from(parsed).map_err(|_| anyhow::anyhow!("out of range"))?);
            }
            "cookie" => {
                cfg.cookie = Some(PathBuf::from(
                    parse_string_literal(value).with_context(context)?,
                ));
            }
            "api_base_url" => {
                cfg.api_base_url = Some(parse_string_literal(value).with_context(context)?);
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer(value).with_context(context)?);
            }
            "read_timeout_secs" => {
                cfg.read_timeout_secs = Some(parse_integer(value).with_context(context)?);
            }
            unknown => bail!("Unknown configuration key: '{unknown}' on line {line_no}"),
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    Ok(token.parse::<u64>()?)
}
