//! Config-file directive parser and CLI surface.
//!
//! The file format and directive set (`timeout`, `save`, `dir`, `loglevel`,
//! `logfile`, `databases`) match `loadServerConfig` in
//! `examples/original_source/redis_beta/redis.c` line for line: one
//! directive per line, `#`-comments and blank lines skipped, unknown or
//! malformed directives are a fatal startup error. `port`/`bind` are added
//! here because §6 names them as accepted directives even though the
//! distilled original only wires up the five above.

use crate::constants::{DEFAULT_DBNUM, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_PORT, DEFAULT_SAVE_PARAMS};
use crate::error::{ConfigError, ConfigResult};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "linekv-server", about = "In-memory key/value server")]
pub struct Cli {
    /// Path to a config file using the `directive value...` format.
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind: Option<String>,
    pub databases: usize,
    pub idle_timeout_secs: u64,
    pub save_params: Vec<(u64, u64)>,
    pub dir: Option<PathBuf>,
    pub loglevel: tracing::Level,
    pub logfile: Option<PathBuf>,
    pub dump_filename: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: DEFAULT_PORT,
            bind: None,
            databases: DEFAULT_DBNUM,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            save_params: DEFAULT_SAVE_PARAMS.to_vec(),
            dir: None,
            loglevel: tracing::Level::INFO,
            logfile: None,
            dump_filename: crate::constants::DUMP_FILENAME.to_string(),
        }
    }
}

impl Config {
    /// Parses the plain-text directive format. A config file's `save`
    /// lines *replace* the built-in defaults on first occurrence, matching
    /// `appendServerSaveParams`'s append-only behavior combined with the
    /// fact that the original ships with zero default save params baked
    /// into `initServer` (they all come from the config file) — see
    /// DESIGN.md for this resolved Open Question.
    pub fn from_str(content: &str) -> ConfigResult<Config> {
        let mut cfg = Config { save_params: Vec::new(), ..Config::default() };
        let mut saw_save_directive = false;

        for (lineno, raw_line) in content.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let directive = tokens[0];
            let args = &tokens[1..];

            match (directive, args.len()) {
                ("timeout", 1) => {
                    let secs: i64 = args[0].parse().map_err(|_| invalid(directive, args[0]))?;
                    if secs < 1 {
                        return Err(invalid(directive, args[0]));
                    }
                    cfg.idle_timeout_secs = secs as u64;
                }
                ("save", 2) => {
                    let seconds: i64 = args[0].parse().map_err(|_| invalid(directive, args[0]))?;
                    let changes: i64 = args[1].parse().map_err(|_| invalid(directive, args[1]))?;
                    if seconds < 1 || changes < 0 {
                        return Err(ConfigError::InvalidValue(directive.into(), "invalid save parameters".into()));
                    }
                    if !saw_save_directive {
                        cfg.save_params.clear();
                        saw_save_directive = true;
                    }
                    cfg.save_params.push((seconds as u64, changes as u64));
                }
                ("dir", 1) => {
                    cfg.dir = Some(PathBuf::from(args[0]));
                }
                ("loglevel", 1) => {
                    cfg.loglevel = match args[0] {
                        "debug" => tracing::Level::DEBUG,
                        "notice" => tracing::Level::INFO,
                        "warning" => tracing::Level::WARN,
                        other => {
                            return Err(ConfigError::InvalidValue(
                                directive.into(),
                                format!("{other:?} is not one of debug, notice, warning"),
                            ))
                        }
                    };
                }
                ("logfile", 1) => {
                    cfg.logfile = if args[0] == "stdout" { None } else { Some(PathBuf::from(args[0])) };
                }
                ("databases", 1) => {
                    let n: i64 = args[0].parse().map_err(|_| invalid(directive, args[0]))?;
                    if n < 1 {
                        return Err(invalid(directive, args[0]));
                    }
                    cfg.databases = n as usize;
                }
                ("port", 1) => {
                    cfg.port = args[0].parse().map_err(|_| invalid(directive, args[0]))?;
                }
                ("bind", 1) => {
                    cfg.bind = Some(args[0].to_string());
                }
                (other, n) => {
                    if let Some(expected) = known_directive_arity(other) {
                        if expected != n {
                            return Err(ConfigError::WrongArity(format!("{other:?} at line {}", lineno + 1)));
                        }
                    }
                    return Err(ConfigError::UnknownDirective(format!("{other:?} at line {}", lineno + 1)));
                }
            }
        }
        if !saw_save_directive {
            cfg.save_params = DEFAULT_SAVE_PARAMS.to_vec();
        }
        Ok(cfg)
    }

    pub fn from_path(path: &std::path::Path) -> ConfigResult<Config> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Config::from_str(&content)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind.as_deref().unwrap_or("0.0.0.0"), self.port)
    }
}

fn invalid(directive: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue(directive.into(), format!("{value:?} is not a valid value"))
}

/// Expected argument count for every known directive, so a malformed line
/// naming a real directive (`timeout 1 2`, `save 60`) is reported as
/// `WrongArity` rather than lumped in with a genuinely unrecognized
/// directive name.
fn known_directive_arity(directive: &str) -> Option<usize> {
    match directive {
        "timeout" | "dir" | "loglevel" | "logfile" | "databases" | "port" | "bind" => Some(1),
        "save" => Some(2),
        _ => None,
    }
}
