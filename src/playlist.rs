//! `--file` mode: rewrite tool command lines in a playlist into LiveProxy URLs.
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::ValueEnum;

use crate::decoder::encode_command_line;

/// Accepted extensions for the rewritten file.
pub const FILE_OUTPUT_LIST: &[&str] = &[".m3u", ".m3u8", ".new", ".tv", ".txt"];

/// Lines starting with one of these are treated as commands.
const COMMAND_PREFIXES: &[&str] = &["streamlink", "youtube-dl", "youtube_dl", "yt-dlp", "yt_dlp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlaylistFormat {
    M3u,
    /// Enigma2 userbouquets escape ':' as `%3a`.
    E2,
}

impl PlaylistFormat {
    pub fn url(self, host: Ipv4Addr, port: u16, token: &str) -> String {
        match self {
            PlaylistFormat::M3u => format!("http://{host}:{port}/base64/{token}/"),
            PlaylistFormat::E2 => format!("http%3a//{host}%3a{port}/base64/{token}/"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rewrite {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub format: PlaylistFormat,
    pub host: Ipv4Addr,
    pub port: u16,
}

/// Rewrite every command line of `text`; other lines pass through unchanged.
pub fn rewrite_lines(text: &str, format: PlaylistFormat, host: Ipv4Addr, port: u16) -> Vec<String> {
    text.lines()
        .map(|line| {
            if COMMAND_PREFIXES.iter().any(|p| line.starts_with(p)) {
                format.url(host, port, &encode_command_line(line))
            } else {
                line.to_string()
            }
        })
        .collect()
}

pub fn output_path(input: &Path, output: Option<&Path>) -> PathBuf {
    match output {
        Some(p) => p.to_path_buf(),
        None => {
            let mut name = input.as_os_str().to_os_string();
            name.push(".new");
            PathBuf::from(name)
        }
    }
}

pub fn has_valid_extension(path: &Path) -> bool {
    let name = path.to_string_lossy();
    FILE_OUTPUT_LIST.iter().any(|ext| name.ends_with(ext))
}

/// Run the rewrite and return the path written.
pub fn run(rewrite: &Rewrite) -> Result<PathBuf> {
    if !rewrite.input.is_file() {
        bail!("File does not exist: {}", rewrite.input.display());
    }
    let output = output_path(&rewrite.input, rewrite.output.as_deref());
    if output == rewrite.input {
        bail!("Don't use the same name for the old and the new file.");
    }
    if !has_valid_extension(&output) {
        bail!(
            "Invalid file type: {} (expected one of {})",
            output.display(),
            FILE_OUTPUT_LIST.join(" ")
        );
    }

    tracing::info!("open old file: {}", rewrite.input.display());
    let text = fs::read_to_string(&rewrite.input)
        .with_context(|| format!("Can't read file: {}", rewrite.input.display()))?;
    let lines = rewrite_lines(&text, rewrite.format, rewrite.host, rewrite.port);

    tracing::info!("open new file: {}", output.display());
    let mut body = String::with_capacity(text.len() * 2);
    for line in &lines {
        body.push_str(line);
        body.push('\n');
    }
    fs::write(&output, body).with_context(|| format!("Can't write file: {}", output.display()))?;
    tracing::info!("Done.");
    Ok(output)
}
