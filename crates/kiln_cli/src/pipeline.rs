//! Shared helpers for CLI commands.
//!
//! Configuration discovery, JSON input loading, override constant parsing,
//! and diagnostic rendering used by `compile` and `inspect`.

use std::path::{Path, PathBuf};

use kiln_compile::{BindGroupLayoutEntry, PipelineLayout};
use kiln_config::{KilnConfig, CONFIG_FILE};
use kiln_diagnostics::{Diagnostic, DiagnosticRenderer, TerminalRenderer};
use kiln_ir::Program;

use crate::GlobalArgs;

/// Walks up from `start` looking for the nearest directory containing `kiln.toml`.
pub fn find_config_dir(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).is_file() {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Resolves the configuration from global CLI args.
///
/// `--config` names a file or a directory holding `kiln.toml` and must exist.
/// Without it, the nearest `kiln.toml` above the current directory is used,
/// falling back to defaults when there is none.
pub fn resolve_config(global: &GlobalArgs) -> Result<KilnConfig, Box<dyn std::error::Error>> {
    if let Some(ref config_path) = global.config {
        let config = kiln_config::load_config(Path::new(config_path))?;
        return Ok(config);
    }
    match find_config_dir(&std::env::current_dir()?) {
        Some(dir) => {
            tracing::debug!(dir = %dir.display(), "using discovered configuration");
            Ok(kiln_config::load_config(&dir)?)
        }
        None => Ok(KilnConfig::default()),
    }
}

/// Reads a program from a JSON file.
pub fn read_program(path: &Path) -> Result<Program, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read program {}: {e}", path.display()))?;
    let program = serde_json::from_str(&content)
        .map_err(|e| format!("invalid program {}: {e}", path.display()))?;
    Ok(program)
}

/// Reads a pipeline layout from a JSON file holding one array of entries per
/// bind group.
pub fn read_layout(path: &Path) -> Result<PipelineLayout, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read layout {}: {e}", path.display()))?;
    let groups: Vec<Vec<BindGroupLayoutEntry>> = serde_json::from_str(&content)
        .map_err(|e| format!("invalid layout {}: {e}", path.display()))?;
    Ok(PipelineLayout::new(groups)?)
}

/// Parses a `NAME=VALUE` override constant.
pub fn parse_constant(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{s}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing constant name in '{s}'"));
    }
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid value for constant '{name}': '{}'", value.trim()))?;
    if !value.is_finite() {
        return Err(format!("constant '{name}' must be finite"));
    }
    Ok((name.to_string(), value))
}

/// Renders diagnostics to stderr. Returns the number rendered.
pub fn render_diagnostics(diagnostics: &[Diagnostic], color: bool) -> usize {
    let renderer = TerminalRenderer::new(color);
    for diag in diagnostics {
        eprintln!("{}", renderer.render(diag));
    }
    diagnostics.len()
}
